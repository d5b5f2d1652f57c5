//! Reference validation: does everything the descriptor names exist?
//!
//! Validation never stops at the first missing reference. Every miss is
//! reported to the sink and the import is rejected once the pass completes.

use anyhow::Context;
use rusqlite::Connection;

use crate::db::store;
use crate::models::{ApplicationDescriptor, EnvRef, Message, MessageKind, Project};

use super::aggregator::MessageSink;
use super::ImportError;

/// Result of a validation pass.
#[derive(Debug, Default)]
pub struct Verdict {
    /// Number of missing references found.
    pub missing: usize,
    /// The error that decides the response when `missing > 0`: the kind of
    /// the last missing reference encountered.
    pub dominant: Option<ImportError>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.missing == 0
    }

    fn miss(&mut self, sink: &MessageSink, message: Message, error: ImportError) {
        sink.send(message);
        self.missing += 1;
        self.dominant = Some(error);
    }
}

/// Checks every pipeline usage and trigger of `descriptor` against the
/// project. Lookups go through `conn`, normally the import's transaction.
pub fn validate(
    conn: &Connection,
    project: &Project,
    descriptor: &ApplicationDescriptor,
    sink: &MessageSink,
) -> Result<Verdict, ImportError> {
    let mut verdict = Verdict::default();

    for usage in &descriptor.pipelines {
        let found = store::pipeline_exists(conn, project.id, &usage.name)
            .with_context(|| format!("Unable to check pipeline {}", usage.name))?;
        if !found {
            verdict.miss(
                sink,
                Message::new(MessageKind::PipelineNotFound, [usage.name.as_str()]),
                ImportError::PipelineNotFound(usage.name.clone()),
            );
        }

        for trigger in &usage.triggers {
            let dest_application = trigger.dest_application_or(&descriptor.name);
            if dest_application != descriptor.name {
                let found = store::application_exists(conn, project.id, dest_application)
                    .with_context(|| format!("Unable to check application {}", dest_application))?;
                if !found {
                    verdict.miss(
                        sink,
                        Message::new(MessageKind::ApplicationNotFound, [dest_application]),
                        ImportError::ApplicationNotFound(dest_application.to_string()),
                    );
                }
            }

            for environment in [&trigger.src_environment, &trigger.dest_environment] {
                check_environment(conn, project, environment, sink, &mut verdict)?;
            }
        }
    }

    if !verdict.is_valid() {
        tracing::warn!(
            "Import of {} into {} has {} missing reference(s)",
            descriptor.name,
            project.key,
            verdict.missing
        );
    }

    Ok(verdict)
}

fn check_environment(
    conn: &Connection,
    project: &Project,
    environment: &EnvRef,
    sink: &MessageSink,
    verdict: &mut Verdict,
) -> Result<(), ImportError> {
    let Some(name) = environment.named() else {
        return Ok(());
    };

    let found = store::environment_exists(conn, project.id, name)
        .with_context(|| format!("Unable to check environment {}", name))?;
    if !found {
        verdict.miss(
            sink,
            Message::new(MessageKind::EnvironmentNotFound, [name]),
            ImportError::EnvironmentNotFound(name.to_string()),
        );
    }
    Ok(())
}
