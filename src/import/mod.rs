//! The application import engine.
//!
//! An import walks through these stages:
//!
//! 1. decode the raw body (`Failed` on error, nothing touched),
//! 2. load the project and probe for an existing application
//!    (`Rejected`, no transaction opened),
//! 3. open the transaction, resolve groups and validate references
//!    (`Rejected` after the full pass, transaction dropped),
//! 4. apply and commit (`RolledBack` on the first failure),
//! 5. run the advisory sanity check on the committed application.
//!
//! Diagnostics emitted along the way are collected by the
//! [`aggregator`] and returned with every outcome.

pub mod aggregator;
pub mod apply;
pub mod decode;
mod error;
pub mod validate;

use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use serde::Serialize;

use crate::db::{store, Database};
use crate::models::*;
use crate::sanity::{DefaultSanityCheck, SanityCheck};

pub use aggregator::{aggregate, render_unique, MessageSink};
pub use apply::{
    ApplyContext, AttachedApplication, PreserveExisting, ReplaceExisting, ResolvedPermission,
    UpdateStrategy,
};
pub use decode::{decode, parse_format, Format};
pub use error::ImportError;
pub use validate::{validate, Verdict};

/// One import call.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub project_key: String,
    pub body: Vec<u8>,
    /// Format name as sent by the client (`json`, `yaml`, `hcl`).
    pub format: String,
    /// Bypass the "already exists" rejection.
    pub force_update: bool,
    pub locale: Locale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    /// Everything was persisted.
    Committed,
    /// Refused before anything was applied.
    Rejected,
    /// Applying failed and the transaction was rolled back.
    RolledBack,
    /// Unreadable request or unexpected failure.
    Failed,
}

#[derive(Debug)]
pub struct ImportOutcome {
    pub status: ImportStatus,
    /// Rendered, deduplicated diagnostics in first-seen order.
    pub messages: Vec<String>,
    /// The dominant error. Also set on a committed import whose sanity check
    /// failed.
    pub error: Option<ImportError>,
    pub application: Option<Application>,
    pub warnings: Vec<Warning>,
}

impl ImportOutcome {
    fn halted(halt: Halt, messages: Vec<String>) -> Self {
        Self {
            status: halt.status,
            messages,
            error: Some(halt.error),
            application: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == ImportStatus::Committed
    }

    pub fn status_code(&self) -> StatusCode {
        self.error
            .as_ref()
            .map(ImportError::status_code)
            .unwrap_or(StatusCode::OK)
    }
}

/// Why and where an import stopped.
#[derive(Debug)]
struct Halt {
    status: ImportStatus,
    error: ImportError,
}

impl Halt {
    /// Before applying, unresolved references reject. Unreadable requests and
    /// store errors fail.
    fn before_apply(error: ImportError) -> Self {
        let status = match &error {
            ImportError::WrongRequest(_) => ImportStatus::Failed,
            e if e.is_structured() => ImportStatus::Rejected,
            _ => ImportStatus::Failed,
        };
        Self { status, error }
    }

    fn during_apply(error: ImportError) -> Self {
        Self {
            status: ImportStatus::RolledBack,
            error,
        }
    }
}

struct Committed {
    project: Project,
    application: Application,
}

/// Imports application descriptors into projects of a [`Database`].
#[derive(Clone)]
pub struct Importer {
    db: Database,
    strategy: Arc<dyn UpdateStrategy>,
    sanity: Arc<dyn SanityCheck>,
}

impl Importer {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            strategy: Arc::new(PreserveExisting),
            sanity: Arc::new(DefaultSanityCheck),
        }
    }

    /// What to do with an existing application when the import is forced.
    pub fn with_update_strategy(mut self, strategy: impl UpdateStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn with_sanity_check(mut self, sanity: impl SanityCheck + 'static) -> Self {
        self.sanity = Arc::new(sanity);
        self
    }

    pub async fn import(&self, request: ImportRequest) -> ImportOutcome {
        let descriptor = match parse_format(&request.format)
            .and_then(|format| decode(&request.body, format))
        {
            Ok(descriptor) => descriptor,
            Err(error) => return ImportOutcome::halted(Halt::before_apply(error), Vec::new()),
        };

        let db = self.db.clone();
        let strategy = self.strategy.clone();
        let project_key = request.project_key.clone();
        let force_update = request.force_update;

        let (produced, messages) = aggregate(request.locale, move |sink| {
            run(
                &db,
                &project_key,
                &descriptor,
                force_update,
                strategy.as_ref(),
                sink,
            )
        })
        .await;

        tracing::debug!("Import messages: {:?}", messages);

        let committed = match produced {
            Ok(Ok(committed)) => committed,
            Ok(Err(halt)) => return ImportOutcome::halted(halt, messages),
            Err(e) => {
                tracing::error!("Import into {} aborted: {:#}", request.project_key, e);
                return ImportOutcome::halted(Halt::before_apply(e.into()), messages);
            }
        };

        let (warnings, error) = self.check_sanity(&committed).await;

        ImportOutcome {
            status: ImportStatus::Committed,
            messages,
            error,
            application: Some(committed.application),
            warnings,
        }
    }

    async fn check_sanity(&self, committed: &Committed) -> (Vec<Warning>, Option<ImportError>) {
        let db = self.db.clone();
        let sanity = self.sanity.clone();
        let project = committed.project.clone();
        let application = committed.application.clone();

        let checked = tokio::task::spawn_blocking(move || sanity.check(&db, &project, &application))
            .await
            .context("sanity check panicked")
            .and_then(|result| result);

        match checked {
            Ok(warnings) => (warnings, None),
            Err(e) => {
                tracing::error!(
                    "Cannot check warnings for {}: {:#}",
                    committed.application.name,
                    e
                );
                (Vec::new(), Some(ImportError::Advisory(e)))
            }
        }
    }
}

/// The synchronous part of an import, run on the blocking pool.
fn run(
    db: &Database,
    project_key: &str,
    descriptor: &ApplicationDescriptor,
    force_update: bool,
    strategy: &dyn UpdateStrategy,
    sink: &MessageSink,
) -> Result<Committed, Halt> {
    let mut conn = db
        .lock()
        .map_err(|e| Halt::before_apply(e.into()))?;

    let project = store::load_project_by_key(&conn, project_key)
        .with_context(|| format!("Unable to load project {}", project_key))
        .map_err(|e| Halt::before_apply(e.into()))?
        .ok_or_else(|| Halt::before_apply(ImportError::ProjectNotFound(project_key.to_string())))?;

    let existing = store::load_application(&conn, project.id, &descriptor.name)
        .with_context(|| format!("Unable to check if application {} exists", descriptor.name))
        .map_err(|e| Halt::before_apply(e.into()))?;

    if existing.is_some() && !force_update {
        tracing::warn!(
            "Application {} already exists in {}",
            descriptor.name,
            project.key
        );
        return Err(Halt::before_apply(ImportError::AlreadyExists(
            descriptor.name.clone(),
        )));
    }

    // Dropping `tx` without committing rolls everything back.
    let tx = conn
        .transaction()
        .context("Cannot start transaction")
        .map_err(|e| Halt::before_apply(e.into()))?;

    let permissions = resolve_permissions(&tx, descriptor).map_err(Halt::before_apply)?;

    let verdict = validate(&tx, &project, descriptor, sink).map_err(Halt::before_apply)?;
    if let Some(error) = verdict.dominant {
        return Err(Halt::before_apply(error));
    }

    let ctx = ApplyContext {
        conn: &tx,
        project: &project,
        sink,
    };
    let application = apply::apply(&ctx, descriptor, &permissions, existing, strategy)
        .map_err(|e| {
            tracing::warn!("Import of {} rolled back: {}", descriptor.name, e);
            Halt::during_apply(e)
        })?;

    store::touch_project(&tx, project.id)
        .context("Unable to update project")
        .map_err(|e| Halt::during_apply(e.into()))?;
    tx.commit()
        .context("Cannot commit transaction")
        .map_err(|e| Halt::during_apply(e.into()))?;

    tracing::info!("Application {} imported into {}", application.name, project.key);

    Ok(Committed {
        project,
        application,
    })
}

fn resolve_permissions(
    conn: &rusqlite::Connection,
    descriptor: &ApplicationDescriptor,
) -> Result<Vec<ResolvedPermission>, ImportError> {
    descriptor
        .permissions
        .iter()
        .map(|permission| -> Result<ResolvedPermission, ImportError> {
            let group = store::load_group(conn, &permission.group)
                .context("Error loading groups for permission")?
                .ok_or_else(|| ImportError::GroupNotFound(permission.group.clone()))?;
            Ok(ResolvedPermission {
                group,
                level: permission.level,
            })
        })
        .collect()
}
