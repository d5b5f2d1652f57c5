//! Advisory checks run after an import committed.
//!
//! Findings are stored as warnings on the application and returned to the
//! caller. They never undo an import.

use anyhow::Result;

use crate::db::{store, Database};
use crate::models::*;

pub trait SanityCheck: Send + Sync {
    fn check(&self, db: &Database, project: &Project, application: &Application) -> Result<Vec<Warning>>;
}

/// Built-in checks:
///
/// - the application uses no pipeline at all,
/// - a repository is bound but nothing (hook or poller) listens to it,
/// - a notification has nobody to notify.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSanityCheck;

impl SanityCheck for DefaultSanityCheck {
    fn check(&self, db: &Database, project: &Project, application: &Application) -> Result<Vec<Warning>> {
        let findings = {
            let conn = db.lock()?;
            let pipelines = store::load_attached_pipelines(&conn, application.id)?;
            let hooks = store::load_hooks(&conn, application.id)?;
            let pollers = store::load_pollers(&conn, application.id)?;
            let notifications = store::load_notifications(&conn, application.id)?;

            let mut findings = Vec::new();
            if pipelines.is_empty() {
                findings.push((
                    WarningKind::NoPipelines,
                    format!("Application {}/{} uses no pipeline", project.key, application.name),
                ));
            }
            if let Some(repository) = &application.repository {
                if hooks.is_empty() && pollers.is_empty() {
                    findings.push((
                        WarningKind::RepositoryWithoutTriggers,
                        format!(
                            "Repository {} is bound to {} but no hook or poller uses it",
                            repository.fullname, application.name
                        ),
                    ));
                }
            }
            for notification in notifications.iter().filter(|n| n.config.recipients.is_empty()) {
                let pipeline = pipelines
                    .iter()
                    .find(|p| p.id == notification.pipeline_id)
                    .map(|p| p.name.as_str())
                    .unwrap_or("unknown");
                findings.push((
                    WarningKind::NotificationWithoutRecipients,
                    format!(
                        "{} notification on pipeline {} has no recipients",
                        notification.config.kind.as_str(),
                        pipeline
                    ),
                ));
            }
            findings
        };

        if !findings.is_empty() {
            tracing::info!(
                "Application {}/{} has {} warning(s)",
                project.key,
                application.name,
                findings.len()
            );
        }

        db.replace_warnings(application, &findings)
    }
}
