use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{NotificationConfig, Pipeline, PermissionLevel, RepositoryBinding};

/// An application persisted in a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub repository: Option<RepositoryBinding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A group permission granted on an application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationGroup {
    pub group_id: Uuid,
    pub group_name: String,
    pub level: PermissionLevel,
}

/// A persisted trigger. `None` environments mean the default environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineTrigger {
    pub id: Uuid,
    pub src_application_id: Uuid,
    pub src_pipeline_id: Uuid,
    pub src_environment_id: Option<Uuid>,
    pub dest_application_id: Uuid,
    pub dest_pipeline_id: Uuid,
    pub dest_environment_id: Option<Uuid>,
    pub manual: bool,
}

/// Identifiers of a trigger about to be inserted.
#[derive(Debug, Clone, Copy)]
pub struct NewTrigger {
    pub src_application_id: Uuid,
    pub src_pipeline_id: Uuid,
    pub src_environment_id: Option<Uuid>,
    pub dest_application_id: Uuid,
    pub dest_pipeline_id: Uuid,
    pub dest_environment_id: Option<Uuid>,
    pub manual: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hook {
    pub id: Uuid,
    pub application_id: Uuid,
    pub pipeline_id: Uuid,
    pub repository_manager: String,
    pub repository_fullname: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Poller {
    pub id: Uuid,
    pub application_id: Uuid,
    pub pipeline_id: Uuid,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification settings for one (application, pipeline, environment) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub application_id: Uuid,
    pub pipeline_id: Uuid,
    /// `None` targets the default environment.
    pub environment_id: Option<Uuid>,
    pub config: NotificationConfig,
    pub updated_at: DateTime<Utc>,
}

/// An advisory finding recorded after an import committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warning {
    pub id: Uuid,
    pub application_id: Uuid,
    pub kind: WarningKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    NoPipelines,
    RepositoryWithoutTriggers,
    NotificationWithoutRecipients,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPipelines => "no_pipelines",
            Self::RepositoryWithoutTriggers => "repository_without_triggers",
            Self::NotificationWithoutRecipients => "notification_without_recipients",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "no_pipelines" => Some(Self::NoPipelines),
            "repository_without_triggers" => Some(Self::RepositoryWithoutTriggers),
            "notification_without_recipients" => Some(Self::NotificationWithoutRecipients),
            _ => None,
        }
    }
}

/// An application with everything an import attaches to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    pub groups: Vec<ApplicationGroup>,
    pub pipelines: Vec<Pipeline>,
    pub triggers: Vec<PipelineTrigger>,
    pub hooks: Vec<Hook>,
    pub pollers: Vec<Poller>,
    pub notifications: Vec<Notification>,
    pub warnings: Vec<Warning>,
}
