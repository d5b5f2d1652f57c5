use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project owning pipelines, environments and applications.
///
/// Projects are addressed by their short `key` (e.g. `PAY`) in the import
/// API; the `id` is only used internally to scope catalog lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Bumped by every committed import.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub key: String,
    pub name: String,
}

/// A named deployment target inside a project (e.g. `staging`, `prod`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Environment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A pipeline definition that applications can attach.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pipeline {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a named entity (environment or pipeline) to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedInput {
    pub name: String,
}

/// A permission group. Groups are global, not project scoped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
}

/// A project together with its environments and pipelines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWithCatalog {
    #[serde(flatten)]
    pub project: Project,
    pub environments: Vec<Environment>,
    pub pipelines: Vec<Pipeline>,
}
