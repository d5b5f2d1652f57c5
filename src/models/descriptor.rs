use serde::{Deserialize, Serialize};

/// Wire spelling of the default environment.
pub const DEFAULT_ENV_NAME: &str = "NoEnv";

/// The parsed, in-memory form of a user-submitted application definition.
///
/// A descriptor only carries names. Every name is a reference that the import
/// engine resolves against the target project before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationDescriptor {
    pub name: String,
    /// Repository-manager binding. Hooks and pollers are only created when set.
    #[serde(default)]
    pub repository: Option<RepositoryBinding>,
    #[serde(default)]
    pub permissions: Vec<GroupPermission>,
    #[serde(default)]
    pub pipelines: Vec<PipelineUsage>,
    #[serde(default)]
    pub hooks: Vec<HookBinding>,
    #[serde(default)]
    pub pollers: Vec<PollerBinding>,
    #[serde(default)]
    pub notifications: Vec<NotificationSetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryBinding {
    /// Name of the repositories manager (e.g. `github`, `stash`).
    pub manager: String,
    /// Full repository name on the manager (e.g. `org/api`).
    pub fullname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupPermission {
    pub group: String,
    pub level: PermissionLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Read,
    ReadExecute,
    ReadWriteExecute,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ReadExecute => "read_execute",
            Self::ReadWriteExecute => "read_write_execute",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "read_execute" => Some(Self::ReadExecute),
            "read_write_execute" => Some(Self::ReadWriteExecute),
            _ => None,
        }
    }
}

/// A pipeline used by the application, with the triggers it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineUsage {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// Chains a run of the owning pipeline into another pipeline, possibly in
/// another application of the same project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trigger {
    pub dest_pipeline: String,
    /// Defaults to the application being imported.
    #[serde(default)]
    pub dest_application: Option<String>,
    #[serde(default)]
    pub src_environment: EnvRef,
    #[serde(default)]
    pub dest_environment: EnvRef,
    #[serde(default)]
    pub manual: bool,
}

impl Trigger {
    /// Destination application name, falling back to `current`.
    pub fn dest_application_or<'a>(&'a self, current: &'a str) -> &'a str {
        self.dest_application.as_deref().unwrap_or(current)
    }
}

/// Reference to an environment by name, or to "no specific environment".
///
/// On the wire the default is spelled as an absent field, an empty string or
/// [`DEFAULT_ENV_NAME`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum EnvRef {
    #[default]
    Default,
    Named(String),
}

impl EnvRef {
    pub fn named(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl From<Option<String>> for EnvRef {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.is_empty() && name != DEFAULT_ENV_NAME => Self::Named(name),
            _ => Self::Default,
        }
    }
}

impl From<EnvRef> for Option<String> {
    fn from(value: EnvRef) -> Self {
        match value {
            EnvRef::Default => None,
            EnvRef::Named(name) => Some(name),
        }
    }
}

impl std::fmt::Display for EnvRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.named().unwrap_or(DEFAULT_ENV_NAME))
    }
}

/// Binds a pipeline to the repository's push events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookBinding {
    pub pipeline: String,
}

/// Binds a pipeline to periodic repository polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollerBinding {
    pub pipeline: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Who gets told about runs of a pipeline in an environment, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSetting {
    pub pipeline: String,
    #[serde(default)]
    pub environment: EnvRef,
    #[serde(flatten)]
    pub config: NotificationConfig,
}

/// Delivery configuration, persisted as JSON alongside the notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationConfig {
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default = "NotifyWhen::on_success_default")]
    pub on_success: NotifyWhen,
    #[serde(default = "NotifyWhen::on_failure_default")]
    pub on_failure: NotifyWhen,
    #[serde(default)]
    pub on_start: bool,
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Email,
    Jabber,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Jabber => "jabber",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyWhen {
    Always,
    #[default]
    Change,
    Never,
}

impl NotifyWhen {
    fn on_success_default() -> Self {
        Self::Change
    }

    fn on_failure_default() -> Self {
        Self::Always
    }
}
