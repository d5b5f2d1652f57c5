use axum::http::StatusCode;
use thiserror::Error;

/// Why an import did not (fully) succeed.
///
/// Only one error is reported per import even when validation found several
/// problems; the full list lives in the outcome's messages.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("wrong request: {0}")]
    WrongRequest(String),

    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("application {0} already exists")]
    AlreadyExists(String),

    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("pipeline {0} not found")]
    PipelineNotFound(String),

    #[error("application {0} not found")]
    ApplicationNotFound(String),

    #[error("environment {0} not found")]
    EnvironmentNotFound(String),

    /// Store failure; the context chain names the step that failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),

    /// The post-import sanity check failed. The import itself is committed.
    #[error("post-import check failed: {0:#}")]
    Advisory(#[source] anyhow::Error),
}

impl ImportError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::WrongRequest(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::ProjectNotFound(_)
            | Self::GroupNotFound(_)
            | Self::PipelineNotFound(_)
            | Self::ApplicationNotFound(_)
            | Self::EnvironmentNotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Advisory(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Domain errors whose status and message list are meant for the caller.
    /// Everything else is an unexpected failure.
    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Advisory(_))
    }
}
