use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::ACCEPT_LANGUAGE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::db::Database;
use crate::import::ImportRequest;
use crate::models::*;

use super::AppState;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
///
/// Missing projects and duplicate names are safe to expose and map to 404 and
/// 409. Anything else is logged and hidden behind a generic 500.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();

    if msg.contains("not found") {
        tracing::warn!("Lookup error: {}", msg);
        return (StatusCode::NOT_FOUND, msg);
    }
    if msg.contains("UNIQUE constraint failed") {
        tracing::warn!("Conflict: {}", msg);
        return (StatusCode::CONFLICT, "Already exists".to_string());
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(
    State(db): State<Database>,
) -> Result<Json<Vec<Project>>, (StatusCode, String)> {
    db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(db): State<Database>,
    Path(key): Path<String>,
) -> Result<Json<ProjectWithCatalog>, (StatusCode, String)> {
    db.get_project_with_catalog(&key)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), (StatusCode, String)> {
    if input.key.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Project key is required".to_string()));
    }
    db.create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn create_environment(
    State(db): State<Database>,
    Path(key): Path<String>,
    Json(input): Json<NamedInput>,
) -> Result<(StatusCode, Json<Environment>), (StatusCode, String)> {
    db.create_environment(&key, &input.name)
        .map(|e| (StatusCode::CREATED, Json(e)))
        .map_err(internal_error)
}

pub async fn create_pipeline(
    State(db): State<Database>,
    Path(key): Path<String>,
    Json(input): Json<NamedInput>,
) -> Result<(StatusCode, Json<Pipeline>), (StatusCode, String)> {
    db.create_pipeline(&key, &input.name)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

// ============================================================
// Groups
// ============================================================

pub async fn create_group(
    State(db): State<Database>,
    Json(input): Json<NamedInput>,
) -> Result<(StatusCode, Json<Group>), (StatusCode, String)> {
    db.create_group(&input.name)
        .map(|g| (StatusCode::CREATED, Json(g)))
        .map_err(internal_error)
}

// ============================================================
// Applications
// ============================================================

pub async fn list_applications(
    State(db): State<Database>,
    Path(key): Path<String>,
) -> Result<Json<Vec<Application>>, (StatusCode, String)> {
    db.get_applications(&key).map(Json).map_err(internal_error)
}

pub async fn get_application(
    State(db): State<Database>,
    Path((key, name)): Path<(String, String)>,
) -> Result<Json<ApplicationDetail>, (StatusCode, String)> {
    db.get_application_detail(&key, &name)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Application not found".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default, rename = "forceUpdate")]
    pub force_update: bool,
}

fn default_format() -> String {
    "yaml".to_string()
}

/// Imports the descriptor in the body and answers with the diagnostic list.
pub async fn import_application(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Vec<String>>) {
    let locale = headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(Locale::from_accept_language)
        .unwrap_or(state.default_locale);

    let outcome = state
        .importer
        .import(ImportRequest {
            project_key: key,
            body: body.to_vec(),
            format: query.format,
            force_update: query.force_update,
            locale,
        })
        .await;

    if let Some(error) = outcome.error.as_ref().filter(|e| !e.is_structured()) {
        tracing::error!("Import failed: {:#}", error);
    }

    (outcome.status_code(), Json(outcome.messages))
}
