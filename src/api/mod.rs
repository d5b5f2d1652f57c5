mod handlers;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::import::Importer;
use crate::models::Locale;

/// Shared state of the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub importer: Arc<Importer>,
    /// Used when `Accept-Language` names no supported language.
    pub default_locale: Locale,
}

impl AppState {
    /// State with the default importer and locale.
    pub fn new(db: Database) -> Self {
        Self {
            importer: Arc::new(Importer::new(db.clone())),
            db,
            default_locale: Locale::default(),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects", post(handlers::create_project))
        .route("/projects/{key}", get(handlers::get_project))
        .route("/projects/{key}/environments", post(handlers::create_environment))
        .route("/projects/{key}/pipelines", post(handlers::create_pipeline))
        // Applications
        .route("/projects/{key}/applications", get(handlers::list_applications))
        .route("/projects/{key}/applications/{name}", get(handlers::get_application))
        .route("/projects/{key}/import", post(handlers::import_application))
        // Groups
        .route("/groups", post(handlers::create_group))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
