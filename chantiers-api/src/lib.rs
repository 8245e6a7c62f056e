//! chantiers-api library
//!
//! REST service for construction-site tracking: chantiers, lots, tâches,
//! logged hours, photo reports, anomalies and the teams working on them.

use axum::Router;
use chantiers_common::config::ServerConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod pagination;
pub mod storage;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use crate::storage::PhotoStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Configuration resolved at startup
    pub config: Arc<ServerConfig>,
    /// Blob store for uploaded photos
    pub photos: PhotoStore,
}

impl AppState {
    pub fn new(db: SqlitePool, config: ServerConfig) -> Self {
        let photos = PhotoStore::new(config.media_root.clone(), config.max_upload_bytes);
        Self {
            db,
            config: Arc::new(config),
            photos,
        }
    }
}

/// Build application router
///
/// `/health` and `/media` are public; everything under `/api/v1` requires a
/// bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let protected = Router::new()
        .merge(api::chantier_routes())
        .merge(api::lot_routes())
        .merge(api::tache_routes(&state))
        .merge(api::heure_routes())
        .merge(api::photo_routes())
        .merge(api::anomalie_routes())
        .merge(api::equipe_routes())
        .merge(api::membre_routes())
        .merge(api::sous_traitant_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let media = ServeDir::new(state.photos.media_root());

    Router::new()
        .nest("/api/v1", protected)
        .merge(api::health_routes())
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
