//! HTTP handlers for chantiers-api
//!
//! One module per resource; each exposes a `*_routes()` builder that is
//! mounted under `/api/v1` behind the bearer-token middleware.

pub mod anomalies;
pub mod auth;
pub mod chantiers;
pub mod equipes;
pub mod health;
pub mod heures;
pub mod lots;
pub mod membres;
pub mod photos;
pub mod sous_traitants;
pub mod taches;

pub use anomalies::anomalie_routes;
pub use auth::{auth_middleware, Actor};
pub use chantiers::chantier_routes;
pub use equipes::equipe_routes;
pub use health::health_routes;
pub use heures::heure_routes;
pub use lots::lot_routes;
pub use membres::membre_routes;
pub use photos::photo_routes;
pub use sous_traitants::sous_traitant_routes;
pub use taches::tache_routes;

use crate::pagination::{calculate_pagination, Pagination};
use crate::AppState;

/// Pagination for a list endpoint using the configured page size
pub(crate) fn paginate(state: &AppState, total: i64, requested_page: Option<i64>) -> Pagination {
    calculate_pagination(total, requested_page.unwrap_or(1), state.config.page_size)
}

/// 404 unless a row with `id` exists in `table`
pub(crate) async fn ensure_exists(
    state: &AppState,
    table: &'static str,
    resource: &str,
    id: i64,
) -> crate::ApiResult<()> {
    if crate::db::exists(&state.db, table, id).await? {
        Ok(())
    } else {
        Err(crate::ApiError::not_found(resource, id))
    }
}
