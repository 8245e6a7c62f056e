//! Logged hours: entry, validation and the caller's monthly summary

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chantiers_common::domain::Action;
use chantiers_common::time;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ensure_exists, paginate, Actor};
use crate::db::heures::{self, HeureFilter, HeureTravail, NewHeureTravail};
use crate::db::taches;
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Hour entry payload
///
/// `tache` is only read on `POST /heures_travail`; the nested
/// `POST /taches/:id/heures` takes it from the path.
#[derive(Debug, Deserialize)]
pub struct HeureCreate {
    pub tache: Option<i64>,
    /// Defaults to the caller's own membre profile
    pub membre: Option<i64>,
    /// Defaults to today
    pub date: Option<NaiveDate>,
    pub heures: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// `GET /heures_travail/mes_heures` body
#[derive(Debug, Serialize)]
pub struct MesHeures {
    pub heures: Vec<HeureTravail>,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_heures: Decimal,
    /// `YYYY-MM`
    pub mois: String,
}

/// Validate and store one hour entry against `tache_id`
pub(crate) async fn log_hours(
    state: &AppState,
    actor: &Actor,
    tache_id: i64,
    payload: HeureCreate,
) -> ApiResult<HeureTravail> {
    actor.require(Action::LogHours)?;
    ensure_exists(state, "taches", "Tache", tache_id).await?;
    if let Some(other) = payload.membre.filter(|&m| Some(m) != actor.membre_id()) {
        if !actor.allows(Action::ManageTeams) {
            warn!(
                "Denied logging hours for membre {} to user {}",
                other, actor.username
            );
            return Err(ApiError::Forbidden(
                "Only staff or a chef may log hours for another membre".to_string(),
            ));
        }
    }

    let mut errors = FieldErrors::new();
    let membre = errors.present("membre", payload.membre.or(actor.membre_id()));
    let heures = errors.present("heures", payload.heures);
    if let Some(h) = heures {
        errors.hours("heures", h);
    }
    errors.coordinates(payload.latitude, payload.longitude);
    let (Some(membre), Some(heures)) = (membre, heures) else {
        return Err(ApiError::Validation(errors));
    };
    errors.into_result()?;
    ensure_exists(state, "membres", "Membre", membre).await?;

    let entry = NewHeureTravail {
        tache: tache_id,
        membre,
        date: payload.date.unwrap_or_else(time::today),
        heures,
        description: payload.description,
        latitude: payload.latitude,
        longitude: payload.longitude,
    };
    let id = heures::insert(&state.db, &entry).await?;
    info!(
        "{}h logged on tache {} for membre {} by {}",
        entry.heures, tache_id, membre, actor.username
    );

    load(state, id).await
}

async fn load(state: &AppState, id: i64) -> ApiResult<HeureTravail> {
    heures::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("HeureTravail", id))
}

/// GET /heures_travail
pub async fn list_heures(
    State(state): State<AppState>,
    query: Result<Query<HeureFilter>, QueryRejection>,
) -> ApiResult<Json<Page<HeureTravail>>> {
    let Query(filter) = query?;
    let total = heures::count(&state.db, &filter).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = heures::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(total, pagination, rows)))
}

/// POST /heures_travail
pub async fn create_heure(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<HeureCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<HeureTravail>)> {
    let Json(payload) = payload?;
    let mut errors = FieldErrors::new();
    let Some(tache) = errors.present("tache", payload.tache) else {
        return Err(ApiError::Validation(errors));
    };
    let entry = log_hours(&state, &actor, tache, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /heures_travail/:id
pub async fn get_heure(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<HeureTravail>> {
    Ok(Json(load(&state, id).await?))
}

/// POST /heures_travail/:id/valider
///
/// Staff, chef-role membres and the chef of the entry's chantier may
/// validate. Validation is one way; a second call is a 409.
pub async fn validate_heure(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<HeureTravail>> {
    let entry = load(&state, id).await?;
    let chef = taches::chantier_of(&state.db, entry.tache)
        .await?
        .and_then(|(_, chef)| chef);
    actor.require_or_chef(Action::ValidateHours, chef)?;

    if !heures::validate(&state.db, id, actor.user_id).await? {
        return Err(ApiError::Conflict(format!("HeureTravail {} is already validated", id)));
    }
    info!("HeureTravail {} validated by {}", id, actor.username);

    Ok(Json(load(&state, id).await?))
}

/// GET /heures_travail/mes_heures
///
/// Entries of the current calendar month for the caller's membre profile.
pub async fn my_hours(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<MesHeures>> {
    let membre = actor.membre_id().ok_or_else(|| {
        ApiError::NotFound(format!("No membre profile for user {}", actor.username))
    })?;

    let today = time::today();
    let (first, last) = time::month_bounds(today);
    let entries = heures::list_for_membre_between(&state.db, membre, first, last).await?;
    let total_heures: Decimal = entries.iter().map(|e| e.heures).sum();

    Ok(Json(MesHeures {
        heures: entries,
        total_heures,
        mois: today.format("%Y-%m").to_string(),
    }))
}

/// Build hour routes
pub fn heure_routes() -> Router<AppState> {
    Router::new()
        .route("/heures_travail", get(list_heures).post(create_heure))
        .route("/heures_travail/mes_heures", get(my_hours))
        .route("/heures_travail/:id", get(get_heure))
        .route("/heures_travail/:id/valider", post(validate_heure))
}
