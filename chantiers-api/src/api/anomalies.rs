//! Anomaly endpoints and the OUVERTE → ASSIGNEE → FERMEE workflow

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chantiers_common::domain::{anomalie_overdue, Action, AnomalieStatut};
use chantiers_common::time;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ensure_exists, paginate, Actor};
use crate::db::anomalies::{self, Anomalie, AnomalieFilter};
use crate::db::taches;
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Anomaly with its overdue flag
#[derive(Debug, Serialize)]
pub struct AnomalieResponse {
    #[serde(flatten)]
    pub anomalie: Anomalie,
    pub en_retard: bool,
}

impl AnomalieResponse {
    pub fn new(anomalie: Anomalie, today: NaiveDate) -> Self {
        Self {
            en_retard: anomalie_overdue(anomalie.statut, anomalie.date_resolution_prevue, today),
            anomalie,
        }
    }
}

pub(crate) fn responses(anomalies: Vec<Anomalie>) -> Vec<AnomalieResponse> {
    let today = time::today();
    anomalies
        .into_iter()
        .map(|a| AnomalieResponse::new(a, today))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub responsable_id: Option<i64>,
}

async fn load(state: &AppState, id: i64) -> ApiResult<Anomalie> {
    anomalies::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Anomalie", id))
}

/// Chef of the chantier an anomaly belongs to
async fn chantier_chef(state: &AppState, anomalie: &Anomalie) -> ApiResult<Option<i64>> {
    Ok(taches::chantier_of(&state.db, anomalie.tache)
        .await?
        .and_then(|(_, chef)| chef))
}

/// GET /anomalies
pub async fn list_anomalies(
    State(state): State<AppState>,
    query: Result<Query<AnomalieFilter>, QueryRejection>,
) -> ApiResult<Json<Page<AnomalieResponse>>> {
    let Query(filter) = query?;
    let total = anomalies::count(&state.db, &filter).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = anomalies::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(total, pagination, responses(rows))))
}

/// GET /anomalies/:id
pub async fn get_anomalie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AnomalieResponse>> {
    let anomalie = load(&state, id).await?;
    Ok(Json(AnomalieResponse::new(anomalie, time::today())))
}

/// POST /anomalies/:id/assigner
///
/// Body `{"responsable_id": <membre id>}`. Reassigning an ASSIGNEE anomaly is
/// allowed; a FERMEE one is a 409.
pub async fn assign_anomalie(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> ApiResult<Json<AnomalieResponse>> {
    let Json(payload) = payload?;
    let anomalie = load(&state, id).await?;
    actor.require_or_chef(Action::AssignAnomalie, chantier_chef(&state, &anomalie).await?)?;

    let mut errors = FieldErrors::new();
    let Some(responsable) = errors.present("responsable_id", payload.responsable_id) else {
        return Err(ApiError::Validation(errors));
    };

    anomalie.statut.assign()?;
    ensure_exists(&state, "membres", "Membre", responsable).await?;

    // Conditional on the status read above; a concurrent change is a conflict
    if !anomalies::assign(&state.db, id, anomalie.statut, responsable).await? {
        return Err(ApiError::Conflict(format!(
            "Anomalie {} changed status concurrently",
            id
        )));
    }
    info!("Anomalie {} assigned to membre {} by {}", id, responsable, actor.username);

    let anomalie = load(&state, id).await?;
    Ok(Json(AnomalieResponse::new(anomalie, time::today())))
}

/// POST /anomalies/:id/fermer
///
/// Only an ASSIGNEE anomaly can be closed; the resolution date is today.
pub async fn close_anomalie(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AnomalieResponse>> {
    let anomalie = load(&state, id).await?;
    actor.require_or_chef(Action::CloseAnomalie, chantier_chef(&state, &anomalie).await?)?;

    anomalie.statut.close()?;
    let today = time::today();
    if !anomalies::close(&state.db, id, today).await? {
        return Err(ApiError::Conflict(format!(
            "Anomalie {} is no longer {}",
            id,
            AnomalieStatut::Assignee
        )));
    }
    info!("Anomalie {} closed by {}", id, actor.username);

    let anomalie = load(&state, id).await?;
    Ok(Json(AnomalieResponse::new(anomalie, today)))
}

/// Build anomaly routes
pub fn anomalie_routes() -> Router<AppState> {
    Router::new()
        .route("/anomalies", get(list_anomalies))
        .route("/anomalies/:id", get(get_anomalie))
        .route("/anomalies/:id/assigner", post(assign_anomalie))
        .route("/anomalies/:id/fermer", post(close_anomalie))
}
