//! Lot endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chantiers_common::domain::{chantier_overdue, Action, ChantierStatus};
use chantiers_common::time;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::{ensure_exists, paginate, Actor};
use crate::db::lots::{self, Lot, LotData, LotFilter};
use crate::db::stats::{self, Scope};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Lot with its derived fields
#[derive(Debug, Serialize)]
pub struct LotResponse {
    #[serde(flatten)]
    pub lot: Lot,
    pub progression: f64,
    pub nombre_taches: i64,
    pub en_retard: bool,
}

/// Attach derived fields to a set of lots (two queries for the whole set)
pub(crate) async fn lot_responses(
    db: &SqlitePool,
    lots: Vec<Lot>,
    today: NaiveDate,
) -> ApiResult<Vec<LotResponse>> {
    let ids: Vec<i64> = lots.iter().map(|l| l.id).collect();
    let stats = stats::load(db, Scope::Lots, &ids).await?;
    let groups = stats::group_by(&stats, |s| s.lot_id);

    Ok(lots
        .into_iter()
        .map(|lot| {
            let rollup = groups
                .get(&lot.id)
                .map(|group| stats::rollup(group.iter().copied()))
                .unwrap_or_default();
            LotResponse {
                en_retard: chantier_overdue(lot.data.status, lot.data.date_fin_prevue, today),
                progression: rollup.progression,
                nombre_taches: rollup.taches_totales,
                lot,
            }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
pub struct LotCreate {
    pub chantier: Option<i64>,
    pub numero: Option<i64>,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub description: String,
    pub date_debut_prevue: Option<NaiveDate>,
    pub date_fin_prevue: Option<NaiveDate>,
    pub responsable: Option<i64>,
    pub budget_lot: Option<Decimal>,
    #[serde(default)]
    pub status: ChantierStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct LotPatch {
    pub chantier: Option<i64>,
    pub numero: Option<i64>,
    pub nom: Option<String>,
    pub description: Option<String>,
    pub date_debut_prevue: Option<NaiveDate>,
    pub date_fin_prevue: Option<NaiveDate>,
    pub responsable: Option<i64>,
    pub budget_lot: Option<Decimal>,
    pub status: Option<ChantierStatus>,
}

impl LotPatch {
    fn apply(self, data: &mut LotData) {
        if let Some(v) = self.chantier {
            data.chantier = v;
        }
        if let Some(v) = self.numero {
            data.numero = v;
        }
        if let Some(v) = self.nom {
            data.nom = v;
        }
        if let Some(v) = self.description {
            data.description = v;
        }
        if let Some(v) = self.date_debut_prevue {
            data.date_debut_prevue = v;
        }
        if let Some(v) = self.date_fin_prevue {
            data.date_fin_prevue = v;
        }
        if let Some(v) = self.responsable {
            data.responsable = Some(v);
        }
        if let Some(v) = self.budget_lot {
            data.budget_lot = v;
        }
        if let Some(v) = self.status {
            data.status = v;
        }
    }
}

fn check(data: &LotData, errors: &mut FieldErrors) {
    errors.required("nom", &data.nom);
    if data.numero < 1 {
        errors.add("numero", "Ensure this value is greater than or equal to 1.");
    }
    errors.date_order("date_fin_prevue", data.date_debut_prevue, data.date_fin_prevue);
    errors.non_negative("budget_lot", data.budget_lot);
}

/// Referenced chantier and responsable must exist
async fn check_references(state: &AppState, data: &LotData) -> ApiResult<()> {
    ensure_exists(state, "chantiers", "Chantier", data.chantier).await?;
    if let Some(user) = data.responsable {
        ensure_exists(state, "users", "User", user).await?;
    }
    Ok(())
}

async fn load(state: &AppState, id: i64) -> ApiResult<Lot> {
    lots::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lot", id))
}

async fn respond(state: &AppState, lot: Lot) -> ApiResult<LotResponse> {
    lot_responses(&state.db, vec![lot], time::today())
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("Lot response missing".to_string()))
}

/// GET /lots
pub async fn list_lots(
    State(state): State<AppState>,
    query: Result<Query<LotFilter>, QueryRejection>,
) -> ApiResult<Json<Page<LotResponse>>> {
    let Query(filter) = query?;
    let total = lots::count(&state.db, &filter).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = lots::list(&state.db, &filter, pagination).await?;
    let results = lot_responses(&state.db, rows, time::today()).await?;
    Ok(Json(Page::new(total, pagination, results)))
}

/// POST /lots
pub async fn create_lot(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<LotCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LotResponse>)> {
    actor.require(Action::ManagePlanning)?;
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    let chantier = errors.present("chantier", payload.chantier);
    let numero = errors.present("numero", payload.numero);
    let debut = errors.present("date_debut_prevue", payload.date_debut_prevue);
    let fin = errors.present("date_fin_prevue", payload.date_fin_prevue);
    let (Some(chantier), Some(numero), Some(debut), Some(fin)) = (chantier, numero, debut, fin)
    else {
        errors.required("nom", &payload.nom);
        return Err(ApiError::Validation(errors));
    };

    let data = LotData {
        chantier,
        numero,
        nom: payload.nom,
        description: payload.description,
        date_debut_prevue: debut,
        date_fin_prevue: fin,
        responsable: payload.responsable,
        budget_lot: payload.budget_lot.unwrap_or(Decimal::ZERO),
        status: payload.status,
    };
    check(&data, &mut errors);
    errors.into_result()?;
    check_references(&state, &data).await?;

    let id = lots::insert(&state.db, &data).await?;
    info!("Lot {} created in chantier {} by {}", id, data.chantier, actor.username);

    let lot = load(&state, id).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, lot).await?)))
}

/// GET /lots/:id
pub async fn get_lot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LotResponse>> {
    let lot = load(&state, id).await?;
    Ok(Json(respond(&state, lot).await?))
}

/// PATCH /lots/:id
pub async fn update_lot(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<LotPatch>, JsonRejection>,
) -> ApiResult<Json<LotResponse>> {
    actor.require(Action::ManagePlanning)?;
    let Json(patch) = payload?;
    let mut data = load(&state, id).await?.data;
    patch.apply(&mut data);

    let mut errors = FieldErrors::new();
    check(&data, &mut errors);
    errors.into_result()?;
    check_references(&state, &data).await?;

    lots::update(&state.db, id, &data).await?;
    info!("Lot {} updated by {}", id, actor.username);

    let lot = load(&state, id).await?;
    Ok(Json(respond(&state, lot).await?))
}

/// DELETE /lots/:id
pub async fn delete_lot(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    actor.require(Action::ManagePlanning)?;
    if !lots::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Lot", id));
    }
    info!("Lot {} deleted by {}", id, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Build lot routes
pub fn lot_routes() -> Router<AppState> {
    Router::new()
        .route("/lots", get(list_lots).post(create_lot))
        .route("/lots/:id", get(get_lot).patch(update_lot).delete(delete_lot))
}
