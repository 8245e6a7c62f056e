//! Tâche endpoints and the field actions hanging off a tâche
//! (hours, photos, anomaly reports)

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chantiers_common::domain::{tache_overdue, Action, Severite, TacheStatus, TacheTotals};
use chantiers_common::time;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{info, warn};

use super::anomalies::{self as anomalie_api, AnomalieResponse};
use super::heures::{self as heure_api, HeureCreate};
use super::photos::{self as photo_api, PhotoResponse};
use super::{ensure_exists, paginate, Actor};
use crate::db::anomalies::{self, NewAnomalie};
use crate::db::heures::{self, HeureTravail};
use crate::db::photos;
use crate::db::stats::{self, Scope};
use crate::db::taches::{self, ChildCounts, Tache, TacheData, TacheFilter};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Room for multipart boundaries and text fields on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Tâche with hours, cost and child counts
#[derive(Debug, Serialize)]
pub struct TacheResponse {
    #[serde(flatten)]
    pub tache: Tache,
    #[serde(with = "rust_decimal::serde::float")]
    pub heures_reelles: Decimal,
    pub cout_reel: Decimal,
    pub en_retard: bool,
    pub sous_traitants: Vec<i64>,
    #[serde(flatten)]
    pub counts: ChildCounts,
}

async fn tache_responses(
    db: &SqlitePool,
    taches: Vec<Tache>,
    today: NaiveDate,
) -> ApiResult<Vec<TacheResponse>> {
    let ids: Vec<i64> = taches.iter().map(|t| t.id).collect();
    let totals: HashMap<i64, TacheTotals> = stats::load(db, Scope::Taches, &ids)
        .await?
        .iter()
        .map(|stat| (stat.id, stat.totals()))
        .collect();
    let counts = taches::child_counts(db, &ids).await?;
    let mut links = taches::sous_traitants_by_tache(db, &ids).await?;

    Ok(taches
        .into_iter()
        .map(|tache| {
            let totals = totals.get(&tache.id).copied().unwrap_or_default();
            TacheResponse {
                heures_reelles: totals.heures_reelles,
                cout_reel: totals.cout_reel,
                en_retard: tache_overdue(
                    tache.data.status,
                    tache.data.date_fin_prevue,
                    tache.data.date_fin_reelle,
                    today,
                ),
                sous_traitants: links.remove(&tache.id).unwrap_or_default(),
                counts: counts.get(&tache.id).copied().unwrap_or_default(),
                tache,
            }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
pub struct TacheCreate {
    pub lot: Option<i64>,
    #[serde(default)]
    pub numero: String,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub description: String,
    pub ordre: Option<i64>,
    pub date_debut_prevue: Option<NaiveDate>,
    pub date_fin_prevue: Option<NaiveDate>,
    pub date_debut_reelle: Option<NaiveDate>,
    pub date_fin_reelle: Option<NaiveDate>,
    #[serde(default)]
    pub status: TacheStatus,
    pub heures_estimees: Option<Decimal>,
    pub taux_horaire: Option<Decimal>,
    pub cout_materiaux: Option<Decimal>,
    pub equipe: Option<i64>,
    #[serde(default)]
    pub sous_traitants: Vec<i64>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TachePatch {
    pub lot: Option<i64>,
    pub numero: Option<String>,
    pub nom: Option<String>,
    pub description: Option<String>,
    pub ordre: Option<i64>,
    pub date_debut_prevue: Option<NaiveDate>,
    pub date_fin_prevue: Option<NaiveDate>,
    pub date_debut_reelle: Option<NaiveDate>,
    pub date_fin_reelle: Option<NaiveDate>,
    pub status: Option<TacheStatus>,
    pub heures_estimees: Option<Decimal>,
    pub taux_horaire: Option<Decimal>,
    pub cout_materiaux: Option<Decimal>,
    pub equipe: Option<i64>,
    pub sous_traitants: Option<Vec<i64>>,
    pub notes: Option<String>,
}

impl TachePatch {
    /// Merge into `data`; a status change must pass the tâche workflow
    ///
    /// `sous_traitants` is not a column and is left for the caller.
    fn apply(&self, data: &mut TacheData) -> ApiResult<()> {
        if let Some(status) = self.status {
            data.status = data.status.transition_to(status)?;
        }
        if let Some(v) = self.lot {
            data.lot = v;
        }
        if let Some(v) = &self.numero {
            data.numero = v.clone();
        }
        if let Some(v) = &self.nom {
            data.nom = v.clone();
        }
        if let Some(v) = &self.description {
            data.description = v.clone();
        }
        if let Some(v) = self.ordre {
            data.ordre = v;
        }
        if let Some(v) = self.date_debut_prevue {
            data.date_debut_prevue = v;
        }
        if let Some(v) = self.date_fin_prevue {
            data.date_fin_prevue = v;
        }
        if self.date_debut_reelle.is_some() {
            data.date_debut_reelle = self.date_debut_reelle;
        }
        if self.date_fin_reelle.is_some() {
            data.date_fin_reelle = self.date_fin_reelle;
        }
        if let Some(v) = self.heures_estimees {
            data.heures_estimees = v;
        }
        if let Some(v) = self.taux_horaire {
            data.taux_horaire = v;
        }
        if let Some(v) = self.cout_materiaux {
            data.cout_materiaux = v;
        }
        if self.equipe.is_some() {
            data.equipe = self.equipe;
        }
        if let Some(v) = &self.notes {
            data.notes = v.clone();
        }
        Ok(())
    }
}

fn check(data: &TacheData, errors: &mut FieldErrors) {
    errors.required("numero", &data.numero);
    errors.required("nom", &data.nom);
    if data.ordre < 0 {
        errors.add("ordre", "Ensure this value is greater than or equal to 0.");
    }
    errors.date_order("date_fin_prevue", data.date_debut_prevue, data.date_fin_prevue);
    if let (Some(debut), Some(fin)) = (data.date_debut_reelle, data.date_fin_reelle) {
        errors.date_order("date_fin_reelle", debut, fin);
    }
    errors.non_negative("heures_estimees", data.heures_estimees);
    errors.non_negative("taux_horaire", data.taux_horaire);
    errors.non_negative("cout_materiaux", data.cout_materiaux);
}

/// Every linked sous-traitant must exist (400 on the field otherwise)
async fn check_sous_traitants(
    state: &AppState,
    ids: &[i64],
    errors: &mut FieldErrors,
) -> ApiResult<()> {
    for &id in ids {
        if !crate::db::exists(&state.db, "sous_traitants", id).await? {
            errors.add(
                "sous_traitants",
                format!("Invalid pk \"{}\" - object does not exist.", id),
            );
        }
    }
    Ok(())
}

async fn check_references(state: &AppState, data: &TacheData) -> ApiResult<()> {
    ensure_exists(state, "lots", "Lot", data.lot).await?;
    if let Some(equipe) = data.equipe {
        ensure_exists(state, "equipes", "Equipe", equipe).await?;
    }
    Ok(())
}

async fn load(state: &AppState, id: i64) -> ApiResult<Tache> {
    taches::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tache", id))
}

async fn respond(state: &AppState, tache: Tache) -> ApiResult<TacheResponse> {
    tache_responses(&state.db, vec![tache], time::today())
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("Tache response missing".to_string()))
}

/// GET /taches
pub async fn list_taches(
    State(state): State<AppState>,
    query: Result<Query<TacheFilter>, QueryRejection>,
) -> ApiResult<Json<Page<TacheResponse>>> {
    let Query(filter) = query?;
    let today = time::today();
    let total = taches::count(&state.db, &filter, today).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = taches::list(&state.db, &filter, today, pagination).await?;
    let results = tache_responses(&state.db, rows, today).await?;
    Ok(Json(Page::new(total, pagination, results)))
}

/// POST /taches
pub async fn create_tache(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<TacheCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TacheResponse>)> {
    actor.require(Action::ManagePlanning)?;
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    let lot = errors.present("lot", payload.lot);
    let debut = errors.present("date_debut_prevue", payload.date_debut_prevue);
    let fin = errors.present("date_fin_prevue", payload.date_fin_prevue);
    let heures = errors.present("heures_estimees", payload.heures_estimees);
    let (Some(lot), Some(debut), Some(fin), Some(heures)) = (lot, debut, fin, heures) else {
        errors.required("numero", &payload.numero);
        errors.required("nom", &payload.nom);
        return Err(ApiError::Validation(errors));
    };

    let data = TacheData {
        lot,
        numero: payload.numero.trim().to_string(),
        nom: payload.nom,
        description: payload.description,
        ordre: payload.ordre.unwrap_or(0),
        date_debut_prevue: debut,
        date_fin_prevue: fin,
        date_debut_reelle: payload.date_debut_reelle,
        date_fin_reelle: payload.date_fin_reelle,
        status: payload.status,
        heures_estimees: heures,
        taux_horaire: payload.taux_horaire.unwrap_or_else(|| Decimal::new(5000, 2)),
        cout_materiaux: payload.cout_materiaux.unwrap_or(Decimal::ZERO),
        equipe: payload.equipe,
        notes: payload.notes,
    };
    check(&data, &mut errors);
    check_sous_traitants(&state, &payload.sous_traitants, &mut errors).await?;
    errors.into_result()?;
    check_references(&state, &data).await?;

    let id = taches::insert(&state.db, &data).await?;
    if !payload.sous_traitants.is_empty() {
        taches::set_sous_traitants(&state.db, id, &payload.sous_traitants).await?;
    }
    info!("Tache {} ({}) created in lot {} by {}", id, data.numero, data.lot, actor.username);

    let tache = load(&state, id).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, tache).await?)))
}

/// GET /taches/:id
pub async fn get_tache(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TacheResponse>> {
    let tache = load(&state, id).await?;
    Ok(Json(respond(&state, tache).await?))
}

/// PATCH /taches/:id
///
/// A TERMINEE tâche can only move to REVISEE (409 otherwise). The write only
/// lands if the status is still the one the transition was checked against.
pub async fn update_tache(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<TachePatch>, JsonRejection>,
) -> ApiResult<Json<TacheResponse>> {
    actor.require(Action::ManagePlanning)?;
    let Json(patch) = payload?;
    let mut data = load(&state, id).await?.data;
    let previous_status = data.status;
    patch.apply(&mut data)?;

    let mut errors = FieldErrors::new();
    check(&data, &mut errors);
    if let Some(ids) = &patch.sous_traitants {
        check_sous_traitants(&state, ids, &mut errors).await?;
    }
    errors.into_result()?;
    check_references(&state, &data).await?;

    if !taches::update(&state.db, id, &data, previous_status).await? {
        return Err(ApiError::Conflict(format!(
            "Tache {} status changed concurrently; reload and retry",
            id
        )));
    }
    if let Some(ids) = &patch.sous_traitants {
        taches::set_sous_traitants(&state.db, id, ids).await?;
    }
    if previous_status != data.status {
        info!(
            "Tache {} status {} -> {} by {}",
            id, previous_status, data.status, actor.username
        );
    } else {
        info!("Tache {} updated by {}", id, actor.username);
    }

    let tache = load(&state, id).await?;
    Ok(Json(respond(&state, tache).await?))
}

/// DELETE /taches/:id
pub async fn delete_tache(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    actor.require(Action::ManagePlanning)?;
    if !taches::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Tache", id));
    }
    info!("Tache {} deleted by {}", id, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /taches/:id/heures
pub async fn tache_heures(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<HeureTravail>>> {
    ensure_exists(&state, "taches", "Tache", id).await?;
    Ok(Json(heures::list_for_tache(&state.db, id).await?))
}

/// POST /taches/:id/heures
pub async fn log_tache_heures(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<HeureCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<HeureTravail>)> {
    let Json(payload) = payload?;
    let entry = heure_api::log_hours(&state, &actor, id, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// POST /taches/:id/photo (multipart)
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<PhotoResponse>)> {
    actor.require(Action::UploadPhoto)?;
    ensure_exists(&state, "taches", "Tache", id).await?;
    let multipart = multipart.map_err(|e| ApiError::field("image", e.body_text()))?;

    let photo = photo_api::store_upload(&state, &actor, id, multipart).await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

/// GET /taches/:id/photos
pub async fn tache_photos(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<PhotoResponse>>> {
    ensure_exists(&state, "taches", "Tache", id).await?;
    let rows = photos::list_for_tache(&state.db, id).await?;
    Ok(Json(rows.into_iter().map(PhotoResponse::from).collect()))
}

/// GET /taches/:id/anomalies
pub async fn tache_anomalies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<AnomalieResponse>>> {
    ensure_exists(&state, "taches", "Tache", id).await?;
    let rows = anomalies::list_for_tache(&state.db, id).await?;
    Ok(Json(anomalie_api::responses(rows)))
}

#[derive(Debug, Deserialize)]
pub struct AnomalieReport {
    #[serde(default)]
    pub titre: String,
    #[serde(default)]
    pub description: String,
    pub severite: Option<Severite>,
    pub photo: Option<i64>,
    pub date_resolution_prevue: Option<NaiveDate>,
}

/// POST /taches/:id/signaler_anomalie
pub async fn report_anomalie(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<AnomalieReport>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AnomalieResponse>)> {
    actor.require(Action::ReportAnomalie)?;
    let tache = load(&state, id).await?;
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    errors.required("titre", &payload.titre);
    errors.required("description", &payload.description);
    let severite = errors.present("severite", payload.severite);
    if let Some(photo) = payload.photo {
        if photos::tache_of(&state.db, photo).await? != Some(tache.id) {
            errors.add("photo", "Photo must belong to the same tâche.");
        }
    }
    let Some(severite) = severite else {
        return Err(ApiError::Validation(errors));
    };
    errors.into_result()?;

    let anomalie_id = anomalies::insert(
        &state.db,
        &NewAnomalie {
            tache: tache.id,
            photo: payload.photo,
            titre: payload.titre.trim().to_string(),
            description: payload.description,
            severite,
            signalee_par: actor.user_id,
            date_resolution_prevue: payload.date_resolution_prevue,
        },
    )
    .await?;
    warn!(
        "Anomalie [{}] reported on tache {} ({}): {}",
        severite, tache.data.numero, tache.id, payload.titre
    );

    let anomalie = anomalies::get(&state.db, anomalie_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Anomalie", anomalie_id))?;
    Ok((
        StatusCode::CREATED,
        Json(AnomalieResponse::new(anomalie, time::today())),
    ))
}

/// Build tâche routes; the photo upload gets a body limit from configuration
pub fn tache_routes(state: &AppState) -> Router<AppState> {
    let upload_limit = state.photos.max_bytes() + MULTIPART_OVERHEAD;

    Router::new()
        .route("/taches", get(list_taches).post(create_tache))
        .route(
            "/taches/:id",
            get(get_tache).patch(update_tache).delete(delete_tache),
        )
        .route("/taches/:id/heures", get(tache_heures).post(log_tache_heures))
        .route(
            "/taches/:id/photo",
            post(upload_photo).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/taches/:id/photos", get(tache_photos))
        .route("/taches/:id/anomalies", get(tache_anomalies))
        .route("/taches/:id/signaler_anomalie", post(report_anomalie))
}
