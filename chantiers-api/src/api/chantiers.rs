//! Chantier endpoints: CRUD, aggregate report and team/subcontractor links

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use chantiers_common::domain::{
    chantier_overdue, jours_restants, Action, AnomalieStatut, ChantierStatus,
};
use chantiers_common::time;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::anomalies::{self as anomalie_api, AnomalieResponse};
use super::lots::{lot_responses, LotResponse};
use super::{ensure_exists, paginate, Actor};
use crate::db::chantiers::{self, Chantier, ChantierData, ChantierFilter};
use crate::db::equipes::{self, Equipe};
use crate::db::sous_traitants::{self, SousTraitant};
use crate::db::stats::{self, Rollup, Scope};
use crate::db::{anomalies, lots};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Chantier with its derived fields
#[derive(Debug, Serialize)]
pub struct ChantierResponse {
    #[serde(flatten)]
    pub chantier: Chantier,
    pub progression: f64,
    pub jours_restants: i64,
    pub nombre_taches: i64,
    pub en_retard: bool,
    pub cout_reel: Decimal,
}

impl ChantierResponse {
    fn new(chantier: Chantier, rollup: &Rollup, today: NaiveDate) -> Self {
        Self {
            progression: rollup.progression,
            jours_restants: jours_restants(chantier.data.date_fin_prevue, today),
            nombre_taches: rollup.taches_totales,
            en_retard: chantier_overdue(chantier.data.status, chantier.data.date_fin_prevue, today),
            cout_reel: rollup.cout_reel,
            chantier,
        }
    }
}

/// `GET /chantiers/:id` body: the chantier and its lots
#[derive(Debug, Serialize)]
pub struct ChantierDetail {
    #[serde(flatten)]
    pub chantier: ChantierResponse,
    pub lots: Vec<LotResponse>,
}

async fn chantier_responses(
    db: &SqlitePool,
    chantiers: Vec<Chantier>,
    today: NaiveDate,
) -> ApiResult<Vec<ChantierResponse>> {
    let ids: Vec<i64> = chantiers.iter().map(|c| c.id).collect();
    let stats = stats::load(db, Scope::Chantiers, &ids).await?;
    let groups = stats::group_by(&stats, |s| s.chantier_id);

    Ok(chantiers
        .into_iter()
        .map(|chantier| {
            let rollup = groups
                .get(&chantier.id)
                .map(|group| stats::rollup(group.iter().copied()))
                .unwrap_or_default();
            ChantierResponse::new(chantier, &rollup, today)
        })
        .collect())
}

/// `GET /chantiers/:id/rapport` body
#[derive(Debug, Serialize)]
pub struct Rapport {
    pub chantier: ChantierResponse,
    pub lots: Vec<LotResponse>,
    pub taches_totales: i64,
    pub taches_terminees: i64,
    pub progression_percentage: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub heures_estimees: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub heures_reelles: Decimal,
    pub cout_previsionnel: Decimal,
    pub cout_reel: Decimal,
    pub anomalies_ouvertes: i64,
    pub membres_actifs: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChantierCreate {
    #[serde(default)]
    pub numero: String,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub adresse: String,
    #[serde(default)]
    pub codepostal: String,
    #[serde(default)]
    pub ville: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_debut: Option<NaiveDate>,
    pub date_fin_prevue: Option<NaiveDate>,
    pub date_fin_reelle: Option<NaiveDate>,
    pub budget_total: Option<Decimal>,
    #[serde(default)]
    pub status: ChantierStatus,
    pub chef: Option<i64>,
    #[serde(default)]
    pub notes_internes: String,
    pub actif: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChantierPatch {
    pub numero: Option<String>,
    pub nom: Option<String>,
    pub description: Option<String>,
    pub adresse: Option<String>,
    pub codepostal: Option<String>,
    pub ville: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_debut: Option<NaiveDate>,
    pub date_fin_prevue: Option<NaiveDate>,
    pub date_fin_reelle: Option<NaiveDate>,
    pub budget_total: Option<Decimal>,
    pub status: Option<ChantierStatus>,
    pub chef: Option<i64>,
    pub notes_internes: Option<String>,
    pub actif: Option<bool>,
}

impl ChantierPatch {
    fn apply(self, data: &mut ChantierData) {
        if let Some(v) = self.numero {
            data.numero = v;
        }
        if let Some(v) = self.nom {
            data.nom = v;
        }
        if let Some(v) = self.description {
            data.description = v;
        }
        if let Some(v) = self.adresse {
            data.adresse = v;
        }
        if let Some(v) = self.codepostal {
            data.codepostal = v;
        }
        if let Some(v) = self.ville {
            data.ville = v;
        }
        if self.latitude.is_some() {
            data.latitude = self.latitude;
        }
        if self.longitude.is_some() {
            data.longitude = self.longitude;
        }
        if let Some(v) = self.date_debut {
            data.date_debut = v;
        }
        if let Some(v) = self.date_fin_prevue {
            data.date_fin_prevue = v;
        }
        if self.date_fin_reelle.is_some() {
            data.date_fin_reelle = self.date_fin_reelle;
        }
        if let Some(v) = self.budget_total {
            data.budget_total = v;
        }
        if let Some(v) = self.status {
            data.status = v;
        }
        if self.chef.is_some() {
            data.chef = self.chef;
        }
        if let Some(v) = self.notes_internes {
            data.notes_internes = v;
        }
        if let Some(v) = self.actif {
            data.actif = v;
        }
    }
}

fn check(data: &ChantierData, errors: &mut FieldErrors) {
    errors.required("numero", &data.numero);
    errors.required("nom", &data.nom);
    errors.date_order("date_fin_prevue", data.date_debut, data.date_fin_prevue);
    if let Some(fin) = data.date_fin_reelle {
        errors.date_order("date_fin_reelle", data.date_debut, fin);
    }
    errors.positive("budget_total", data.budget_total);
    errors.coordinates(data.latitude, data.longitude);
}

async fn load(state: &AppState, id: i64) -> ApiResult<Chantier> {
    chantiers::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chantier", id))
}

async fn respond(state: &AppState, chantier: Chantier) -> ApiResult<ChantierResponse> {
    chantier_responses(&state.db, vec![chantier], time::today())
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("Chantier response missing".to_string()))
}

/// GET /chantiers
pub async fn list_chantiers(
    State(state): State<AppState>,
    query: Result<Query<ChantierFilter>, QueryRejection>,
) -> ApiResult<Json<Page<ChantierResponse>>> {
    let Query(filter) = query?;
    let today = time::today();
    let total = chantiers::count(&state.db, &filter, today).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = chantiers::list(&state.db, &filter, today, pagination).await?;
    let results = chantier_responses(&state.db, rows, today).await?;
    Ok(Json(Page::new(total, pagination, results)))
}

/// POST /chantiers
///
/// The creator becomes the chef unless another user is named.
pub async fn create_chantier(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<ChantierCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChantierResponse>)> {
    actor.require(Action::CreateChantier)?;
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    let debut = errors.present("date_debut", payload.date_debut);
    let fin = errors.present("date_fin_prevue", payload.date_fin_prevue);
    let budget = errors.present("budget_total", payload.budget_total);
    let (Some(debut), Some(fin), Some(budget)) = (debut, fin, budget) else {
        errors.required("numero", &payload.numero);
        errors.required("nom", &payload.nom);
        return Err(ApiError::Validation(errors));
    };

    let data = ChantierData {
        numero: payload.numero.trim().to_string(),
        nom: payload.nom,
        description: payload.description,
        adresse: payload.adresse,
        codepostal: payload.codepostal,
        ville: payload.ville,
        latitude: payload.latitude,
        longitude: payload.longitude,
        date_debut: debut,
        date_fin_prevue: fin,
        date_fin_reelle: payload.date_fin_reelle,
        budget_total: budget,
        status: payload.status,
        chef: payload.chef.or(Some(actor.user_id)),
        notes_internes: payload.notes_internes,
        actif: payload.actif.unwrap_or(true),
    };
    check(&data, &mut errors);
    errors.into_result()?;
    if let Some(chef) = data.chef {
        ensure_exists(&state, "users", "User", chef).await?;
    }

    let id = chantiers::insert(&state.db, &data, actor.user_id).await?;
    info!("Chantier {} ({}) created by {}", id, data.numero, actor.username);

    let chantier = load(&state, id).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, chantier).await?)))
}

/// GET /chantiers/:id
pub async fn get_chantier(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChantierDetail>> {
    let chantier = load(&state, id).await?;
    let lots = lot_responses(&state.db, lots::list_for_chantier(&state.db, id).await?, time::today())
        .await?;
    Ok(Json(ChantierDetail {
        chantier: respond(&state, chantier).await?,
        lots,
    }))
}

/// PATCH /chantiers/:id
pub async fn update_chantier(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<ChantierPatch>, JsonRejection>,
) -> ApiResult<Json<ChantierResponse>> {
    let chantier = load(&state, id).await?;
    actor.require_owner(Action::ModifyChantier, chantier.data.chef)?;
    let Json(patch) = payload?;

    let mut data = chantier.data;
    let previous_status = data.status;
    patch.apply(&mut data);

    let mut errors = FieldErrors::new();
    check(&data, &mut errors);
    errors.into_result()?;
    if let Some(chef) = data.chef {
        ensure_exists(&state, "users", "User", chef).await?;
    }

    chantiers::update(&state.db, id, &data).await?;
    if previous_status != data.status {
        info!(
            "Chantier {} status {} -> {} by {}",
            id, previous_status, data.status, actor.username
        );
    } else {
        info!("Chantier {} updated by {}", id, actor.username);
    }

    let chantier = load(&state, id).await?;
    Ok(Json(respond(&state, chantier).await?))
}

/// DELETE /chantiers/:id
///
/// Removes the chantier with all its lots, tâches, hours, photos and anomalies.
pub async fn delete_chantier(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let chantier = load(&state, id).await?;
    actor.require_owner(Action::ModifyChantier, chantier.data.chef)?;

    if !chantiers::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Chantier", id));
    }
    info!("Chantier {} ({}) deleted by {}", id, chantier.data.numero, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chantiers/:id/rapport
pub async fn chantier_rapport(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Rapport>> {
    let chantier = load(&state, id).await?;
    let today = time::today();

    let stats = stats::load(&state.db, Scope::Chantiers, &[id]).await?;
    let rollup = stats::rollup(&stats);
    let lots = lot_responses(&state.db, lots::list_for_chantier(&state.db, id).await?, today).await?;
    let anomalies_ouvertes = chantiers::open_anomalies(&state.db, id).await?;
    let membres_actifs = chantiers::active_membres(&state.db, id).await?;
    debug!("Rapport for chantier {}: {:?}", id, rollup);

    let cout_previsionnel = chantier.data.budget_total;
    Ok(Json(Rapport {
        chantier: ChantierResponse::new(chantier, &rollup, today),
        lots,
        taches_totales: rollup.taches_totales,
        taches_terminees: rollup.taches_terminees,
        progression_percentage: rollup.progression,
        heures_estimees: rollup.heures_estimees,
        heures_reelles: rollup.heures_reelles,
        cout_previsionnel,
        cout_reel: rollup.cout_reel,
        anomalies_ouvertes,
        membres_actifs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatutQuery {
    pub statut: Option<AnomalieStatut>,
}

/// GET /chantiers/:id/anomalies
pub async fn chantier_anomalies(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    query: Result<Query<StatutQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AnomalieResponse>>> {
    let Query(query) = query?;
    ensure_exists(&state, "chantiers", "Chantier", id).await?;
    let rows = anomalies::list_for_chantier(&state.db, id, query.statut).await?;
    Ok(Json(anomalie_api::responses(rows)))
}

#[derive(Debug, Deserialize)]
pub struct EquipeLink {
    pub equipe: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SousTraitantLink {
    pub sous_traitant: Option<i64>,
}

fn link_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// GET /chantiers/:id/equipes
pub async fn chantier_equipes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Equipe>>> {
    ensure_exists(&state, "chantiers", "Chantier", id).await?;
    Ok(Json(equipes::list_for_chantier(&state.db, id).await?))
}

/// POST /chantiers/:id/equipes
///
/// 201 when the link is new, 200 when it already existed.
pub async fn link_equipe(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<EquipeLink>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Vec<Equipe>>)> {
    let chantier = load(&state, id).await?;
    actor.require_or_chef(Action::ManageTeams, chantier.data.chef)?;
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    let Some(equipe) = errors.present("equipe", payload.equipe) else {
        return Err(ApiError::Validation(errors));
    };
    ensure_exists(&state, "equipes", "Equipe", equipe).await?;

    let created = chantiers::add_equipe(&state.db, id, equipe).await?;
    if created {
        info!("Equipe {} assigned to chantier {} by {}", equipe, id, actor.username);
    }
    let linked = equipes::list_for_chantier(&state.db, id).await?;
    Ok((link_status(created), Json(linked)))
}

/// DELETE /chantiers/:id/equipes/:equipe_id
pub async fn unlink_equipe(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, equipe)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let chantier = load(&state, id).await?;
    actor.require_or_chef(Action::ManageTeams, chantier.data.chef)?;

    if !chantiers::remove_equipe(&state.db, id, equipe).await? {
        return Err(ApiError::NotFound(format!(
            "Equipe {} is not assigned to chantier {}",
            equipe, id
        )));
    }
    info!("Equipe {} removed from chantier {} by {}", equipe, id, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chantiers/:id/sous_traitants
pub async fn chantier_sous_traitants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<SousTraitant>>> {
    ensure_exists(&state, "chantiers", "Chantier", id).await?;
    Ok(Json(sous_traitants::list_for_chantier(&state.db, id).await?))
}

/// POST /chantiers/:id/sous_traitants
pub async fn link_sous_traitant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<SousTraitantLink>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Vec<SousTraitant>>)> {
    let chantier = load(&state, id).await?;
    actor.require_or_chef(Action::ManageTeams, chantier.data.chef)?;
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    let Some(sous_traitant) = errors.present("sous_traitant", payload.sous_traitant) else {
        return Err(ApiError::Validation(errors));
    };
    ensure_exists(&state, "sous_traitants", "SousTraitant", sous_traitant).await?;

    let created = chantiers::add_sous_traitant(&state.db, id, sous_traitant).await?;
    if created {
        info!(
            "Sous-traitant {} linked to chantier {} by {}",
            sous_traitant, id, actor.username
        );
    }
    let linked = sous_traitants::list_for_chantier(&state.db, id).await?;
    Ok((link_status(created), Json(linked)))
}

/// DELETE /chantiers/:id/sous_traitants/:sous_traitant_id
pub async fn unlink_sous_traitant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, sous_traitant)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let chantier = load(&state, id).await?;
    actor.require_or_chef(Action::ManageTeams, chantier.data.chef)?;

    if !chantiers::remove_sous_traitant(&state.db, id, sous_traitant).await? {
        return Err(ApiError::NotFound(format!(
            "Sous-traitant {} is not linked to chantier {}",
            sous_traitant, id
        )));
    }
    info!(
        "Sous-traitant {} unlinked from chantier {} by {}",
        sous_traitant, id, actor.username
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Build chantier routes
pub fn chantier_routes() -> Router<AppState> {
    Router::new()
        .route("/chantiers", get(list_chantiers).post(create_chantier))
        .route(
            "/chantiers/:id",
            get(get_chantier).patch(update_chantier).delete(delete_chantier),
        )
        .route("/chantiers/:id/rapport", get(chantier_rapport))
        .route("/chantiers/:id/anomalies", get(chantier_anomalies))
        .route("/chantiers/:id/equipes", get(chantier_equipes).post(link_equipe))
        .route("/chantiers/:id/equipes/:equipe_id", delete(unlink_equipe))
        .route(
            "/chantiers/:id/sous_traitants",
            get(chantier_sous_traitants).post(link_sous_traitant),
        )
        .route(
            "/chantiers/:id/sous_traitants/:sous_traitant_id",
            delete(unlink_sous_traitant),
        )
}
