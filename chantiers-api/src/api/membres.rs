//! Membre endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chantiers_common::domain::{Action, RoleMembre};
use chantiers_common::time;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ensure_exists, paginate, Actor};
use crate::db::heures;
use crate::db::membres::{self, Membre, MembreData, MembreFilter};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Membre with the hours logged in the current month
#[derive(Debug, Serialize)]
pub struct MembreResponse {
    #[serde(flatten)]
    pub membre: Membre,
    #[serde(with = "rust_decimal::serde::float")]
    pub heures_ce_mois: Decimal,
}

async fn membre_responses(state: &AppState, membres: Vec<Membre>) -> ApiResult<Vec<MembreResponse>> {
    let ids: Vec<i64> = membres.iter().map(|m| m.id).collect();
    let (first, last) = time::month_bounds(time::today());
    let totals = heures::totals_by_membre_between(&state.db, &ids, first, last).await?;

    Ok(membres
        .into_iter()
        .map(|membre| MembreResponse {
            heures_ce_mois: totals.get(&membre.id).copied().unwrap_or(Decimal::ZERO),
            membre,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
pub struct MembreCreate {
    #[serde(default)]
    pub prenom: String,
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub telephone: String,
    pub equipe: Option<i64>,
    #[serde(default)]
    pub role: RoleMembre,
    #[serde(default)]
    pub qualifications: String,
    pub taux_horaire: Option<Decimal>,
    pub actif: Option<bool>,
    pub date_embauche: Option<NaiveDate>,
    pub user: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MembrePatch {
    pub prenom: Option<String>,
    pub nom: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub equipe: Option<i64>,
    pub role: Option<RoleMembre>,
    pub qualifications: Option<String>,
    pub taux_horaire: Option<Decimal>,
    pub actif: Option<bool>,
    pub date_embauche: Option<NaiveDate>,
    pub user: Option<i64>,
}

impl MembrePatch {
    fn apply(self, data: &mut MembreData) {
        if let Some(v) = self.prenom {
            data.prenom = v;
        }
        if let Some(v) = self.nom {
            data.nom = v;
        }
        if let Some(v) = self.email {
            data.email = v.trim().to_lowercase();
        }
        if let Some(v) = self.telephone {
            data.telephone = v;
        }
        if self.equipe.is_some() {
            data.equipe = self.equipe;
        }
        if let Some(v) = self.role {
            data.role = v;
        }
        if let Some(v) = self.qualifications {
            data.qualifications = v;
        }
        if self.taux_horaire.is_some() {
            data.taux_horaire = self.taux_horaire;
        }
        if let Some(v) = self.actif {
            data.actif = v;
        }
        if self.date_embauche.is_some() {
            data.date_embauche = self.date_embauche;
        }
        if self.user.is_some() {
            data.user = self.user;
        }
    }
}

async fn validate(state: &AppState, data: &MembreData) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    errors.required("prenom", &data.prenom);
    errors.required("nom", &data.nom);
    errors.email("email", &data.email);
    if let Some(taux) = data.taux_horaire {
        errors.non_negative("taux_horaire", taux);
    }
    errors.into_result()?;

    if let Some(equipe) = data.equipe {
        ensure_exists(state, "equipes", "Equipe", equipe).await?;
    }
    if let Some(user) = data.user {
        ensure_exists(state, "users", "User", user).await?;
    }
    Ok(())
}

async fn load(state: &AppState, id: i64) -> ApiResult<Membre> {
    membres::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Membre", id))
}

async fn respond(state: &AppState, membre: Membre) -> ApiResult<MembreResponse> {
    membre_responses(state, vec![membre])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("Membre response missing".to_string()))
}

/// GET /membres
pub async fn list_membres(
    State(state): State<AppState>,
    query: Result<Query<MembreFilter>, QueryRejection>,
) -> ApiResult<Json<Page<MembreResponse>>> {
    let Query(filter) = query?;
    let total = membres::count(&state.db, &filter).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = membres::list(&state.db, &filter, pagination).await?;
    let results = membre_responses(&state, rows).await?;
    Ok(Json(Page::new(total, pagination, results)))
}

/// POST /membres
pub async fn create_membre(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<MembreCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MembreResponse>)> {
    actor.require(Action::ManageTeams)?;
    let Json(payload) = payload?;

    let data = MembreData {
        prenom: payload.prenom.trim().to_string(),
        nom: payload.nom.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        telephone: payload.telephone,
        equipe: payload.equipe,
        role: payload.role,
        qualifications: payload.qualifications,
        taux_horaire: payload.taux_horaire,
        actif: payload.actif.unwrap_or(true),
        date_embauche: payload.date_embauche,
        user: payload.user,
    };
    validate(&state, &data).await?;

    let id = membres::insert(&state.db, &data).await?;
    info!(
        "Membre {} ({} {}, {}) created by {}",
        id, data.prenom, data.nom, data.role, actor.username
    );

    let membre = load(&state, id).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, membre).await?)))
}

/// GET /membres/:id
pub async fn get_membre(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MembreResponse>> {
    let membre = load(&state, id).await?;
    Ok(Json(respond(&state, membre).await?))
}

/// PATCH /membres/:id
pub async fn update_membre(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<MembrePatch>, JsonRejection>,
) -> ApiResult<Json<MembreResponse>> {
    actor.require(Action::ManageTeams)?;
    let Json(patch) = payload?;
    let mut data = load(&state, id).await?.data;
    patch.apply(&mut data);
    validate(&state, &data).await?;

    membres::update(&state.db, id, &data).await?;
    info!("Membre {} updated by {}", id, actor.username);

    let membre = load(&state, id).await?;
    Ok(Json(respond(&state, membre).await?))
}

/// DELETE /membres/:id
///
/// Logged hours are kept with no membre.
pub async fn delete_membre(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    actor.require(Action::ManageTeams)?;
    if !membres::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Membre", id));
    }
    info!("Membre {} deleted by {}", id, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Build membre routes
pub fn membre_routes() -> Router<AppState> {
    Router::new()
        .route("/membres", get(list_membres).post(create_membre))
        .route(
            "/membres/:id",
            get(get_membre).patch(update_membre).delete(delete_membre),
        )
}
