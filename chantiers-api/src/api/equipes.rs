//! Equipe endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chantiers_common::domain::{Action, Specialite};
use serde::Deserialize;
use tracing::info;

use super::{ensure_exists, paginate, Actor};
use crate::db::equipes::{self, Equipe, EquipeData, EquipeFilter};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EquipeCreate {
    #[serde(default)]
    pub nom: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub specialite: Specialite,
    pub chef: Option<i64>,
    #[serde(default)]
    pub contrat_externe: bool,
    pub actif: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipePatch {
    pub nom: Option<String>,
    pub description: Option<String>,
    pub specialite: Option<Specialite>,
    pub chef: Option<i64>,
    pub contrat_externe: Option<bool>,
    pub actif: Option<bool>,
}

impl EquipePatch {
    fn apply(self, data: &mut EquipeData) {
        if let Some(v) = self.nom {
            data.nom = v;
        }
        if let Some(v) = self.description {
            data.description = v;
        }
        if let Some(v) = self.specialite {
            data.specialite = v;
        }
        if self.chef.is_some() {
            data.chef = self.chef;
        }
        if let Some(v) = self.contrat_externe {
            data.contrat_externe = v;
        }
        if let Some(v) = self.actif {
            data.actif = v;
        }
    }
}

async fn validate(state: &AppState, data: &EquipeData) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    errors.required("nom", &data.nom);
    errors.into_result()?;
    if let Some(chef) = data.chef {
        ensure_exists(state, "membres", "Membre", chef).await?;
    }
    Ok(())
}

async fn load(state: &AppState, id: i64) -> ApiResult<Equipe> {
    equipes::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Equipe", id))
}

/// GET /equipes
pub async fn list_equipes(
    State(state): State<AppState>,
    query: Result<Query<EquipeFilter>, QueryRejection>,
) -> ApiResult<Json<Page<Equipe>>> {
    let Query(filter) = query?;
    let total = equipes::count(&state.db, &filter).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = equipes::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(total, pagination, rows)))
}

/// POST /equipes
pub async fn create_equipe(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<EquipeCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Equipe>)> {
    actor.require(Action::ManageTeams)?;
    let Json(payload) = payload?;

    let data = EquipeData {
        nom: payload.nom.trim().to_string(),
        description: payload.description,
        specialite: payload.specialite,
        chef: payload.chef,
        contrat_externe: payload.contrat_externe,
        actif: payload.actif.unwrap_or(true),
    };
    validate(&state, &data).await?;

    let id = equipes::insert(&state.db, &data).await?;
    info!("Equipe {} ({}) created by {}", id, data.nom, actor.username);
    Ok((StatusCode::CREATED, Json(load(&state, id).await?)))
}

/// GET /equipes/:id
pub async fn get_equipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Equipe>> {
    Ok(Json(load(&state, id).await?))
}

/// PATCH /equipes/:id
pub async fn update_equipe(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<EquipePatch>, JsonRejection>,
) -> ApiResult<Json<Equipe>> {
    actor.require(Action::ManageTeams)?;
    let Json(patch) = payload?;
    let mut data = load(&state, id).await?.data;
    patch.apply(&mut data);
    validate(&state, &data).await?;

    equipes::update(&state.db, id, &data).await?;
    info!("Equipe {} updated by {}", id, actor.username);
    Ok(Json(load(&state, id).await?))
}

/// DELETE /equipes/:id
///
/// Membres of the team stay, with no equipe.
pub async fn delete_equipe(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    actor.require(Action::ManageTeams)?;
    if !equipes::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Equipe", id));
    }
    info!("Equipe {} deleted by {}", id, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Build equipe routes
pub fn equipe_routes() -> Router<AppState> {
    Router::new()
        .route("/equipes", get(list_equipes).post(create_equipe))
        .route(
            "/equipes/:id",
            get(get_equipe).patch(update_equipe).delete(delete_equipe),
        )
}
