//! Sous-traitant endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chantiers_common::domain::{Action, Specialite};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use super::{paginate, Actor};
use crate::db::sous_traitants::{self, SousTraitant, SousTraitantData, SousTraitantFilter};
use crate::error::{ApiError, ApiResult};
use crate::pagination::Page;
use crate::validation::FieldErrors;
use crate::AppState;

/// Create payload; `note_moyenne` is not accepted
#[derive(Debug, Deserialize)]
pub struct SousTraitantCreate {
    #[serde(default)]
    pub nom_entreprise: String,
    #[serde(default)]
    pub nom_contact: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub telephone: String,
    #[serde(default)]
    pub adresse: String,
    #[serde(default)]
    pub codepostal: String,
    #[serde(default)]
    pub ville: String,
    #[serde(default)]
    pub specialite: Specialite,
    pub taux_horaire: Option<Decimal>,
    #[serde(default)]
    pub conditions_paiement: String,
    #[serde(default)]
    pub reference_client: String,
    pub actif: Option<bool>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SousTraitantPatch {
    pub nom_entreprise: Option<String>,
    pub nom_contact: Option<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub adresse: Option<String>,
    pub codepostal: Option<String>,
    pub ville: Option<String>,
    pub specialite: Option<Specialite>,
    pub taux_horaire: Option<Decimal>,
    pub conditions_paiement: Option<String>,
    pub reference_client: Option<String>,
    pub actif: Option<bool>,
    pub notes: Option<String>,
}

impl SousTraitantPatch {
    fn apply(self, data: &mut SousTraitantData) {
        if let Some(v) = self.nom_entreprise {
            data.nom_entreprise = v;
        }
        if let Some(v) = self.nom_contact {
            data.nom_contact = v;
        }
        if let Some(v) = self.email {
            data.email = v.trim().to_lowercase();
        }
        if let Some(v) = self.telephone {
            data.telephone = v;
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
        if let Some(v) = self.specialite {
            data.specialite = v;
        }
        if self.taux_horaire.is_some() {
            data.taux_horaire = self.taux_horaire;
        }
        if let Some(v) = self.conditions_paiement {
            data.conditions_paiement = v;
        }
        if let Some(v) = self.reference_client {
            data.reference_client = v;
        }
        if let Some(v) = self.actif {
            data.actif = v;
        }
        if let Some(v) = self.notes {
            data.notes = v;
        }
    }
}

fn check(data: &SousTraitantData) -> ApiResult<()> {
    let mut errors = FieldErrors::new();
    errors.required("nom_entreprise", &data.nom_entreprise);
    if !data.email.is_empty() {
        errors.email("email", &data.email);
    }
    if let Some(taux) = data.taux_horaire {
        errors.non_negative("taux_horaire", taux);
    }
    errors.into_result()
}

async fn load(state: &AppState, id: i64) -> ApiResult<SousTraitant> {
    sous_traitants::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("SousTraitant", id))
}

/// GET /sous_traitants
pub async fn list_sous_traitants(
    State(state): State<AppState>,
    query: Result<Query<SousTraitantFilter>, QueryRejection>,
) -> ApiResult<Json<Page<SousTraitant>>> {
    let Query(filter) = query?;
    let total = sous_traitants::count(&state.db, &filter).await?;
    let pagination = paginate(&state, total, filter.page);
    let rows = sous_traitants::list(&state.db, &filter, pagination).await?;
    Ok(Json(Page::new(total, pagination, rows)))
}

/// POST /sous_traitants
pub async fn create_sous_traitant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    payload: Result<Json<SousTraitantCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SousTraitant>)> {
    actor.require(Action::ManageTeams)?;
    let Json(payload) = payload?;

    let data = SousTraitantData {
        nom_entreprise: payload.nom_entreprise.trim().to_string(),
        nom_contact: payload.nom_contact,
        email: payload.email.trim().to_lowercase(),
        telephone: payload.telephone,
        adresse: payload.adresse,
        codepostal: payload.codepostal,
        ville: payload.ville,
        specialite: payload.specialite,
        taux_horaire: payload.taux_horaire,
        conditions_paiement: payload.conditions_paiement,
        reference_client: payload.reference_client,
        actif: payload.actif.unwrap_or(true),
        notes: payload.notes,
    };
    check(&data)?;

    let id = sous_traitants::insert(&state.db, &data).await?;
    info!(
        "Sous-traitant {} ({}) created by {}",
        id, data.nom_entreprise, actor.username
    );
    Ok((StatusCode::CREATED, Json(load(&state, id).await?)))
}

/// GET /sous_traitants/:id
pub async fn get_sous_traitant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SousTraitant>> {
    Ok(Json(load(&state, id).await?))
}

/// PATCH /sous_traitants/:id
pub async fn update_sous_traitant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
    payload: Result<Json<SousTraitantPatch>, JsonRejection>,
) -> ApiResult<Json<SousTraitant>> {
    actor.require(Action::ManageTeams)?;
    let Json(patch) = payload?;
    let mut data = load(&state, id).await?.data;
    patch.apply(&mut data);
    check(&data)?;

    sous_traitants::update(&state.db, id, &data).await?;
    info!("Sous-traitant {} updated by {}", id, actor.username);
    Ok(Json(load(&state, id).await?))
}

/// DELETE /sous_traitants/:id
pub async fn delete_sous_traitant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    actor.require(Action::ManageTeams)?;
    if !sous_traitants::delete(&state.db, id).await? {
        return Err(ApiError::not_found("SousTraitant", id));
    }
    info!("Sous-traitant {} deleted by {}", id, actor.username);
    Ok(StatusCode::NO_CONTENT)
}

/// Build sous-traitant routes
pub fn sous_traitant_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/sous_traitants",
            get(list_sous_traitants).post(create_sous_traitant),
        )
        .route(
            "/sous_traitants/:id",
            get(get_sous_traitant)
                .patch(update_sous_traitant)
                .delete(delete_sous_traitant),
        )
}
