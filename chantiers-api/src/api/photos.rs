//! Photo reports: multipart upload, retrieval and approval

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chantiers_common::domain::Action;
use chantiers_common::time;
use serde::Serialize;
use tracing::{debug, info};

use super::Actor;
use crate::db::photos::{self, NewPhoto, PhotoRapport};
use crate::db::taches;
use crate::error::{ApiError, ApiResult};
use crate::validation::FieldErrors;
use crate::AppState;

/// Photo with the public URL of its image
#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    #[serde(flatten)]
    pub photo: PhotoRapport,
    pub image_url: String,
}

impl From<PhotoRapport> for PhotoResponse {
    fn from(photo: PhotoRapport) -> Self {
        Self {
            image_url: format!("/media/{}", photo.image),
            photo,
        }
    }
}

/// Parsed multipart form of a photo upload
#[derive(Debug, Default)]
struct PhotoForm {
    image: Option<(String, Bytes)>,
    titre: String,
    description: String,
    latitude: Option<String>,
    longitude: Option<String>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::field("image", err.body_text())
}

async fn read_form(mut multipart: Multipart) -> ApiResult<PhotoForm> {
    let mut form = PhotoForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.image = Some((file_name, bytes));
            }
            "titre" => form.titre = field.text().await.map_err(multipart_error)?,
            "description" => form.description = field.text().await.map_err(multipart_error)?,
            "latitude" => form.latitude = Some(field.text().await.map_err(multipart_error)?),
            "longitude" => form.longitude = Some(field.text().await.map_err(multipart_error)?),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(form)
}

/// Optional coordinate sent as text; blank means absent
fn coordinate(errors: &mut FieldErrors, field: &str, raw: Option<String>) -> Option<f64> {
    let raw = raw?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.add(field, "A valid number is required.");
            None
        }
    }
}

/// Check, store and record an uploaded photo for `tache_id`
///
/// The blob is written first; if the row insert fails it is removed again.
pub(crate) async fn store_upload(
    state: &AppState,
    actor: &Actor,
    tache_id: i64,
    multipart: Multipart,
) -> ApiResult<PhotoResponse> {
    let form = read_form(multipart).await?;

    let mut errors = FieldErrors::new();
    let latitude = coordinate(&mut errors, "latitude", form.latitude);
    let longitude = coordinate(&mut errors, "longitude", form.longitude);
    errors.coordinates(latitude, longitude);
    let Some((file_name, bytes)) = errors.present("image", form.image) else {
        return Err(ApiError::Validation(errors));
    };
    errors.into_result()?;

    let extension = state.photos.check(&file_name, &bytes)?;
    let image = state.photos.save(time::today(), extension, &bytes).await?;

    let new_photo = NewPhoto {
        tache: tache_id,
        titre: form.titre.trim().to_string(),
        description: form.description,
        image: image.clone(),
        latitude,
        longitude,
        uploadee_par: actor.user_id,
    };
    let id = match photos::insert(&state.db, &new_photo).await {
        Ok(id) => id,
        Err(e) => {
            state.photos.remove(&image).await;
            return Err(e);
        }
    };
    info!(
        "Photo {} uploaded for tache {} by {} ({} bytes)",
        id,
        tache_id,
        actor.username,
        bytes.len()
    );

    Ok(PhotoResponse::from(load(state, id).await?))
}

async fn load(state: &AppState, id: i64) -> ApiResult<PhotoRapport> {
    photos::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("PhotoRapport", id))
}

/// GET /photos/:id
pub async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PhotoResponse>> {
    Ok(Json(PhotoResponse::from(load(&state, id).await?)))
}

/// POST /photos/:id/approuver
///
/// Same permission rule as hour validation; approving twice is a 409.
pub async fn approve_photo(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<i64>,
) -> ApiResult<Json<PhotoResponse>> {
    let photo = load(&state, id).await?;
    let chef = taches::chantier_of(&state.db, photo.tache)
        .await?
        .and_then(|(_, chef)| chef);
    actor.require_or_chef(Action::ApprovePhoto, chef)?;

    if !photos::approve(&state.db, id, actor.user_id).await? {
        return Err(ApiError::Conflict(format!("Photo {} is already approved", id)));
    }
    info!("Photo {} approved by {}", id, actor.username);

    Ok(Json(PhotoResponse::from(load(&state, id).await?)))
}

/// Build photo routes
pub fn photo_routes() -> Router<AppState> {
    Router::new()
        .route("/photos/:id", get(get_photo))
        .route("/photos/:id/approuver", post(approve_photo))
}
