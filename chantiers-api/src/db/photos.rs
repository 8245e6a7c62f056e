//! Photos rapport table

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::ApiResult;

#[derive(Debug, Clone, Serialize)]
pub struct PhotoRapport {
    pub id: i64,
    pub tache: i64,
    pub titre: String,
    pub description: String,
    /// Path relative to the media root
    pub image: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_photo: DateTime<Utc>,
    pub approuvee: bool,
    pub approuvee_par: Option<i64>,
    pub uploadee_par: Option<i64>,
    pub date_upload: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub tache: i64,
    pub titre: String,
    pub description: String,
    pub image: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub uploadee_par: i64,
}

fn map_row(row: &SqliteRow) -> PhotoRapport {
    PhotoRapport {
        id: row.get("id"),
        tache: row.get("tache_id"),
        titre: row.get("titre"),
        description: row.get("description"),
        image: row.get("image"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        date_photo: row.get("date_photo"),
        approuvee: row.get("approuvee"),
        approuvee_par: row.get("approuvee_par"),
        uploadee_par: row.get("uploadee_par"),
        date_upload: row.get("date_upload"),
    }
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<PhotoRapport>> {
    let row = sqlx::query("SELECT * FROM photos_rapport WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.as_ref().map(map_row))
}

pub async fn insert(db: &SqlitePool, photo: &NewPhoto) -> ApiResult<i64> {
    let now = chantiers_common::time::now();
    let result = sqlx::query(
        r#"
        INSERT INTO photos_rapport (
            tache_id, titre, description, image, latitude, longitude, date_photo,
            uploadee_par, date_upload
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(photo.tache)
    .bind(&photo.titre)
    .bind(&photo.description)
    .bind(&photo.image)
    .bind(photo.latitude)
    .bind(photo.longitude)
    .bind(now)
    .bind(photo.uploadee_par)
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Mark a photo approved; false when it already was
pub async fn approve(db: &SqlitePool, id: i64, user_id: i64) -> ApiResult<bool> {
    let result = sqlx::query(
        "UPDATE photos_rapport SET approuvee = 1, approuvee_par = ? WHERE id = ? AND approuvee = 0",
    )
    .bind(user_id)
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Every photo of a tâche, newest first
pub async fn list_for_tache(db: &SqlitePool, tache_id: i64) -> ApiResult<Vec<PhotoRapport>> {
    let rows = sqlx::query(
        "SELECT * FROM photos_rapport WHERE tache_id = ? ORDER BY date_photo DESC, id DESC",
    )
    .bind(tache_id)
    .fetch_all(db)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Tâche a photo belongs to
pub async fn tache_of(db: &SqlitePool, id: i64) -> ApiResult<Option<i64>> {
    let tache = sqlx::query_scalar("SELECT tache_id FROM photos_rapport WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(tache)
}
