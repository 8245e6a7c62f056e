//! Equipes table

use chantiers_common::domain::Specialite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{parse_enum, push_search};
use crate::error::ApiResult;
use crate::pagination::Pagination;

#[derive(Debug, Clone, Serialize)]
pub struct EquipeData {
    pub nom: String,
    pub description: String,
    pub specialite: Specialite,
    /// Membre leading the team
    pub chef: Option<i64>,
    pub contrat_externe: bool,
    pub actif: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Equipe {
    pub id: i64,
    #[serde(flatten)]
    pub data: EquipeData,
    /// Active membres of the team
    pub nombre_membres: i64,
    pub date_creation: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EquipeFilter {
    pub page: Option<i64>,
    pub specialite: Option<Specialite>,
    pub actif: Option<bool>,
    pub search: Option<String>,
}

const SELECT: &str = "SELECT e.*, \
    (SELECT COUNT(*) FROM membres m WHERE m.equipe_id = e.id AND m.actif = 1) AS nombre_membres \
    FROM equipes e";

fn map_row(row: &SqliteRow) -> ApiResult<Equipe> {
    Ok(Equipe {
        id: row.get("id"),
        data: EquipeData {
            nom: row.get("nom"),
            description: row.get("description"),
            specialite: parse_enum(row, "specialite", Specialite::from_str)?,
            chef: row.get("chef_id"),
            contrat_externe: row.get("contrat_externe"),
            actif: row.get("actif"),
        },
        nombre_membres: row.get("nombre_membres"),
        date_creation: row.get("date_creation"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<Equipe>> {
    let sql = format!("{} WHERE e.id = ?", SELECT);
    let row = sqlx::query(&sql).bind(id).fetch_optional(db).await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn insert(db: &SqlitePool, data: &EquipeData) -> ApiResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO equipes (nom, description, specialite, chef_id, contrat_externe, actif, date_creation)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.nom)
    .bind(&data.description)
    .bind(data.specialite.to_db_string())
    .bind(data.chef)
    .bind(data.contrat_externe)
    .bind(data.actif)
    .bind(chantiers_common::time::now())
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(db: &SqlitePool, id: i64, data: &EquipeData) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE equipes SET nom = ?, description = ?, specialite = ?, chef_id = ?,
            contrat_externe = ?, actif = ?
        WHERE id = ?
        "#,
    )
    .bind(&data.nom)
    .bind(&data.description)
    .bind(data.specialite.to_db_string())
    .bind(data.chef)
    .bind(data.contrat_externe)
    .bind(data.actif)
    .bind(id)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete(db: &SqlitePool, id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM equipes WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EquipeFilter) {
    qb.push(" WHERE e.actif = ").push_bind(filter.actif.unwrap_or(true));
    if let Some(specialite) = filter.specialite {
        qb.push(" AND e.specialite = ").push_bind(specialite.to_db_string());
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
        push_search(qb, &["e.nom", "e.specialite"], term);
    }
}

pub async fn count(db: &SqlitePool, filter: &EquipeFilter) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM equipes e");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(db: &SqlitePool, filter: &EquipeFilter, pagination: Pagination) -> ApiResult<Vec<Equipe>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT);
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY e.nom, e.id LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}

/// Equipes linked to a chantier
pub async fn list_for_chantier(db: &SqlitePool, chantier_id: i64) -> ApiResult<Vec<Equipe>> {
    let sql = format!(
        "{} JOIN chantier_equipes ce ON ce.equipe_id = e.id WHERE ce.chantier_id = ? ORDER BY e.nom, e.id",
        SELECT
    );
    let rows = sqlx::query(&sql).bind(chantier_id).fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}
