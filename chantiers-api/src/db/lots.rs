//! Lots table

use chantiers_common::domain::ChantierStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{decimal, parse_enum};
use crate::error::ApiResult;
use crate::pagination::Pagination;

/// Editable lot columns
#[derive(Debug, Clone, Serialize)]
pub struct LotData {
    pub chantier: i64,
    pub numero: i64,
    pub nom: String,
    pub description: String,
    pub date_debut_prevue: NaiveDate,
    pub date_fin_prevue: NaiveDate,
    pub responsable: Option<i64>,
    pub budget_lot: Decimal,
    pub status: ChantierStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lot {
    pub id: i64,
    #[serde(flatten)]
    pub data: LotData,
    pub date_creation: DateTime<Utc>,
    pub date_modification: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotFilter {
    pub page: Option<i64>,
    pub chantier_id: Option<i64>,
    pub status: Option<ChantierStatus>,
}

fn map_row(row: &SqliteRow) -> ApiResult<Lot> {
    Ok(Lot {
        id: row.get("id"),
        data: LotData {
            chantier: row.get("chantier_id"),
            numero: row.get("numero"),
            nom: row.get("nom"),
            description: row.get("description"),
            date_debut_prevue: row.get("date_debut_prevue"),
            date_fin_prevue: row.get("date_fin_prevue"),
            responsable: row.get("responsable_id"),
            budget_lot: decimal(row, "budget_lot")?,
            status: parse_enum(row, "status", ChantierStatus::from_str)?,
        },
        date_creation: row.get("date_creation"),
        date_modification: row.get("date_modification"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<Lot>> {
    let row = sqlx::query("SELECT * FROM lots WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Every lot of one chantier, in sequence order
pub async fn list_for_chantier(db: &SqlitePool, chantier_id: i64) -> ApiResult<Vec<Lot>> {
    let rows = sqlx::query("SELECT * FROM lots WHERE chantier_id = ? ORDER BY numero, id")
        .bind(chantier_id)
        .fetch_all(db)
        .await?;
    rows.iter().map(map_row).collect()
}

pub async fn insert(db: &SqlitePool, data: &LotData) -> ApiResult<i64> {
    let now = chantiers_common::time::now();
    let result = sqlx::query(
        r#"
        INSERT INTO lots (
            chantier_id, numero, nom, description, date_debut_prevue, date_fin_prevue,
            responsable_id, budget_lot, status, date_creation, date_modification
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(data.chantier)
    .bind(data.numero)
    .bind(&data.nom)
    .bind(&data.description)
    .bind(data.date_debut_prevue)
    .bind(data.date_fin_prevue)
    .bind(data.responsable)
    .bind(data.budget_lot.to_string())
    .bind(data.status.to_db_string())
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(db: &SqlitePool, id: i64, data: &LotData) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE lots SET
            chantier_id = ?, numero = ?, nom = ?, description = ?, date_debut_prevue = ?,
            date_fin_prevue = ?, responsable_id = ?, budget_lot = ?, status = ?,
            date_modification = ?
        WHERE id = ?
        "#,
    )
    .bind(data.chantier)
    .bind(data.numero)
    .bind(&data.nom)
    .bind(&data.description)
    .bind(data.date_debut_prevue)
    .bind(data.date_fin_prevue)
    .bind(data.responsable)
    .bind(data.budget_lot.to_string())
    .bind(data.status.to_db_string())
    .bind(chantiers_common::time::now())
    .bind(id)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete(db: &SqlitePool, id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM lots WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LotFilter) {
    if let Some(chantier_id) = filter.chantier_id {
        qb.push(" AND chantier_id = ").push_bind(chantier_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.to_db_string());
    }
}

pub async fn count(db: &SqlitePool, filter: &LotFilter) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM lots WHERE 1=1");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(db: &SqlitePool, filter: &LotFilter, pagination: Pagination) -> ApiResult<Vec<Lot>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM lots WHERE 1=1");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY chantier_id, numero, id LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}
