//! Heures de travail (logged hours)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::{decimal, push_id_list};
use crate::error::ApiResult;
use crate::pagination::Pagination;

#[derive(Debug, Clone, Serialize)]
pub struct HeureTravail {
    pub id: i64,
    pub tache: i64,
    pub membre: Option<i64>,
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub heures: Decimal,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub validee: bool,
    pub validee_par: Option<i64>,
    pub date_validation: Option<DateTime<Utc>>,
    pub date_enregistrement: DateTime<Utc>,
}

/// Columns supplied when logging hours
#[derive(Debug, Clone)]
pub struct NewHeureTravail {
    pub tache: i64,
    pub membre: i64,
    pub date: NaiveDate,
    pub heures: Decimal,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeureFilter {
    pub page: Option<i64>,
    pub tache: Option<i64>,
    pub membre: Option<i64>,
    pub date: Option<NaiveDate>,
    pub validee: Option<bool>,
}

fn map_row(row: &SqliteRow) -> ApiResult<HeureTravail> {
    Ok(HeureTravail {
        id: row.get("id"),
        tache: row.get("tache_id"),
        membre: row.get("membre_id"),
        date: row.get("date"),
        heures: decimal(row, "heures")?,
        description: row.get("description"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        validee: row.get("validee"),
        validee_par: row.get("validee_par"),
        date_validation: row.get("date_validation"),
        date_enregistrement: row.get("date_enregistrement"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<HeureTravail>> {
    let row = sqlx::query("SELECT * FROM heures_travail WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn insert(db: &SqlitePool, entry: &NewHeureTravail) -> ApiResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO heures_travail (
            tache_id, membre_id, date, heures, description, latitude, longitude,
            date_enregistrement
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.tache)
    .bind(entry.membre)
    .bind(entry.date)
    .bind(entry.heures.to_string())
    .bind(&entry.description)
    .bind(entry.latitude)
    .bind(entry.longitude)
    .bind(chantiers_common::time::now())
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Mark an entry validated; false when it already was
///
/// Of several concurrent calls for one entry, exactly one returns `true`.
pub async fn validate(db: &SqlitePool, id: i64, user_id: i64) -> ApiResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE heures_travail
        SET validee = 1, validee_par = ?, date_validation = ?
        WHERE id = ? AND validee = 0
        "#,
    )
    .bind(user_id)
    .bind(chantiers_common::time::now())
    .bind(id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Every entry of a tâche, newest first
pub async fn list_for_tache(db: &SqlitePool, tache_id: i64) -> ApiResult<Vec<HeureTravail>> {
    let rows = sqlx::query(
        "SELECT * FROM heures_travail WHERE tache_id = ? ORDER BY date DESC, id DESC",
    )
    .bind(tache_id)
    .fetch_all(db)
    .await?;
    rows.iter().map(map_row).collect()
}

/// Entries of one membre between two dates, inclusive
pub async fn list_for_membre_between(
    db: &SqlitePool,
    membre_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> ApiResult<Vec<HeureTravail>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM heures_travail
        WHERE membre_id = ? AND date >= ? AND date <= ?
        ORDER BY date DESC, id DESC
        "#,
    )
    .bind(membre_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await?;
    rows.iter().map(map_row).collect()
}

/// Total hours per membre between two dates, inclusive
pub async fn totals_by_membre_between(
    db: &SqlitePool,
    membre_ids: &[i64],
    from: NaiveDate,
    to: NaiveDate,
) -> ApiResult<HashMap<i64, Decimal>> {
    let mut totals = HashMap::new();
    if membre_ids.is_empty() {
        return Ok(totals);
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT membre_id, heures FROM heures_travail WHERE date >= ");
    qb.push_bind(from)
        .push(" AND date <= ")
        .push_bind(to)
        .push(" AND membre_id");
    push_id_list(&mut qb, membre_ids);

    for row in qb.build().fetch_all(db).await? {
        let membre_id: i64 = row.get("membre_id");
        *totals.entry(membre_id).or_insert(Decimal::ZERO) += decimal(&row, "heures")?;
    }
    Ok(totals)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &HeureFilter) {
    if let Some(tache) = filter.tache {
        qb.push(" AND tache_id = ").push_bind(tache);
    }
    if let Some(membre) = filter.membre {
        qb.push(" AND membre_id = ").push_bind(membre);
    }
    if let Some(date) = filter.date {
        qb.push(" AND date = ").push_bind(date);
    }
    if let Some(validee) = filter.validee {
        qb.push(" AND validee = ").push_bind(validee);
    }
}

pub async fn count(db: &SqlitePool, filter: &HeureFilter) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM heures_travail WHERE 1=1");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(
    db: &SqlitePool,
    filter: &HeureFilter,
    pagination: Pagination,
) -> ApiResult<Vec<HeureTravail>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM heures_travail WHERE 1=1");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY date DESC, id DESC LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}
