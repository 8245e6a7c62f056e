//! Anomalies table

use chantiers_common::domain::{AnomalieStatut, Severite};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::parse_enum;
use crate::error::ApiResult;
use crate::pagination::Pagination;

#[derive(Debug, Clone, Serialize)]
pub struct Anomalie {
    pub id: i64,
    pub tache: i64,
    pub photo: Option<i64>,
    pub titre: String,
    pub description: String,
    pub severite: Severite,
    pub statut: AnomalieStatut,
    pub responsable: Option<i64>,
    pub signalee_par: Option<i64>,
    pub date_resolution_prevue: Option<NaiveDate>,
    pub date_resolution_reelle: Option<NaiveDate>,
    pub date_signalement: DateTime<Utc>,
    pub date_modification: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnomalie {
    pub tache: i64,
    pub photo: Option<i64>,
    pub titre: String,
    pub description: String,
    pub severite: Severite,
    pub signalee_par: i64,
    pub date_resolution_prevue: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnomalieFilter {
    pub page: Option<i64>,
    pub statut: Option<AnomalieStatut>,
    pub severite: Option<Severite>,
    pub chantier_id: Option<i64>,
}

fn map_row(row: &SqliteRow) -> ApiResult<Anomalie> {
    Ok(Anomalie {
        id: row.get("id"),
        tache: row.get("tache_id"),
        photo: row.get("photo_id"),
        titre: row.get("titre"),
        description: row.get("description"),
        severite: parse_enum(row, "severite", Severite::from_str)?,
        statut: parse_enum(row, "statut", AnomalieStatut::from_str)?,
        responsable: row.get("responsable_id"),
        signalee_par: row.get("signalee_par"),
        date_resolution_prevue: row.get("date_resolution_prevue"),
        date_resolution_reelle: row.get("date_resolution_reelle"),
        date_signalement: row.get("date_signalement"),
        date_modification: row.get("date_modification"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<Anomalie>> {
    let row = sqlx::query("SELECT * FROM anomalies WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn insert(db: &SqlitePool, anomalie: &NewAnomalie) -> ApiResult<i64> {
    let now = chantiers_common::time::now();
    let result = sqlx::query(
        r#"
        INSERT INTO anomalies (
            tache_id, photo_id, titre, description, severite, statut, signalee_par,
            date_resolution_prevue, date_signalement, date_modification
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(anomalie.tache)
    .bind(anomalie.photo)
    .bind(&anomalie.titre)
    .bind(&anomalie.description)
    .bind(anomalie.severite.to_db_string())
    .bind(AnomalieStatut::Ouverte.to_db_string())
    .bind(anomalie.signalee_par)
    .bind(anomalie.date_resolution_prevue)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Move to ASSIGNEE with a responsible membre, if the status is still `from`
pub async fn assign(
    db: &SqlitePool,
    id: i64,
    from: AnomalieStatut,
    responsable_id: i64,
) -> ApiResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE anomalies SET statut = ?, responsable_id = ?, date_modification = ?
        WHERE id = ? AND statut = ?
        "#,
    )
    .bind(AnomalieStatut::Assignee.to_db_string())
    .bind(responsable_id)
    .bind(chantiers_common::time::now())
    .bind(id)
    .bind(from.to_db_string())
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Move ASSIGNEE → FERMEE, recording the resolution date
pub async fn close(db: &SqlitePool, id: i64, resolved_on: NaiveDate) -> ApiResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE anomalies SET statut = ?, date_resolution_reelle = ?, date_modification = ?
        WHERE id = ? AND statut = ?
        "#,
    )
    .bind(AnomalieStatut::Fermee.to_db_string())
    .bind(resolved_on)
    .bind(chantiers_common::time::now())
    .bind(id)
    .bind(AnomalieStatut::Assignee.to_db_string())
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_for_tache(db: &SqlitePool, tache_id: i64) -> ApiResult<Vec<Anomalie>> {
    let rows = sqlx::query(
        "SELECT * FROM anomalies WHERE tache_id = ? ORDER BY date_signalement DESC, id DESC",
    )
    .bind(tache_id)
    .fetch_all(db)
    .await?;
    rows.iter().map(map_row).collect()
}

/// Every anomaly under a chantier, optionally restricted to one status
pub async fn list_for_chantier(
    db: &SqlitePool,
    chantier_id: i64,
    statut: Option<AnomalieStatut>,
) -> ApiResult<Vec<Anomalie>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT a.* FROM anomalies a \
         JOIN taches t ON t.id = a.tache_id \
         JOIN lots l ON l.id = t.lot_id \
         WHERE l.chantier_id = ",
    );
    qb.push_bind(chantier_id);
    if let Some(statut) = statut {
        qb.push(" AND a.statut = ").push_bind(statut.to_db_string());
    }
    qb.push(" ORDER BY a.date_signalement DESC, a.id DESC");

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}

const FROM_CLAUSE: &str = " FROM anomalies a \
    JOIN taches t ON t.id = a.tache_id \
    JOIN lots l ON l.id = t.lot_id WHERE 1=1";

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AnomalieFilter) {
    if let Some(statut) = filter.statut {
        qb.push(" AND a.statut = ").push_bind(statut.to_db_string());
    }
    if let Some(severite) = filter.severite {
        qb.push(" AND a.severite = ").push_bind(severite.to_db_string());
    }
    if let Some(chantier_id) = filter.chantier_id {
        qb.push(" AND l.chantier_id = ").push_bind(chantier_id);
    }
}

pub async fn count(db: &SqlitePool, filter: &AnomalieFilter) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*)");
    qb.push(FROM_CLAUSE);
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(
    db: &SqlitePool,
    filter: &AnomalieFilter,
    pagination: Pagination,
) -> ApiResult<Vec<Anomalie>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT a.*");
    qb.push(FROM_CLAUSE);
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY a.date_signalement DESC, a.id DESC LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}
