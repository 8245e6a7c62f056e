//! Tâches table

use chantiers_common::domain::TacheStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::{decimal, parse_enum, push_id_list, push_search};
use crate::error::ApiResult;
use crate::pagination::Pagination;

/// Editable tâche columns
#[derive(Debug, Clone, Serialize)]
pub struct TacheData {
    pub lot: i64,
    pub numero: String,
    pub nom: String,
    pub description: String,
    pub ordre: i64,
    pub date_debut_prevue: NaiveDate,
    pub date_fin_prevue: NaiveDate,
    pub date_debut_reelle: Option<NaiveDate>,
    pub date_fin_reelle: Option<NaiveDate>,
    pub status: TacheStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub heures_estimees: Decimal,
    pub taux_horaire: Decimal,
    pub cout_materiaux: Decimal,
    pub equipe: Option<i64>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tache {
    pub id: i64,
    #[serde(flatten)]
    pub data: TacheData,
    pub date_creation: DateTime<Utc>,
    pub date_modification: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TacheFilter {
    pub page: Option<i64>,
    pub lot_id: Option<i64>,
    pub chantier_id: Option<i64>,
    pub equipe: Option<i64>,
    pub status: Option<TacheStatus>,
    pub date_fin_after: Option<NaiveDate>,
    pub date_fin_before: Option<NaiveDate>,
    pub en_retard: Option<bool>,
    pub search: Option<String>,
}

/// Child row counts shown on a tâche
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChildCounts {
    pub heures_travail_count: i64,
    pub photos_count: i64,
    pub anomalies_ouvertes: i64,
}

fn map_row(row: &SqliteRow) -> ApiResult<Tache> {
    Ok(Tache {
        id: row.get("id"),
        data: TacheData {
            lot: row.get("lot_id"),
            numero: row.get("numero"),
            nom: row.get("nom"),
            description: row.get("description"),
            ordre: row.get("ordre"),
            date_debut_prevue: row.get("date_debut_prevue"),
            date_fin_prevue: row.get("date_fin_prevue"),
            date_debut_reelle: row.get("date_debut_reelle"),
            date_fin_reelle: row.get("date_fin_reelle"),
            status: parse_enum(row, "status", TacheStatus::from_str)?,
            heures_estimees: decimal(row, "heures_estimees")?,
            taux_horaire: decimal(row, "taux_horaire")?,
            cout_materiaux: decimal(row, "cout_materiaux")?,
            equipe: row.get("equipe_id"),
            notes: row.get("notes"),
        },
        date_creation: row.get("date_creation"),
        date_modification: row.get("date_modification"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<Tache>> {
    let row = sqlx::query("SELECT * FROM taches WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Chantier owning a tâche, with that chantier's chef
pub async fn chantier_of(db: &SqlitePool, tache_id: i64) -> ApiResult<Option<(i64, Option<i64>)>> {
    let row = sqlx::query(
        r#"
        SELECT c.id, c.chef_id FROM taches t
        JOIN lots l ON l.id = t.lot_id
        JOIN chantiers c ON c.id = l.chantier_id
        WHERE t.id = ?
        "#,
    )
    .bind(tache_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(|r| (r.get("id"), r.get("chef_id"))))
}

pub async fn insert(db: &SqlitePool, data: &TacheData) -> ApiResult<i64> {
    let now = chantiers_common::time::now();
    let result = sqlx::query(
        r#"
        INSERT INTO taches (
            lot_id, numero, nom, description, ordre, date_debut_prevue, date_fin_prevue,
            date_debut_reelle, date_fin_reelle, status, heures_estimees, taux_horaire,
            cout_materiaux, equipe_id, notes, date_creation, date_modification
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(data.lot)
    .bind(&data.numero)
    .bind(&data.nom)
    .bind(&data.description)
    .bind(data.ordre)
    .bind(data.date_debut_prevue)
    .bind(data.date_fin_prevue)
    .bind(data.date_debut_reelle)
    .bind(data.date_fin_reelle)
    .bind(data.status.to_db_string())
    .bind(data.heures_estimees.to_string())
    .bind(data.taux_horaire.to_string())
    .bind(data.cout_materiaux.to_string())
    .bind(data.equipe)
    .bind(&data.notes)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Write every column, provided the stored status is still `expected`
///
/// Returns false when another writer changed the status first.
pub async fn update(
    db: &SqlitePool,
    id: i64,
    data: &TacheData,
    expected: TacheStatus,
) -> ApiResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE taches SET
            lot_id = ?, numero = ?, nom = ?, description = ?, ordre = ?,
            date_debut_prevue = ?, date_fin_prevue = ?, date_debut_reelle = ?,
            date_fin_reelle = ?, status = ?, heures_estimees = ?, taux_horaire = ?,
            cout_materiaux = ?, equipe_id = ?, notes = ?, date_modification = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(data.lot)
    .bind(&data.numero)
    .bind(&data.nom)
    .bind(&data.description)
    .bind(data.ordre)
    .bind(data.date_debut_prevue)
    .bind(data.date_fin_prevue)
    .bind(data.date_debut_reelle)
    .bind(data.date_fin_reelle)
    .bind(data.status.to_db_string())
    .bind(data.heures_estimees.to_string())
    .bind(data.taux_horaire.to_string())
    .bind(data.cout_materiaux.to_string())
    .bind(data.equipe)
    .bind(&data.notes)
    .bind(chantiers_common::time::now())
    .bind(id)
    .bind(expected.to_db_string())
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace the sous-traitants linked to a tâche
pub async fn set_sous_traitants(db: &SqlitePool, tache_id: i64, ids: &[i64]) -> ApiResult<()> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM tache_sous_traitants WHERE tache_id = ?")
        .bind(tache_id)
        .execute(&mut *tx)
        .await?;
    for sous_traitant_id in ids {
        sqlx::query(
            "INSERT OR IGNORE INTO tache_sous_traitants (tache_id, sous_traitant_id) VALUES (?, ?)",
        )
        .bind(tache_id)
        .bind(sous_traitant_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Linked sous-traitant ids per tâche, ascending
pub async fn sous_traitants_by_tache(
    db: &SqlitePool,
    ids: &[i64],
) -> ApiResult<HashMap<i64, Vec<i64>>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT tache_id, sous_traitant_id FROM tache_sous_traitants WHERE tache_id",
    );
    push_id_list(&mut qb, ids);
    qb.push(" ORDER BY tache_id, sous_traitant_id");

    let mut links: HashMap<i64, Vec<i64>> = HashMap::new();
    for row in qb.build().fetch_all(db).await? {
        links
            .entry(row.get("tache_id"))
            .or_default()
            .push(row.get("sous_traitant_id"));
    }
    Ok(links)
}

pub async fn delete(db: &SqlitePool, id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM taches WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &TacheFilter, today: NaiveDate) {
    if let Some(lot_id) = filter.lot_id {
        qb.push(" AND t.lot_id = ").push_bind(lot_id);
    }
    if let Some(chantier_id) = filter.chantier_id {
        qb.push(" AND l.chantier_id = ").push_bind(chantier_id);
    }
    if let Some(equipe) = filter.equipe {
        qb.push(" AND t.equipe_id = ").push_bind(equipe);
    }
    if let Some(status) = filter.status {
        qb.push(" AND t.status = ").push_bind(status.to_db_string());
    }
    if let Some(date) = filter.date_fin_after {
        qb.push(" AND t.date_fin_prevue >= ").push_bind(date);
    }
    if let Some(date) = filter.date_fin_before {
        qb.push(" AND t.date_fin_prevue <= ").push_bind(date);
    }
    if let Some(en_retard) = filter.en_retard {
        // Open past the planned end, or finished after it
        let terminee = TacheStatus::Terminee.to_db_string();
        qb.push(if en_retard { " AND (" } else { " AND NOT (" })
            .push("(t.status != ")
            .push_bind(terminee)
            .push(" AND t.date_fin_prevue < ")
            .push_bind(today)
            .push(") OR (t.status = ")
            .push_bind(terminee)
            .push(" AND t.date_fin_reelle IS NOT NULL AND t.date_fin_reelle > t.date_fin_prevue))");
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
        push_search(qb, &["t.numero", "t.nom", "t.description"], term);
    }
}

const FROM_CLAUSE: &str = " FROM taches t JOIN lots l ON l.id = t.lot_id WHERE 1=1";

pub async fn count(db: &SqlitePool, filter: &TacheFilter, today: NaiveDate) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*)");
    qb.push(FROM_CLAUSE);
    push_filters(&mut qb, filter, today);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(
    db: &SqlitePool,
    filter: &TacheFilter,
    today: NaiveDate,
    pagination: Pagination,
) -> ApiResult<Vec<Tache>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT t.*");
    qb.push(FROM_CLAUSE);
    push_filters(&mut qb, filter, today);
    qb.push(" ORDER BY t.date_fin_prevue, t.ordre, t.id LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}

/// Hour, photo and open-anomaly counts for a set of tâches
pub async fn child_counts(db: &SqlitePool, ids: &[i64]) -> ApiResult<HashMap<i64, ChildCounts>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT t.id,
            (SELECT COUNT(*) FROM heures_travail h WHERE h.tache_id = t.id) AS heures_travail_count,
            (SELECT COUNT(*) FROM photos_rapport p WHERE p.tache_id = t.id) AS photos_count,
            (SELECT COUNT(*) FROM anomalies a
                WHERE a.tache_id = t.id AND a.statut != 'FERMEE') AS anomalies_ouvertes
        FROM taches t WHERE t.id"#,
    );
    push_id_list(&mut qb, ids);

    let rows = qb.build().fetch_all(db).await?;
    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get("id"),
                ChildCounts {
                    heures_travail_count: row.get("heures_travail_count"),
                    photos_count: row.get("photos_count"),
                    anomalies_ouvertes: row.get("anomalies_ouvertes"),
                },
            )
        })
        .collect())
}
