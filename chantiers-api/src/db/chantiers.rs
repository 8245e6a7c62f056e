//! Chantiers table and its team/subcontractor assignments

use chantiers_common::domain::ChantierStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::{decimal, parse_enum, push_search};
use crate::error::ApiResult;
use crate::pagination::Pagination;

/// Editable chantier columns
#[derive(Debug, Clone, Serialize)]
pub struct ChantierData {
    pub numero: String,
    pub nom: String,
    pub description: String,
    pub adresse: String,
    pub codepostal: String,
    pub ville: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub date_debut: NaiveDate,
    pub date_fin_prevue: NaiveDate,
    pub date_fin_reelle: Option<NaiveDate>,
    pub budget_total: Decimal,
    pub status: ChantierStatus,
    pub chef: Option<i64>,
    pub notes_internes: String,
    pub actif: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chantier {
    pub id: i64,
    #[serde(flatten)]
    pub data: ChantierData,
    pub cree_par: Option<i64>,
    pub date_creation: DateTime<Utc>,
    pub date_modification: DateTime<Utc>,
}

/// List filters (`GET /chantiers`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChantierFilter {
    pub page: Option<i64>,
    pub status: Option<ChantierStatus>,
    pub ville: Option<String>,
    pub date_debut_after: Option<NaiveDate>,
    pub date_debut_before: Option<NaiveDate>,
    pub date_fin_before: Option<NaiveDate>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub en_retard: Option<bool>,
    pub actif: Option<bool>,
    pub search: Option<String>,
}

fn map_row(row: &SqliteRow) -> ApiResult<Chantier> {
    Ok(Chantier {
        id: row.get("id"),
        data: ChantierData {
            numero: row.get("numero"),
            nom: row.get("nom"),
            description: row.get("description"),
            adresse: row.get("adresse"),
            codepostal: row.get("codepostal"),
            ville: row.get("ville"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            date_debut: row.get("date_debut"),
            date_fin_prevue: row.get("date_fin_prevue"),
            date_fin_reelle: row.get("date_fin_reelle"),
            budget_total: decimal(row, "budget_total")?,
            status: parse_enum(row, "status", ChantierStatus::from_str)?,
            chef: row.get("chef_id"),
            notes_internes: row.get("notes_internes"),
            actif: row.get("actif"),
        },
        cree_par: row.get("cree_par"),
        date_creation: row.get("date_creation"),
        date_modification: row.get("date_modification"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<Chantier>> {
    let row = sqlx::query("SELECT * FROM chantiers WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn insert(db: &SqlitePool, data: &ChantierData, cree_par: i64) -> ApiResult<i64> {
    let now = chantiers_common::time::now();
    let result = sqlx::query(
        r#"
        INSERT INTO chantiers (
            numero, nom, description, adresse, codepostal, ville, latitude, longitude,
            date_debut, date_fin_prevue, date_fin_reelle, budget_total, status, chef_id,
            cree_par, notes_internes, actif, date_creation, date_modification
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.numero)
    .bind(&data.nom)
    .bind(&data.description)
    .bind(&data.adresse)
    .bind(&data.codepostal)
    .bind(&data.ville)
    .bind(data.latitude)
    .bind(data.longitude)
    .bind(data.date_debut)
    .bind(data.date_fin_prevue)
    .bind(data.date_fin_reelle)
    .bind(data.budget_total.to_string())
    .bind(data.status.to_db_string())
    .bind(data.chef)
    .bind(cree_par)
    .bind(&data.notes_internes)
    .bind(data.actif)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(db: &SqlitePool, id: i64, data: &ChantierData) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE chantiers SET
            numero = ?, nom = ?, description = ?, adresse = ?, codepostal = ?, ville = ?,
            latitude = ?, longitude = ?, date_debut = ?, date_fin_prevue = ?,
            date_fin_reelle = ?, budget_total = ?, status = ?, chef_id = ?,
            notes_internes = ?, actif = ?, date_modification = ?
        WHERE id = ?
        "#,
    )
    .bind(&data.numero)
    .bind(&data.nom)
    .bind(&data.description)
    .bind(&data.adresse)
    .bind(&data.codepostal)
    .bind(&data.ville)
    .bind(data.latitude)
    .bind(data.longitude)
    .bind(data.date_debut)
    .bind(data.date_fin_prevue)
    .bind(data.date_fin_reelle)
    .bind(data.budget_total.to_string())
    .bind(data.status.to_db_string())
    .bind(data.chef)
    .bind(&data.notes_internes)
    .bind(data.actif)
    .bind(chantiers_common::time::now())
    .bind(id)
    .execute(db)
    .await?;

    Ok(())
}

/// Delete a chantier; lots, tâches and everything below go with it
pub async fn delete(db: &SqlitePool, id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM chantiers WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ChantierFilter, today: NaiveDate) {
    // Only active chantiers unless the caller asks otherwise
    qb.push(" AND actif = ").push_bind(filter.actif.unwrap_or(true));

    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.to_db_string());
    }
    if let Some(ville) = filter.ville.as_deref().filter(|v| !v.trim().is_empty()) {
        push_search(qb, &["ville"], ville);
    }
    if let Some(date) = filter.date_debut_after {
        qb.push(" AND date_debut >= ").push_bind(date);
    }
    if let Some(date) = filter.date_debut_before {
        qb.push(" AND date_debut <= ").push_bind(date);
    }
    if let Some(date) = filter.date_fin_before {
        qb.push(" AND date_fin_prevue <= ").push_bind(date);
    }
    if let Some(min) = filter.budget_min.and_then(|d| d.to_f64()) {
        qb.push(" AND CAST(budget_total AS REAL) >= ").push_bind(min);
    }
    if let Some(max) = filter.budget_max.and_then(|d| d.to_f64()) {
        qb.push(" AND CAST(budget_total AS REAL) <= ").push_bind(max);
    }
    if let Some(en_retard) = filter.en_retard {
        let [done, invoiced, cancelled] = ChantierStatus::closed_db_strings();
        qb.push(if en_retard { " AND (" } else { " AND NOT (" })
            .push("date_fin_prevue < ")
            .push_bind(today)
            .push(" AND status NOT IN (")
            .push_bind(done)
            .push(", ")
            .push_bind(invoiced)
            .push(", ")
            .push_bind(cancelled)
            .push("))");
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
        push_search(qb, &["numero", "nom", "adresse", "ville"], term);
    }
}

pub async fn count(db: &SqlitePool, filter: &ChantierFilter, today: NaiveDate) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM chantiers WHERE 1=1");
    push_filters(&mut qb, filter, today);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(
    db: &SqlitePool,
    filter: &ChantierFilter,
    today: NaiveDate,
    pagination: Pagination,
) -> ApiResult<Vec<Chantier>> {
    debug!("Listing chantiers with {:?}", filter);
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM chantiers WHERE 1=1");
    push_filters(&mut qb, filter, today);
    qb.push(" ORDER BY date_creation DESC, id DESC LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}

/// Count of OUVERTE + ASSIGNEE anomalies under a chantier
pub async fn open_anomalies(db: &SqlitePool, chantier_id: i64) -> ApiResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM anomalies a
        JOIN taches t ON t.id = a.tache_id
        JOIN lots l ON l.id = t.lot_id
        WHERE l.chantier_id = ? AND a.statut IN ('OUVERTE', 'ASSIGNEE')
        "#,
    )
    .bind(chantier_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Distinct active membres of equipes assigned to the chantier or to its tâches
pub async fn active_membres(db: &SqlitePool, chantier_id: i64) -> ApiResult<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT m.id) FROM membres m
        WHERE m.actif = 1 AND m.equipe_id IN (
            SELECT equipe_id FROM chantier_equipes WHERE chantier_id = ?
            UNION
            SELECT t.equipe_id FROM taches t
            JOIN lots l ON l.id = t.lot_id
            WHERE l.chantier_id = ? AND t.equipe_id IS NOT NULL
        )
        "#,
    )
    .bind(chantier_id)
    .bind(chantier_id)
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Link an equipe; returns false when it was already linked
pub async fn add_equipe(db: &SqlitePool, chantier_id: i64, equipe_id: i64) -> ApiResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO chantier_equipes (chantier_id, equipe_id) VALUES (?, ?)",
    )
    .bind(chantier_id)
    .bind(equipe_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_equipe(db: &SqlitePool, chantier_id: i64, equipe_id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM chantier_equipes WHERE chantier_id = ? AND equipe_id = ?")
        .bind(chantier_id)
        .bind(equipe_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Link a sous-traitant; returns false when it was already linked
pub async fn add_sous_traitant(
    db: &SqlitePool,
    chantier_id: i64,
    sous_traitant_id: i64,
) -> ApiResult<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO chantier_sous_traitants (chantier_id, sous_traitant_id) VALUES (?, ?)",
    )
    .bind(chantier_id)
    .bind(sous_traitant_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_sous_traitant(
    db: &SqlitePool,
    chantier_id: i64,
    sous_traitant_id: i64,
) -> ApiResult<bool> {
    let result = sqlx::query(
        "DELETE FROM chantier_sous_traitants WHERE chantier_id = ? AND sous_traitant_id = ?",
    )
    .bind(chantier_id)
    .bind(sous_traitant_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}
