//! Sous-traitants table

use chantiers_common::domain::Specialite;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{decimal, decimal_opt, parse_enum, push_search};
use crate::error::ApiResult;
use crate::pagination::Pagination;

#[derive(Debug, Clone, Serialize)]
pub struct SousTraitantData {
    pub nom_entreprise: String,
    pub nom_contact: String,
    pub email: String,
    pub telephone: String,
    pub adresse: String,
    pub codepostal: String,
    pub ville: String,
    pub specialite: Specialite,
    pub taux_horaire: Option<Decimal>,
    pub conditions_paiement: String,
    pub reference_client: String,
    pub actif: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SousTraitant {
    pub id: i64,
    #[serde(flatten)]
    pub data: SousTraitantData,
    /// Average rating, 0 to 5; not writable through the API
    pub note_moyenne: Decimal,
    pub date_creation: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SousTraitantFilter {
    pub page: Option<i64>,
    pub specialite: Option<Specialite>,
    pub actif: Option<bool>,
    pub search: Option<String>,
}

fn map_row(row: &SqliteRow) -> ApiResult<SousTraitant> {
    Ok(SousTraitant {
        id: row.get("id"),
        data: SousTraitantData {
            nom_entreprise: row.get("nom_entreprise"),
            nom_contact: row.get("nom_contact"),
            email: row.get("email"),
            telephone: row.get("telephone"),
            adresse: row.get("adresse"),
            codepostal: row.get("codepostal"),
            ville: row.get("ville"),
            specialite: parse_enum(row, "specialite", Specialite::from_str)?,
            taux_horaire: decimal_opt(row, "taux_horaire")?,
            conditions_paiement: row.get("conditions_paiement"),
            reference_client: row.get("reference_client"),
            actif: row.get("actif"),
            notes: row.get("notes"),
        },
        note_moyenne: decimal(row, "note_moyenne")?,
        date_creation: row.get("date_creation"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<SousTraitant>> {
    let row = sqlx::query("SELECT * FROM sous_traitants WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn insert(db: &SqlitePool, data: &SousTraitantData) -> ApiResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sous_traitants (
            nom_entreprise, nom_contact, email, telephone, adresse, codepostal, ville,
            specialite, taux_horaire, conditions_paiement, reference_client, actif, notes,
            date_creation
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.nom_entreprise)
    .bind(&data.nom_contact)
    .bind(&data.email)
    .bind(&data.telephone)
    .bind(&data.adresse)
    .bind(&data.codepostal)
    .bind(&data.ville)
    .bind(data.specialite.to_db_string())
    .bind(data.taux_horaire.map(|d| d.to_string()))
    .bind(&data.conditions_paiement)
    .bind(&data.reference_client)
    .bind(data.actif)
    .bind(&data.notes)
    .bind(chantiers_common::time::now())
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(db: &SqlitePool, id: i64, data: &SousTraitantData) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE sous_traitants SET
            nom_entreprise = ?, nom_contact = ?, email = ?, telephone = ?, adresse = ?,
            codepostal = ?, ville = ?, specialite = ?, taux_horaire = ?,
            conditions_paiement = ?, reference_client = ?, actif = ?, notes = ?
        WHERE id = ?
        "#,
    )
    .bind(&data.nom_entreprise)
    .bind(&data.nom_contact)
    .bind(&data.email)
    .bind(&data.telephone)
    .bind(&data.adresse)
    .bind(&data.codepostal)
    .bind(&data.ville)
    .bind(data.specialite.to_db_string())
    .bind(data.taux_horaire.map(|d| d.to_string()))
    .bind(&data.conditions_paiement)
    .bind(&data.reference_client)
    .bind(data.actif)
    .bind(&data.notes)
    .bind(id)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete(db: &SqlitePool, id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM sous_traitants WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SousTraitantFilter) {
    qb.push(" WHERE actif = ").push_bind(filter.actif.unwrap_or(true));
    if let Some(specialite) = filter.specialite {
        qb.push(" AND specialite = ").push_bind(specialite.to_db_string());
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
        push_search(qb, &["nom_entreprise", "nom_contact", "email"], term);
    }
}

pub async fn count(db: &SqlitePool, filter: &SousTraitantFilter) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM sous_traitants");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(
    db: &SqlitePool,
    filter: &SousTraitantFilter,
    pagination: Pagination,
) -> ApiResult<Vec<SousTraitant>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sous_traitants");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY nom_entreprise, id LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}

/// Sous-traitants linked to a chantier
pub async fn list_for_chantier(db: &SqlitePool, chantier_id: i64) -> ApiResult<Vec<SousTraitant>> {
    let rows = sqlx::query(
        r#"
        SELECT s.* FROM sous_traitants s
        JOIN chantier_sous_traitants cs ON cs.sous_traitant_id = s.id
        WHERE cs.chantier_id = ?
        ORDER BY s.nom_entreprise, s.id
        "#,
    )
    .bind(chantier_id)
    .fetch_all(db)
    .await?;
    rows.iter().map(map_row).collect()
}
