//! Membres table

use chantiers_common::domain::RoleMembre;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{decimal_opt, parse_enum, push_search};
use crate::error::ApiResult;
use crate::pagination::Pagination;

#[derive(Debug, Clone, Serialize)]
pub struct MembreData {
    pub prenom: String,
    pub nom: String,
    pub email: String,
    pub telephone: String,
    pub equipe: Option<i64>,
    pub role: RoleMembre,
    pub qualifications: String,
    pub taux_horaire: Option<Decimal>,
    pub actif: bool,
    pub date_embauche: Option<NaiveDate>,
    /// Linked authentication identity
    pub user: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Membre {
    pub id: i64,
    #[serde(flatten)]
    pub data: MembreData,
    pub date_creation: DateTime<Utc>,
}

/// Membre profile of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub id: i64,
    pub role: RoleMembre,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembreFilter {
    pub page: Option<i64>,
    pub equipe: Option<i64>,
    pub role: Option<RoleMembre>,
    pub actif: Option<bool>,
    pub search: Option<String>,
}

fn map_row(row: &SqliteRow) -> ApiResult<Membre> {
    Ok(Membre {
        id: row.get("id"),
        data: MembreData {
            prenom: row.get("prenom"),
            nom: row.get("nom"),
            email: row.get("email"),
            telephone: row.get("telephone"),
            equipe: row.get("equipe_id"),
            role: parse_enum(row, "role", RoleMembre::from_str)?,
            qualifications: row.get("qualifications"),
            taux_horaire: decimal_opt(row, "taux_horaire")?,
            actif: row.get("actif"),
            date_embauche: row.get("date_embauche"),
            user: row.get("user_id"),
        },
        date_creation: row.get("date_creation"),
    })
}

pub async fn get(db: &SqlitePool, id: i64) -> ApiResult<Option<Membre>> {
    let row = sqlx::query("SELECT * FROM membres WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Active membre profile linked to a user, if any
pub async fn profile_for_user(db: &SqlitePool, user_id: i64) -> ApiResult<Option<Profile>> {
    let row = sqlx::query("SELECT id, role FROM membres WHERE user_id = ? AND actif = 1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;

    match row {
        Some(row) => Ok(Some(Profile {
            id: row.get("id"),
            role: parse_enum(&row, "role", RoleMembre::from_str)?,
        })),
        None => Ok(None),
    }
}

pub async fn insert(db: &SqlitePool, data: &MembreData) -> ApiResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO membres (
            prenom, nom, email, telephone, equipe_id, role, qualifications, taux_horaire,
            actif, date_embauche, user_id, date_creation
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&data.prenom)
    .bind(&data.nom)
    .bind(&data.email)
    .bind(&data.telephone)
    .bind(data.equipe)
    .bind(data.role.to_db_string())
    .bind(&data.qualifications)
    .bind(data.taux_horaire.map(|d| d.to_string()))
    .bind(data.actif)
    .bind(data.date_embauche)
    .bind(data.user)
    .bind(chantiers_common::time::now())
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(db: &SqlitePool, id: i64, data: &MembreData) -> ApiResult<()> {
    sqlx::query(
        r#"
        UPDATE membres SET
            prenom = ?, nom = ?, email = ?, telephone = ?, equipe_id = ?, role = ?,
            qualifications = ?, taux_horaire = ?, actif = ?, date_embauche = ?, user_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&data.prenom)
    .bind(&data.nom)
    .bind(&data.email)
    .bind(&data.telephone)
    .bind(data.equipe)
    .bind(data.role.to_db_string())
    .bind(&data.qualifications)
    .bind(data.taux_horaire.map(|d| d.to_string()))
    .bind(data.actif)
    .bind(data.date_embauche)
    .bind(data.user)
    .bind(id)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete(db: &SqlitePool, id: i64) -> ApiResult<bool> {
    let result = sqlx::query("DELETE FROM membres WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &MembreFilter) {
    qb.push(" WHERE actif = ").push_bind(filter.actif.unwrap_or(true));
    if let Some(equipe) = filter.equipe {
        qb.push(" AND equipe_id = ").push_bind(equipe);
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role.to_db_string());
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.trim().is_empty()) {
        push_search(qb, &["prenom", "nom", "email"], term);
    }
}

pub async fn count(db: &SqlitePool, filter: &MembreFilter) -> ApiResult<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM membres");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(db).await?;
    Ok(total)
}

pub async fn list(db: &SqlitePool, filter: &MembreFilter, pagination: Pagination) -> ApiResult<Vec<Membre>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM membres");
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY nom, prenom, id LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset);

    let rows = qb.build().fetch_all(db).await?;
    rows.iter().map(map_row).collect()
}
