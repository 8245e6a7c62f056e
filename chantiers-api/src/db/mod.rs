//! Repository-style data access
//!
//! Each submodule owns one table family: row structs, row mapping and the
//! queries handlers need. Lists load derived-field inputs for a whole page in
//! one query per child table instead of walking relations row by row.

pub mod anomalies;
pub mod chantiers;
pub mod equipes;
pub mod heures;
pub mod lots;
pub mod membres;
pub mod photos;
pub mod sous_traitants;
pub mod stats;
pub mod taches;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};

/// Decimal column stored as TEXT
pub(crate) fn decimal(row: &SqliteRow, column: &str) -> ApiResult<Decimal> {
    let raw: String = row.get(column);
    Decimal::from_str(&raw)
        .map_err(|e| ApiError::Internal(format!("Corrupt decimal in {}: {:?} ({})", column, raw, e)))
}

/// Nullable decimal column stored as TEXT
pub(crate) fn decimal_opt(row: &SqliteRow, column: &str) -> ApiResult<Option<Decimal>> {
    let raw: Option<String> = row.get(column);
    raw.map(|value| {
        Decimal::from_str(&value).map_err(|e| {
            ApiError::Internal(format!("Corrupt decimal in {}: {:?} ({})", column, value, e))
        })
    })
    .transpose()
}

/// Enum column stored as its database string
pub(crate) fn parse_enum<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> ApiResult<T> {
    let raw: String = row.get(column);
    parse(&raw).ok_or_else(|| ApiError::Internal(format!("Unknown {} value {:?}", column, raw)))
}

/// `%term%` pattern for `LIKE ... ESCAPE '\'`
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Append `column LIKE pattern` alternatives for a free-text search
pub(crate) fn push_search(qb: &mut QueryBuilder<'_, Sqlite>, columns: &[&str], term: &str) {
    let pattern = like_pattern(term.trim());
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column)
            .push(" LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\'");
    }
    qb.push(")");
}

/// Append ` IN (?, ?, ...)` for a non-empty id list
pub(crate) fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

/// Whether a row with this id exists in `table`
pub(crate) async fn exists(db: &sqlx::SqlitePool, table: &'static str, id: i64) -> ApiResult<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table);
    let found: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(db).await?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("lyon"), "%lyon%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
