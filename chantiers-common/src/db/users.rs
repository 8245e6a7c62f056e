//! Authentication identities
//!
//! Users are provisioned out of band (admin tooling, fixtures); the HTTP API
//! only reads them.

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Insert a user and return its id
pub async fn create_user(pool: &SqlitePool, username: &str, is_staff: bool) -> Result<i64> {
    let result = sqlx::query("INSERT INTO users (username, is_staff) VALUES (?, ?)")
        .bind(username)
        .bind(is_staff)
        .execute(pool)
        .await?;

    let id = result.last_insert_rowid();
    info!("Created user {} (id={}, staff={})", username, id, is_staff);
    Ok(id)
}
