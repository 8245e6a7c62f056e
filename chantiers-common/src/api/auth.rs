//! Bearer token authentication
//!
//! Clients send `Authorization: Bearer <token>`. Only the SHA-256 digest of a
//! token is stored (`api_tokens.token_hash`), so a leaked database does not
//! leak usable credentials.

use sha2::{Digest, Sha256};

#[cfg(feature = "sqlx")]
use sqlx::{Row, SqlitePool};

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// No `Authorization` header
    MissingHeader,

    /// Header present but not `Bearer <token>`
    MalformedHeader,

    /// Token does not match any stored digest
    UnknownToken,

    /// Database error while resolving the token
    DatabaseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingHeader => write!(f, "Missing Authorization header"),
            ApiAuthError::MalformedHeader => write!(f, "Authorization header must be 'Bearer <token>'"),
            ApiAuthError::UnknownToken => write!(f, "Invalid or revoked token"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for ApiAuthError {}

/// Extract the token from an `Authorization` header value
///
/// # Examples
///
/// ```
/// use chantiers_common::api::auth::parse_bearer;
///
/// assert_eq!(parse_bearer("Bearer abc123").unwrap(), "abc123");
/// assert!(parse_bearer("Basic abc123").is_err());
/// ```
pub fn parse_bearer(header: &str) -> Result<&str, ApiAuthError> {
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().map(str::trim).unwrap_or_default();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ApiAuthError::MalformedHeader);
    }
    Ok(token)
}

/// SHA-256 hex digest of a token
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}

/// New random token (64 hex characters)
pub fn generate_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// User resolved from a bearer token
#[cfg(feature = "sqlx")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub is_staff: bool,
}

/// Store a fresh token for `user_id` and return the clear-text value
///
/// The clear text is returned exactly once; only its digest is persisted.
#[cfg(feature = "sqlx")]
pub async fn issue_token(db: &SqlitePool, user_id: i64) -> Result<String, ApiAuthError> {
    let token = generate_token();

    sqlx::query("INSERT INTO api_tokens (token_hash, user_id) VALUES (?, ?)")
        .bind(hash_token(&token))
        .bind(user_id)
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(token)
}

/// Resolve a clear-text token to its user
#[cfg(feature = "sqlx")]
pub async fn lookup_token(db: &SqlitePool, token: &str) -> Result<Identity, ApiAuthError> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.username, u.is_staff
        FROM api_tokens t
        JOIN users u ON u.id = t.user_id
        WHERE t.token_hash = ? AND u.is_active = 1
        "#,
    )
    .bind(hash_token(token))
    .fetch_optional(db)
    .await
    .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match row {
        Some(row) => Ok(Identity {
            user_id: row.get("id"),
            username: row.get("username"),
            is_staff: row.get::<bool, _>("is_staff"),
        }),
        None => Err(ApiAuthError::UnknownToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_accepts_any_case_scheme() {
        assert_eq!(parse_bearer("bearer tok").unwrap(), "tok");
        assert_eq!(parse_bearer("  BEARER   tok  ").unwrap(), "tok");
    }

    #[test]
    fn test_parse_bearer_rejects_malformed() {
        assert_eq!(parse_bearer("Bearer"), Err(ApiAuthError::MalformedHeader));
        assert_eq!(parse_bearer("Bearer "), Err(ApiAuthError::MalformedHeader));
        assert_eq!(parse_bearer("Token abc"), Err(ApiAuthError::MalformedHeader));
        assert_eq!(parse_bearer(""), Err(ApiAuthError::MalformedHeader));
    }

    #[test]
    fn test_hash_token_is_stable_sha256() {
        let hash = hash_token("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_generate_token_is_random_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
