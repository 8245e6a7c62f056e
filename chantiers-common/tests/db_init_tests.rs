//! Database bootstrap tests: creation, reopening, cascades, tokens

use chantiers_common::api::{issue_token, lookup_token, ApiAuthError};
use chantiers_common::db::{
    create_user, get_schema_version, init_database, run_migrations, CURRENT_SCHEMA_VERSION,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("chantiers.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("chantiers.db");

    let pool1 = init_database(&db_path).await.unwrap();
    create_user(&pool1, "alice", false).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("chantiers.db")).await.unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_schema_version_recorded_once_across_reopens() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("chantiers.db");

    let pool = init_database(&db_path).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("chantiers.db")).await.unwrap();

    for table in [
        "users",
        "api_tokens",
        "chantiers",
        "lots",
        "taches",
        "heures_travail",
        "photos_rapport",
        "anomalies",
        "equipes",
        "membres",
        "tache_sous_traitants",
        "sous_traitants",
        "chantier_equipes",
        "chantier_sous_traitants",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_deleting_chantier_cascades_to_lots() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("chantiers.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO chantiers (numero, nom, date_debut, date_fin_prevue, date_creation, date_modification)
         VALUES ('CH-1', 'Maison', '2024-01-01', '2024-06-01', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO lots (chantier_id, numero, nom, date_debut_prevue, date_fin_prevue, date_creation, date_modification)
         VALUES (1, 1, 'Gros oeuvre', '2024-01-01', '2024-02-01', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM chantiers WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let lots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lots")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(lots, 0, "foreign key cascade not applied");
}

#[tokio::test]
async fn test_issue_and_lookup_token() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("chantiers.db")).await.unwrap();

    let user_id = create_user(&pool, "chef", true).await.unwrap();
    let token = issue_token(&pool, user_id).await.unwrap();

    let identity = lookup_token(&pool, &token).await.unwrap();
    assert_eq!(identity.user_id, user_id);
    assert_eq!(identity.username, "chef");
    assert!(identity.is_staff);

    let stored: String = sqlx::query_scalar("SELECT token_hash FROM api_tokens")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_ne!(stored, token, "clear-text token must not be stored");

    assert_eq!(
        lookup_token(&pool, "not-a-token").await,
        Err(ApiAuthError::UnknownToken)
    );
}
