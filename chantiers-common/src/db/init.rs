//! Database initialization
//!
//! Opens (creating if needed) the SQLite file, applies connection pragmas,
//! creates every table with `CREATE TABLE IF NOT EXISTS`, then runs the
//! versioned migrations. Safe to call on every start.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them;
    // cascades silently stop working on a connection without foreign_keys.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema_version_table(&pool).await?;
    create_users_table(&pool).await?;
    create_api_tokens_table(&pool).await?;

    // Teams first: chantiers and tâches reference them
    create_equipes_table(&pool).await?;
    create_membres_table(&pool).await?;
    create_sous_traitants_table(&pool).await?;

    create_chantiers_table(&pool).await?;
    create_chantier_equipes_table(&pool).await?;
    create_chantier_sous_traitants_table(&pool).await?;
    create_lots_table(&pool).await?;
    create_taches_table(&pool).await?;
    create_tache_sous_traitants_table(&pool).await?;
    create_heures_travail_table(&pool).await?;
    create_photos_rapport_table(&pool).await?;
    create_anomalies_table(&pool).await?;

    create_indexes(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL DEFAULT '',
            is_staff INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Bearer tokens, stored as SHA-256 digests only
async fn create_api_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_tokens (
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_equipes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nom TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            specialite TEXT NOT NULL DEFAULT 'AUTRE',
            chef_id INTEGER REFERENCES membres(id) ON DELETE SET NULL,
            contrat_externe INTEGER NOT NULL DEFAULT 0,
            actif INTEGER NOT NULL DEFAULT 1,
            date_creation TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_membres_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS membres (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prenom TEXT NOT NULL,
            nom TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            telephone TEXT NOT NULL DEFAULT '',
            equipe_id INTEGER REFERENCES equipes(id) ON DELETE SET NULL,
            role TEXT NOT NULL DEFAULT 'OUVRIER',
            qualifications TEXT NOT NULL DEFAULT '',
            taux_horaire TEXT,
            actif INTEGER NOT NULL DEFAULT 1,
            date_embauche TEXT,
            user_id INTEGER UNIQUE REFERENCES users(id) ON DELETE SET NULL,
            date_creation TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sous_traitants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sous_traitants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nom_entreprise TEXT NOT NULL,
            nom_contact TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            telephone TEXT NOT NULL DEFAULT '',
            adresse TEXT NOT NULL DEFAULT '',
            codepostal TEXT NOT NULL DEFAULT '',
            ville TEXT NOT NULL DEFAULT '',
            specialite TEXT NOT NULL DEFAULT 'AUTRE',
            taux_horaire TEXT,
            conditions_paiement TEXT NOT NULL DEFAULT '',
            reference_client TEXT NOT NULL DEFAULT '',
            note_moyenne TEXT NOT NULL DEFAULT '5.00',
            actif INTEGER NOT NULL DEFAULT 1,
            notes TEXT NOT NULL DEFAULT '',
            date_creation TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_chantiers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chantiers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            numero TEXT NOT NULL UNIQUE,
            nom TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            adresse TEXT NOT NULL DEFAULT '',
            codepostal TEXT NOT NULL DEFAULT '',
            ville TEXT NOT NULL DEFAULT '',
            latitude REAL,
            longitude REAL,
            date_debut TEXT NOT NULL,
            date_fin_prevue TEXT NOT NULL,
            date_fin_reelle TEXT,
            budget_total TEXT NOT NULL DEFAULT '0.00',
            status TEXT NOT NULL DEFAULT 'PENDING',
            chef_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            cree_par INTEGER REFERENCES users(id) ON DELETE SET NULL,
            notes_internes TEXT NOT NULL DEFAULT '',
            actif INTEGER NOT NULL DEFAULT 1,
            date_creation TEXT NOT NULL,
            date_modification TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_chantier_equipes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chantier_equipes (
            chantier_id INTEGER NOT NULL REFERENCES chantiers(id) ON DELETE CASCADE,
            equipe_id INTEGER NOT NULL REFERENCES equipes(id) ON DELETE CASCADE,
            PRIMARY KEY (chantier_id, equipe_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_chantier_sous_traitants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chantier_sous_traitants (
            chantier_id INTEGER NOT NULL REFERENCES chantiers(id) ON DELETE CASCADE,
            sous_traitant_id INTEGER NOT NULL REFERENCES sous_traitants(id) ON DELETE CASCADE,
            PRIMARY KEY (chantier_id, sous_traitant_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_lots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chantier_id INTEGER NOT NULL REFERENCES chantiers(id) ON DELETE CASCADE,
            numero INTEGER NOT NULL,
            nom TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            date_debut_prevue TEXT NOT NULL,
            date_fin_prevue TEXT NOT NULL,
            responsable_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
            budget_lot TEXT NOT NULL DEFAULT '0.00',
            status TEXT NOT NULL DEFAULT 'PENDING',
            date_creation TEXT NOT NULL,
            date_modification TEXT NOT NULL,
            UNIQUE (chantier_id, numero)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_taches_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS taches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lot_id INTEGER NOT NULL REFERENCES lots(id) ON DELETE CASCADE,
            numero TEXT NOT NULL,
            nom TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            ordre INTEGER NOT NULL DEFAULT 0,
            date_debut_prevue TEXT NOT NULL,
            date_fin_prevue TEXT NOT NULL,
            date_debut_reelle TEXT,
            date_fin_reelle TEXT,
            status TEXT NOT NULL DEFAULT 'A_FAIRE',
            heures_estimees TEXT NOT NULL DEFAULT '0',
            taux_horaire TEXT NOT NULL DEFAULT '50.00',
            cout_materiaux TEXT NOT NULL DEFAULT '0.00',
            equipe_id INTEGER REFERENCES equipes(id) ON DELETE SET NULL,
            notes TEXT NOT NULL DEFAULT '',
            date_creation TEXT NOT NULL,
            date_modification TEXT NOT NULL,
            UNIQUE (lot_id, numero)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tache_sous_traitants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tache_sous_traitants (
            tache_id INTEGER NOT NULL REFERENCES taches(id) ON DELETE CASCADE,
            sous_traitant_id INTEGER NOT NULL REFERENCES sous_traitants(id) ON DELETE CASCADE,
            PRIMARY KEY (tache_id, sous_traitant_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_heures_travail_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS heures_travail (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tache_id INTEGER NOT NULL REFERENCES taches(id) ON DELETE CASCADE,
            membre_id INTEGER REFERENCES membres(id) ON DELETE SET NULL,
            date TEXT NOT NULL,
            heures TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            latitude REAL,
            longitude REAL,
            validee INTEGER NOT NULL DEFAULT 0,
            validee_par INTEGER REFERENCES users(id) ON DELETE SET NULL,
            date_validation TEXT,
            date_enregistrement TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_photos_rapport_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS photos_rapport (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tache_id INTEGER NOT NULL REFERENCES taches(id) ON DELETE CASCADE,
            titre TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            image TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            date_photo TEXT NOT NULL,
            approuvee INTEGER NOT NULL DEFAULT 0,
            approuvee_par INTEGER REFERENCES users(id) ON DELETE SET NULL,
            uploadee_par INTEGER REFERENCES users(id) ON DELETE SET NULL,
            date_upload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_anomalies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS anomalies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tache_id INTEGER NOT NULL REFERENCES taches(id) ON DELETE CASCADE,
            photo_id INTEGER REFERENCES photos_rapport(id) ON DELETE SET NULL,
            titre TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            severite TEXT NOT NULL DEFAULT 'MINEURE',
            statut TEXT NOT NULL DEFAULT 'OUVERTE',
            responsable_id INTEGER REFERENCES membres(id) ON DELETE SET NULL,
            signalee_par INTEGER REFERENCES users(id) ON DELETE SET NULL,
            date_resolution_prevue TEXT,
            date_resolution_reelle TEXT,
            date_signalement TEXT NOT NULL,
            date_modification TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Indexes on foreign keys and common filter columns
async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_chantiers_status ON chantiers(status)",
        "CREATE INDEX IF NOT EXISTS idx_chantiers_chef ON chantiers(chef_id)",
        "CREATE INDEX IF NOT EXISTS idx_lots_chantier ON lots(chantier_id)",
        "CREATE INDEX IF NOT EXISTS idx_taches_lot ON taches(lot_id)",
        "CREATE INDEX IF NOT EXISTS idx_taches_equipe ON taches(equipe_id)",
        "CREATE INDEX IF NOT EXISTS idx_heures_tache ON heures_travail(tache_id)",
        "CREATE INDEX IF NOT EXISTS idx_heures_membre_date ON heures_travail(membre_id, date)",
        "CREATE INDEX IF NOT EXISTS idx_photos_tache ON photos_rapport(tache_id)",
        "CREATE INDEX IF NOT EXISTS idx_anomalies_tache ON anomalies(tache_id)",
        "CREATE INDEX IF NOT EXISTS idx_anomalies_statut ON anomalies(statut)",
        "CREATE INDEX IF NOT EXISTS idx_membres_equipe ON membres(equipe_id)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}
