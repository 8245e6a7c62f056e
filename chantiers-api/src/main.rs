//! chantiers-api - construction-site tracking REST service
//!
//! Serves the `/api/v1` resources over HTTP. `create-user` provisions an
//! account and prints its bearer token.

use anyhow::{Context, Result};
use chantiers_common::api::auth::issue_token;
use chantiers_common::config::{
    RootFolderInitializer, RootFolderResolver, ServerConfig, TomlConfig,
};
use chantiers_api::{build_router, AppState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "chantiers_api=info,chantiers_common=info,tower_http=info";

#[derive(Debug, Parser)]
#[command(name = "chantiers-api", version, about = "Construction-site tracking REST service")]
struct Args {
    /// Root folder holding chantiers.db and media/
    #[arg(long, env = "CHANTIERS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "CHANTIERS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides the configuration file)
    #[arg(long, env = "CHANTIERS_PORT")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a user and print a bearer token for it
    CreateUser {
        username: String,
        /// Grant staff rights
        #[arg(long)]
        staff: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing before anything logs; the TOML level is swapped in below
    let rust_log_set = std::env::var_os("RUST_LOG").is_some();
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let toml = TomlConfig::load_or_default(args.config.as_deref());

    if let Some(level) = toml_log_level(rust_log_set, toml.logging.level.as_deref()) {
        match EnvFilter::try_new(level) {
            Ok(configured) => {
                if let Err(e) = filter_handle.reload(configured) {
                    warn!("Could not apply logging level {:?}: {}", level, e);
                }
            }
            Err(e) => warn!("Invalid logging level {:?} in configuration: {}", level, e),
        }
    }

    info!(
        "Starting chantiers-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&toml)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder.clone());
    initializer.ensure_directory_exists()?;
    info!("Root folder: {}", initializer.root_folder().display());

    let mut config = ServerConfig::resolve(root_folder, &toml);
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("Database path: {}", config.database_path.display());
    let pool = match chantiers_common::db::init_database(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::CreateUser { username, staff } => {
            let user_id = chantiers_common::db::create_user(&pool, &username, staff)
                .await
                .with_context(|| format!("Creating user {}", username))?;
            let token = issue_token(&pool, user_id).await?;
            println!("{}", token);
            Ok(())
        }
        Command::Serve => serve(pool, config).await,
    }
}

/// TOML logging level to apply; RUST_LOG wins when set
fn toml_log_level(rust_log_set: bool, level: Option<&str>) -> Option<&str> {
    if rust_log_set {
        return None;
    }
    level.map(str::trim).filter(|l| !l.is_empty())
}

async fn serve(pool: sqlx::SqlitePool, config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.media_root)
        .with_context(|| format!("Creating media folder {}", config.media_root.display()))?;
    info!("Media folder: {}", config.media_root.display());

    let addr = config.listen_addr();
    let state = AppState::new(pool, config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Binding {}", addr))?;
    info!("chantiers-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_overrides_toml_level() {
        assert_eq!(toml_log_level(true, Some("debug")), None);
    }

    #[test]
    fn test_toml_level_applies_without_rust_log() {
        assert_eq!(toml_log_level(false, Some(" chantiers_api=debug ")), Some("chantiers_api=debug"));
        assert_eq!(toml_log_level(false, Some("")), None);
        assert_eq!(toml_log_level(false, None), None);
    }
}
