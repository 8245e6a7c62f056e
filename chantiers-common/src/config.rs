//! Configuration loading and root folder resolution
//!
//! Configuration is resolved once at process start into an explicit
//! [`ServerConfig`] that is handed to the service state. Nothing here keeps
//! process-wide mutable state.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "CHANTIERS_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "chantiers.db";

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Default maximum accepted photo size (5 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Compiled-in defaults used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub page_size: i64,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform the binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_addr: "127.0.0.1".to_string(),
            port: 8000,
            page_size: DEFAULT_PAGE_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: "info".to_string(),
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/chantiers (or /var/lib/chantiers system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("chantiers"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/chantiers"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("chantiers"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/chantiers"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("chantiers"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\chantiers"))
    } else {
        PathBuf::from("./chantiers_data")
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `"debug"` or `"chantiers_api=debug"`
    pub level: Option<String>,
}

/// On-disk TOML configuration
///
/// Every field is optional; missing values fall back to [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub page_size: Option<i64>,
    pub max_upload_bytes: Option<usize>,
    /// Photo blob directory; relative paths are resolved against the root folder
    pub media_dir: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load the explicit file if given, else the platform file if present
    ///
    /// A missing or unreadable file never aborts startup: a warning is logged
    /// and defaults are used.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file().filter(|p| p.exists()),
        };

        match path {
            Some(p) => match Self::load(&p) {
                Ok(config) => {
                    info!("Loaded configuration from {}", p.display());
                    config
                }
                Err(e) => {
                    warn!("{} - using defaults", e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }
}

/// Platform configuration file location (`<config_dir>/chantiers/config.toml`)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chantiers").join("config.toml"))
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. `CHANTIERS_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent compiled default
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, toml: &TomlConfig) -> Self {
        self.toml_root = toml.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout and derives file locations from it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    /// Media directory; a relative override is taken relative to the root folder
    pub fn media_path(&self, override_dir: Option<&Path>) -> PathBuf {
        match override_dir {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.root_folder.join(dir),
            None => self.root_folder.join("media"),
        }
    }
}

/// Fully resolved configuration passed to the HTTP service at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub media_root: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub page_size: i64,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Merge TOML values over compiled defaults for the given root folder
    pub fn resolve(root_folder: PathBuf, toml: &TomlConfig) -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        let initializer = RootFolderInitializer::new(root_folder.clone());

        let page_size = match toml.page_size {
            Some(size) if size > 0 => size,
            Some(size) => {
                warn!("Ignoring page_size = {} (must be positive)", size);
                defaults.page_size
            }
            None => defaults.page_size,
        };

        Self {
            database_path: initializer.database_path(),
            media_root: initializer.media_path(toml.media_dir.as_deref()),
            root_folder,
            bind_addr: toml.bind_addr.clone().unwrap_or(defaults.bind_addr),
            port: toml.port.unwrap_or(defaults.port),
            page_size,
            max_upload_bytes: toml.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
        }
    }

    /// Defaults rooted at `root_folder`, used by tests and embedded setups
    pub fn for_root(root_folder: PathBuf) -> Self {
        Self::resolve(root_folder, &TomlConfig::default())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_path_relative_override() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/chantiers"));
        assert_eq!(init.media_path(None), PathBuf::from("/srv/chantiers/media"));
        assert_eq!(
            init.media_path(Some(Path::new("uploads"))),
            PathBuf::from("/srv/chantiers/uploads")
        );
        assert_eq!(
            init.media_path(Some(Path::new("/data/photos"))),
            PathBuf::from("/data/photos")
        );
    }

    #[test]
    fn test_server_config_rejects_non_positive_page_size() {
        let toml = TomlConfig::parse("page_size = 0").unwrap();
        let config = ServerConfig::resolve(PathBuf::from("/tmp/x"), &toml);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_listen_addr() {
        let toml = TomlConfig::parse("bind_addr = \"0.0.0.0\"\nport = 9000").unwrap();
        let config = ServerConfig::resolve(PathBuf::from("/tmp/x"), &toml);
        assert_eq!(config.listen_addr(), "0.0.0.0:9000");
    }
}
