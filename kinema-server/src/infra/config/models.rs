use std::path::PathBuf;

use kinema_core::config::IngestConfig;

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    /// Folders registered (and watched) at startup in addition to the ones
    /// already stored.
    pub folders: Vec<PathBuf>,
    pub ingest: IngestConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Known-hash catalog seeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub seed_builtin: bool,
    /// JSON file with extra catalog entries.
    pub seed_file: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            seed_builtin: true,
            seed_file: None,
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
