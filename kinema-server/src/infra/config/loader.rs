use std::fs;
use std::path::PathBuf;

use kinema_core::config::IngestConfig;
use thiserror::Error;

use super::models::{CatalogConfig, Config, ConfigMetadata, ServerConfig};
use super::sources::{EnvConfig, FileConfig};
use super::validation::ConfigWarnings;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["kinema.toml", "config/kinema.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Composes environment variables over an optional TOML file over defaults.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
    env: Option<EnvConfig>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options, env: None }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Use these values instead of the process environment. No `.env` file is
    /// read in that case.
    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_config, env_file_loaded) = match &self.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        if let Some(invalid) = env_config.invalid.first() {
            return Err(ConfigLoadError::InvalidValue {
                field: invalid.name.to_string(),
                reason: format!("cannot parse '{}'", invalid.value),
            });
        }

        let (file_config, config_path) = self.load_file_config(&env_config)?;
        let (config, warnings) =
            compose_config(file_config, env_config, config_path, env_file_loaded)?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        loaded.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err.into()),
        })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists());
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
            path: path.clone(),
            source: err,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    config_path: Option<PathBuf>,
    env_file_loaded: bool,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if file_config.is_none() {
        warnings.push_with_hint(
            "No kinema.toml detected; using defaults and environment variables",
            "Pass --config or set KINEMA_CONFIG to point at a configuration file",
        );
    }

    let FileConfig {
        server: file_server,
        catalog: file_catalog,
        folders: file_folders,
        ingest: file_ingest,
    } = file_config.unwrap_or_default();

    let defaults = ServerConfig::default();
    let server = ServerConfig {
        host: env
            .server_host
            .clone()
            .or(file_server.host)
            .unwrap_or(defaults.host),
        port: env.server_port.or(file_server.port).unwrap_or(defaults.port),
    };

    let catalog_defaults = CatalogConfig::default();
    let catalog = CatalogConfig {
        seed_builtin: env
            .catalog_seed_builtin
            .or(file_catalog.seed_builtin)
            .unwrap_or(catalog_defaults.seed_builtin),
        seed_file: env.catalog_seed_file.clone().or(file_catalog.seed_file),
    };

    let folders = env.folders.clone().unwrap_or(file_folders);

    let mut ingest: IngestConfig = file_ingest.unwrap_or_default();
    if let Some(key) = env.tmdb_api_key {
        ingest.provider.api_key = key;
    }
    if let Some(base_url) = env.tmdb_base_url {
        ingest.provider.base_url = base_url;
    }
    if let Some(language) = env.tmdb_language {
        ingest.provider.language = language;
    }
    if let Some(scan_on_add) = env.scan_on_add {
        ingest.watch.scan_on_add = scan_on_add;
    }
    if let Some(hashes) = env.max_parallel_hashes {
        ingest.workers.max_parallel_hashes = hashes;
    }
    if let Some(interval) = env.drain_interval_ms {
        ingest.queue.drain_interval_ms = interval;
    }

    validate_ingest(&ingest)?;

    if ingest.provider.api_key.trim().is_empty() {
        warnings.push_with_hint(
            "TMDB API key not configured; recognized files will fail metadata resolution",
            "Set TMDB_API_KEY or ingest.provider.api_key",
        );
    }

    let config = Config {
        server,
        catalog,
        folders,
        ingest,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded,
        },
    };
    Ok((config, warnings))
}

fn validate_ingest(ingest: &IngestConfig) -> Result<(), ConfigLoadError> {
    let workers = &ingest.workers;
    let positive = [
        ("ingest.workers.max_parallel_hashes", workers.max_parallel_hashes),
        ("ingest.workers.max_parallel_identify", workers.max_parallel_identify),
        ("ingest.workers.max_parallel_metadata", workers.max_parallel_metadata),
        ("ingest.workers.event_channel_capacity", workers.event_channel_capacity),
        ("ingest.hashing.read_buffer_bytes", ingest.hashing.read_buffer_bytes),
    ];
    for (field, value) in positive {
        if value == 0 {
            return Err(ConfigLoadError::InvalidValue {
                field: field.to_string(),
                reason: "must be greater than zero".into(),
            });
        }
    }
    if ingest.queue.drain_interval_ms == 0 {
        return Err(ConfigLoadError::InvalidValue {
            field: "ingest.queue.drain_interval_ms".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if ingest.watch.video_extensions.is_empty() {
        return Err(ConfigLoadError::InvalidValue {
            field: "ingest.watch.video_extensions".into(),
            reason: "at least one extension is required".into(),
        });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit | ConfigPathProvenance::Env)
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
