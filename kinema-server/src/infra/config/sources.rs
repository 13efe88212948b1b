use std::path::PathBuf;

use kinema_core::config::IngestConfig;
use serde::{Deserialize, Serialize};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub catalog: FileCatalogConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<PathBuf>,
    pub ingest: Option<IngestConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCatalogConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_builtin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

/// A variable that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidVar {
    pub name: &'static str,
    pub value: String,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub folders: Option<Vec<PathBuf>>,
    pub catalog_seed_builtin: Option<bool>,
    pub catalog_seed_file: Option<PathBuf>,
    pub tmdb_api_key: Option<String>,
    pub tmdb_base_url: Option<String>,
    pub tmdb_language: Option<String>,
    pub scan_on_add: Option<bool>,
    pub max_parallel_hashes: Option<usize>,
    pub drain_interval_ms: Option<u64>,
    pub invalid: Vec<InvalidVar>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = Self::default();
        let mut vars = Vars {
            lookup: &lookup,
            invalid: Vec::new(),
        };

        env_config.config_path = vars.string("KINEMA_CONFIG").map(PathBuf::from);
        env_config.server_host = vars.string("KINEMA_HOST");
        env_config.server_port = vars.parsed("KINEMA_PORT");
        env_config.folders = vars.csv("KINEMA_FOLDERS").map(|folders| {
            folders.into_iter().map(PathBuf::from).collect()
        });
        env_config.catalog_seed_builtin = vars.bool("KINEMA_SEED_BUILTIN");
        env_config.catalog_seed_file =
            vars.string("KINEMA_CATALOG_FILE").map(PathBuf::from);

        env_config.tmdb_api_key = vars.string("TMDB_API_KEY");
        env_config.tmdb_base_url = vars.string("KINEMA_TMDB_BASE_URL");
        env_config.tmdb_language = vars.string("KINEMA_TMDB_LANGUAGE");

        env_config.scan_on_add = vars.bool("KINEMA_SCAN_ON_ADD");
        env_config.max_parallel_hashes = vars.parsed("KINEMA_MAX_PARALLEL_HASHES");
        env_config.drain_interval_ms = vars.parsed("KINEMA_DRAIN_INTERVAL_MS");

        env_config.invalid = vars.invalid;
        env_config
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
    invalid: Vec<InvalidVar>,
}

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank variables both count as absent.
    fn string(&mut self, name: &'static str) -> Option<String> {
        (self.lookup)(name)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&mut self, name: &'static str) -> Option<T> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.invalid.push(InvalidVar { name, value: raw });
                None
            }
        }
    }

    fn bool(&mut self, name: &'static str) -> Option<bool> {
        let raw = self.string(name)?;
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                self.invalid.push(InvalidVar { name, value: raw });
                None
            }
        }
    }

    fn csv(&mut self, name: &'static str) -> Option<Vec<String>> {
        self.string(name).map(|raw| {
            raw.split(',')
                .filter_map(|part| {
                    let trimmed = part.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                })
                .collect()
        })
    }
}
