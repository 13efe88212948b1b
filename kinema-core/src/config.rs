use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global knobs for the ingestion pipeline.
///
/// Every section carries defaults so a deployment only needs to override the
/// values it cares about (usually just the provider API key).
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IngestConfig {
    /// Filesystem watch restart policy and initial scan behaviour.
    pub watch: WatchConfig,
    /// Polling cadence for the file readiness gate.
    pub readiness: ReadinessConfig,
    /// Pending change queue drain cadence.
    pub queue: ChangeQueueConfig,
    /// Worker pool sizes per job kind.
    pub workers: WorkerConfig,
    /// Content hashing buffer and progress reporting.
    pub hashing: HashingConfig,
    /// Metadata provider endpoint and credentials.
    pub provider: ProviderConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Delay before re-establishing a watch that reported an error.
    pub restart_backoff_ms: u64,
    /// Consecutive restart attempts before a folder watch is declared failed.
    pub max_restart_attempts: u32,
    /// Walk a folder once when it is registered so pre-existing files are
    /// ingested too.
    pub scan_on_add: bool,
    /// Lowercase file extensions (without the dot) treated as video files.
    pub video_extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            restart_backoff_ms: 1_000,
            max_restart_attempts: 10,
            scan_on_add: true,
            video_extensions: [
                "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v",
                "mpg", "mpeg", "ts", "m2ts", "ogm", "ogv", "divx", "rmvb",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl WatchConfig {
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    pub fn is_video_file(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.video_extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Delay between attempts to open a file that is still locked or growing.
    pub retry_delay_ms: u64,
    /// Overall wall clock limit before a file is abandoned.
    pub timeout_secs: u64,
    /// Attempts at reading file metadata before giving up.
    pub info_retry_count: u32,
    /// Delay between metadata attempts.
    pub info_retry_delay_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1_000,
            timeout_secs: 300,
            info_retry_count: 5,
            info_retry_delay_ms: 2_000,
        }
    }
}

impl ReadinessConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn info_retry_delay(&self) -> Duration {
        Duration::from_millis(self.info_retry_delay_ms)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeQueueConfig {
    /// Interval between drains of the pending change queue.
    pub drain_interval_ms: u64,
}

impl Default for ChangeQueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: 5_000,
        }
    }
}

impl ChangeQueueConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum worker concurrency per job kind.
    pub max_parallel_hashes: usize,
    pub max_parallel_identify: usize,
    pub max_parallel_metadata: usize,
    /// Capacity of the pipeline event broadcast channel.
    pub event_channel_capacity: usize,
    /// Upper bound on how long an idle worker sleeps before re-checking for
    /// delayed jobs.
    pub idle_poll_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_parallel_hashes: 2,
            max_parallel_identify: 4,
            max_parallel_metadata: 4,
            event_channel_capacity: 256,
            idle_poll_ms: 250,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Size of each read from disk while hashing.
    pub read_buffer_bytes: usize,
    /// Minimum interval between progress updates for one job.
    pub progress_interval_ms: u64,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 1024 * 1024,
            progress_interval_ms: 1_000,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// TMDB v3 API key or v4 read access token.
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    /// ISO 3166-1 country used when picking a certification.
    pub certification_country: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.themoviedb.org/3".to_string(),
            language: "en-US".to_string(),
            certification_country: "US".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("certification_country", &self.certification_country)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn video_extension_filter_is_case_insensitive() {
        let watch = WatchConfig::default();
        assert!(watch.is_video_file(Path::new("/m/Alien.MKV")));
        assert!(watch.is_video_file(Path::new("/m/alien.mp4")));
        assert!(!watch.is_video_file(Path::new("/m/alien.srt")));
        assert!(!watch.is_video_file(Path::new("/m/alien")));
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let cfg: IngestConfig =
            serde_json::from_str(r#"{"provider":{"api_key":"k"},"workers":{"max_parallel_hashes":1}}"#)
                .unwrap();
        assert_eq!(cfg.provider.api_key, "k");
        assert_eq!(cfg.provider.language, "en-US");
        assert_eq!(cfg.workers.max_parallel_hashes, 1);
        assert_eq!(cfg.workers.max_parallel_identify, 4);
        assert_eq!(cfg.readiness.timeout_secs, 300);
    }

    #[test]
    fn provider_debug_redacts_key() {
        let cfg = ProviderConfig {
            api_key: "secret".into(),
            ..Default::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("secret"));
    }
}
