//! Waits until a detected file is complete enough to hash.
//!
//! A file is ready once it can be opened for shared reading, has a non-zero
//! length, and two consecutive observations agree on its size and
//! modification time. Copy tools on Linux do not hold exclusive locks, so the
//! stability check is what catches a file that is still being written.

use std::path::Path;
use std::time::SystemTime;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ReadinessConfig;

/// Result of waiting on a file. `Abandoned` is a value, not an error: the
/// caller drops the file without it counting as a pipeline failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready { size: u64 },
    Abandoned { reason: String },
    Cancelled,
}

#[derive(Debug)]
enum Probe {
    InfoUnavailable(String),
    Empty,
    NotAFile,
    Locked(String),
    Open { size: u64, modified: Option<SystemTime> },
}

async fn probe(path: &Path) -> Probe {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) => return Probe::InfoUnavailable(err.to_string()),
    };
    if !metadata.is_file() {
        return Probe::NotAFile;
    }
    if metadata.len() == 0 {
        return Probe::Empty;
    }

    match tokio::fs::File::open(path).await {
        Ok(_) => Probe::Open {
            size: metadata.len(),
            modified: metadata.modified().ok(),
        },
        Err(err) => Probe::Locked(err.to_string()),
    }
}

#[derive(Clone, Debug)]
pub struct ReadinessGate {
    config: ReadinessConfig,
}

impl ReadinessGate {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    pub async fn wait(&self, path: &Path, cancel: &CancellationToken) -> Readiness {
        self.wait_with(path, cancel, |_| {}).await
    }

    /// Like [`Self::wait`], calling `on_retry` with the running retry count
    /// each time another probe is scheduled.
    pub async fn wait_with<F>(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        mut on_retry: F,
    ) -> Readiness
    where
        F: FnMut(u32),
    {
        let deadline = Instant::now() + self.config.timeout();
        let mut info_failures: u32 = 0;
        let mut retries: u32 = 0;
        let mut last_seen: Option<(u64, Option<SystemTime>)> = None;

        loop {
            if cancel.is_cancelled() {
                return Readiness::Cancelled;
            }

            let delay = match probe(path).await {
                Probe::NotAFile => {
                    return Readiness::Abandoned {
                        reason: "not a regular file".into(),
                    };
                }
                Probe::InfoUnavailable(_) | Probe::Empty
                    if info_failures >= self.config.info_retry_count =>
                {
                    warn!(path = %path.display(), attempts = info_failures + 1, "file information unavailable, abandoning");
                    return Readiness::Abandoned {
                        reason: format!(
                            "file information unavailable after {} attempts",
                            info_failures + 1
                        ),
                    };
                }
                Probe::InfoUnavailable(err) => {
                    info_failures += 1;
                    debug!(path = %path.display(), error = %err, "file info unavailable, retrying");
                    self.config.info_retry_delay()
                }
                Probe::Empty => {
                    info_failures += 1;
                    debug!(path = %path.display(), "file is empty, retrying");
                    self.config.info_retry_delay()
                }
                Probe::Locked(err) => {
                    if Instant::now() >= deadline {
                        warn!(path = %path.display(), error = %err, "file still locked at timeout, abandoning");
                        return Readiness::Abandoned {
                            reason: format!("file still locked after timeout: {err}"),
                        };
                    }
                    self.config.retry_delay()
                }
                Probe::Open { size, modified } => {
                    if last_seen == Some((size, modified)) {
                        return Readiness::Ready { size };
                    }
                    if Instant::now() >= deadline {
                        warn!(path = %path.display(), size, "file still changing at timeout, abandoning");
                        return Readiness::Abandoned {
                            reason: "file still changing after timeout".into(),
                        };
                    }
                    last_seen = Some((size, modified));
                    self.config.retry_delay()
                }
            };

            retries += 1;
            on_retry(retries);
            tokio::select! {
                _ = cancel.cancelled() => return Readiness::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_gate() -> ReadinessGate {
        ReadinessGate::new(ReadinessConfig {
            retry_delay_ms: 10,
            timeout_secs: 5,
            info_retry_count: 2,
            info_retry_delay_ms: 10,
        })
    }

    #[tokio::test]
    async fn complete_file_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mkv");
        std::fs::write(&path, b"0123456789").unwrap();

        let outcome = fast_gate().wait(&path, &CancellationToken::new()).await;
        assert_eq!(outcome, Readiness::Ready { size: 10 });
    }

    #[tokio::test]
    async fn missing_file_is_abandoned_after_info_retries() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = fast_gate()
            .wait(&dir.path().join("gone.mkv"), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, Readiness::Abandoned { .. }));
    }

    #[tokio::test]
    async fn empty_file_that_gets_content_becomes_ready() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copying.mkv");
        std::fs::write(&path, b"").unwrap();

        let gate = ReadinessGate::new(ReadinessConfig {
            retry_delay_ms: 10,
            timeout_secs: 5,
            info_retry_count: 50,
            info_retry_delay_ms: 10,
        });
        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                tokio::fs::write(&path, b"payload").await.unwrap();
            })
        };

        let outcome = gate.wait(&path, &CancellationToken::new()).await;
        writer.await.unwrap();
        assert_eq!(outcome, Readiness::Ready { size: 7 });
    }

    #[tokio::test]
    async fn retries_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mkv");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut seen = Vec::new();
        let outcome = fast_gate()
            .wait_with(&path, &CancellationToken::new(), |retries| seen.push(retries))
            .await;
        assert_eq!(outcome, Readiness::Ready { size: 10 });
        // The first probe only records size and mtime; the second confirms.
        assert_eq!(seen, vec![1]);
    }

    #[tokio::test]
    async fn directories_are_abandoned() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = fast_gate().wait(dir.path(), &CancellationToken::new()).await;
        assert_eq!(
            outcome,
            Readiness::Abandoned {
                reason: "not a regular file".into()
            }
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mkv");
        std::fs::write(&path, b"").unwrap();

        let gate = ReadinessGate::new(ReadinessConfig {
            info_retry_delay_ms: 60_000,
            ..ReadinessConfig::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            gate.wait(&path, &cancel),
        )
        .await
        .expect("cancellation should end the wait");
        assert_eq!(outcome, Readiness::Cancelled);
    }
}
