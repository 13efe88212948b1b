use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use super::unexpected_payload;
use crate::database::ports::VideoRepository;
use crate::error::{MediaError, Result};
use crate::hashing::ContentHasher;
use crate::progress::ProgressStore;
use crate::scan::orchestration::job::{IdentifyJob, JobId, JobPayload, NextStep};
use crate::scan::orchestration::queue::JobContext;
use crate::scan::orchestration::registry::{Stage, StageOutput};
use crate::types::VideoRecord;

/// Streams the file once through every digest, records the content under
/// its ED2K hash and hands off to identification.
pub struct HashStage {
    videos: Arc<dyn VideoRepository>,
    hasher: Arc<dyn ContentHasher>,
    progress: Arc<ProgressStore>,
    progress_interval: Duration,
}

impl HashStage {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        hasher: Arc<dyn ContentHasher>,
        progress: Arc<ProgressStore>,
        progress_interval: Duration,
    ) -> Self {
        Self {
            videos,
            hasher,
            progress,
            progress_interval,
        }
    }
}

/// Marks the progress entry finished however the stage exits.
struct ProgressFinish<'a> {
    store: &'a ProgressStore,
    job_id: JobId,
}

impl Drop for ProgressFinish<'_> {
    fn drop(&mut self) {
        self.store.finish(self.job_id);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait]
impl Stage for HashStage {
    fn name(&self) -> &'static str {
        "hash"
    }

    async fn run(&self, ctx: &JobContext, payload: &JobPayload) -> Result<StageOutput> {
        let JobPayload::Hash(job) = payload else {
            return Err(unexpected_payload(self.name(), payload));
        };
        ctx.checkpoint()?;

        let file_size = tokio::fs::metadata(&job.path).await?.len();
        let filename = display_name(&job.path);
        let job_id = ctx.job_id;

        self.progress.update(job_id, filename.clone(), 0.0);
        let _finish = ProgressFinish {
            store: &self.progress,
            job_id,
        };

        let digests = {
            let hasher = Arc::clone(&self.hasher);
            let progress = Arc::clone(&self.progress);
            let cancel = ctx.cancellation().clone();
            let path = job.path.clone();
            let interval = self.progress_interval;

            tokio::task::spawn_blocking(move || {
                let mut last_report = Instant::now();
                hasher.hash_file(&path, &cancel, &mut |done, total| {
                    let finished = done >= total;
                    if finished || last_report.elapsed() >= interval {
                        let percent = if total == 0 {
                            100.0
                        } else {
                            (done as f64 / total as f64 * 100.0) as f32
                        };
                        progress.update(job_id, filename.clone(), percent);
                        last_report = Instant::now();
                    }
                })
            })
            .await
            .map_err(|err| MediaError::Internal(format!("hashing task failed: {err}")))??
        };
        debug!(ed2k = %digests.ed2k, crc32 = %digests.crc32, "digests computed");

        let hash = digests.ed2k.clone();
        let record = VideoRecord::unrecognized(digests, file_size, job.path.clone());
        let stored = ctx.commit(self.videos.upsert_video(record)).await?;
        info!(hash = %hash, size = file_size, recognized = stored.recognized, "video hashed");

        Ok(StageOutput::next(NextStep::Identify(IdentifyJob {
            path: job.path.clone(),
            hash,
        })))
    }
}
