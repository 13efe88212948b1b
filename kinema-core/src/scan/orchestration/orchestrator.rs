use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::events::{JobEventKind, PipelineEvents};
use super::job::{
    EnqueueRequest, HashJob, JobHandle, JobIdentity, JobKind, JobPayload, JobState,
};
use super::queue::JobQueue;
use crate::error::Result;

/// Front door to the job queue: schedules work, publishes scheduling events
/// and cancels jobs by path.
#[derive(Clone)]
pub struct Orchestrator {
    queue: Arc<dyn JobQueue>,
    events: PipelineEvents,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("queue", &self.queue)
            .field("events", &self.events)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(queue: Arc<dyn JobQueue>, events: PipelineEvents) -> Self {
        Self { queue, events }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn events(&self) -> &PipelineEvents {
        &self.events
    }

    pub async fn schedule(&self, request: EnqueueRequest) -> Result<JobHandle> {
        let handle = self.queue.schedule(request).await?;
        if handle.accepted {
            debug!(job_id = %handle.job_id, identity = %handle.identity, "job scheduled");
            self.events
                .job(handle.job_id, &handle.identity, JobEventKind::Scheduled);
        } else {
            debug!(job_id = %handle.job_id, identity = %handle.identity, "job merged into existing");
            self.events
                .job(handle.job_id, &handle.identity, JobEventKind::Merged);
        }
        Ok(handle)
    }

    /// Entry point for a file that passed the readiness gate.
    pub async fn schedule_hash(&self, path: PathBuf) -> Result<JobHandle> {
        self.schedule(EnqueueRequest::new(JobPayload::Hash(HashJob { path })))
            .await
    }

    pub async fn status(&self, kind: JobKind, path: &Path) -> Option<JobState> {
        self.queue.status(&JobIdentity::new(kind, path)).await
    }

    /// Cancel every job, at any stage, for `path`.
    pub async fn cancel_path(&self, path: &Path) -> usize {
        let removed = self.queue.delete_path(path).await;
        if removed > 0 {
            info!(path = %path.display(), removed, "cancelled jobs for removed file");
        }
        removed
    }

    /// Cancel every job for files under `prefix`.
    pub async fn cancel_under(&self, prefix: &Path) -> usize {
        let removed = self.queue.delete_under(prefix).await;
        if removed > 0 {
            info!(folder = %prefix.display(), removed, "cancelled jobs under folder");
        }
        removed
    }
}
