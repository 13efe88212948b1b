use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::job::{
    EnqueueRequest, JobHandle, JobId, JobIdentity, JobKind, JobRecord, JobState,
};
use crate::error::{MediaError, Result};

const MAX_DELETE_SWEEPS: usize = 8;

/// Result a worker reports once a leased job stops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed,
    Failed { error: String },
    Cancelled,
}

/// Per-job handle passed to stages: cancellation plus the commit gate.
///
/// Deleting a job takes the gate before cancelling, and [`JobContext::commit`]
/// takes the same gate and re-checks cancellation before writing. A write is
/// therefore either fully visible before the delete returns or never happens.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub identity: JobIdentity,
    cancel: CancellationToken,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("identity", &self.identity)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl JobContext {
    fn new(job_id: JobId, identity: JobIdentity, cancel: CancellationToken) -> Self {
        Self {
            job_id,
            identity,
            cancel,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Standalone context, for driving a stage outside the queue.
    pub fn detached(identity: JobIdentity) -> Self {
        Self::new(JobId::new(), identity, CancellationToken::new())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` if the job has been cancelled.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MediaError::Cancelled(self.identity.to_string()));
        }
        Ok(())
    }

    /// Run `fut` unless or until the job is cancelled.
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<MediaError>,
    {
        self.checkpoint()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(MediaError::Cancelled(self.identity.to_string()))
            }
            result = fut => result.map_err(Into::into),
        }
    }

    /// Perform a persistence write under the commit gate.
    pub async fn commit<F, T>(&self, write: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _gate = self.gate.lock().await;
        self.checkpoint()?;
        write.await
    }
}

/// A job handed to a worker.
#[derive(Clone, Debug)]
pub struct JobLease {
    pub job: JobRecord,
    pub context: JobContext,
}

/// Scheduling substrate for pipeline jobs.
#[async_trait]
pub trait JobQueue: Send + Sync + fmt::Debug {
    /// Schedule a job. A request whose identity matches a scheduled or running
    /// job is merged into it and reported with `accepted == false`.
    async fn schedule(&self, request: EnqueueRequest) -> Result<JobHandle>;

    /// Take the next eligible job of `kind`, if any.
    async fn lease(&self, kind: JobKind) -> Option<JobLease>;

    /// Wait until work of `kind` may be available or `max_wait` elapses.
    async fn wait_for_work(&self, kind: JobKind, max_wait: Duration);

    async fn complete(&self, job_id: JobId, identity: &JobIdentity, outcome: CompletionOutcome);

    async fn status(&self, identity: &JobIdentity) -> Option<JobState>;

    /// Cancel and remove the job with `identity`. Returns once any in-flight
    /// commit of that job has finished.
    async fn delete(&self, identity: &JobIdentity) -> bool;

    /// Cancel and remove every job whose path equals `path`.
    async fn delete_path(&self, path: &Path) -> usize;

    /// Cancel and remove every job whose path lies under `prefix`.
    async fn delete_under(&self, prefix: &Path) -> usize;

    async fn len(&self) -> usize;
}

struct JobEntry {
    record: JobRecord,
    context: JobContext,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobIdentity, JobEntry>,
    ready: HashMap<JobKind, VecDeque<JobIdentity>>,
}

/// Process-local [`JobQueue`]. Per-job cancellation tokens are children of
/// the queue's root token, so cancelling the root stops every job.
pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    wakers: HashMap<JobKind, Arc<Notify>>,
    root: CancellationToken,
}

impl fmt::Debug for InMemoryJobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryJobQueue")
            .field("jobs", &state.jobs.len())
            .field("root_cancelled", &self.root.is_cancelled())
            .finish()
    }
}

impl InMemoryJobQueue {
    pub fn new(root: CancellationToken) -> Self {
        let wakers = JobKind::ALL
            .into_iter()
            .map(|kind| (kind, Arc::new(Notify::new())))
            .collect();
        Self {
            state: Mutex::new(QueueState::default()),
            wakers,
            root,
        }
    }

    fn wake(&self, kind: JobKind) {
        if let Some(waker) = self.wakers.get(&kind) {
            waker.notify_one();
        }
    }

    fn matching(&self, predicate: impl Fn(&JobIdentity) -> bool) -> Vec<JobIdentity> {
        self.state
            .lock()
            .jobs
            .keys()
            .filter(|identity| predicate(identity))
            .cloned()
            .collect()
    }

    /// Deleting a job can race with that job committing its follow-up under
    /// the same path, so sweep until a pass finds nothing left to remove.
    async fn delete_matching(&self, predicate: impl Fn(&JobIdentity) -> bool + Send + Sync) -> usize {
        let mut removed = 0;
        for _ in 0..MAX_DELETE_SWEEPS {
            let batch = self.matching(&predicate);
            if batch.is_empty() {
                break;
            }
            let mut progressed = false;
            for identity in batch {
                if self.delete(&identity).await {
                    removed += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        removed
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn schedule(&self, request: EnqueueRequest) -> Result<JobHandle> {
        if self.root.is_cancelled() {
            return Err(MediaError::Cancelled("job queue is shutting down".into()));
        }

        let record = JobRecord::new(request.payload, request.trigger);
        let identity = record.identity.clone();
        let kind = identity.kind;

        {
            let mut state = self.state.lock();
            if let Some(existing) = state.jobs.get(&identity) {
                return Ok(JobHandle::merged(existing.record.id, identity));
            }

            let context = JobContext::new(
                record.id,
                identity.clone(),
                self.root.child_token(),
            );
            let job_id = record.id;
            state.jobs.insert(identity.clone(), JobEntry { record, context });
            state.ready.entry(kind).or_default().push_back(identity.clone());
            drop(state);

            self.wake(kind);
            Ok(JobHandle::accepted(job_id, identity))
        }
    }

    async fn lease(&self, kind: JobKind) -> Option<JobLease> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let state = &mut *state;

        let ready = state.ready.get_mut(&kind)?;
        let position = ready.iter().position(|identity| {
            state
                .jobs
                .get(identity)
                .is_some_and(|entry| entry.record.available_at <= now)
        })?;
        let identity = ready.remove(position)?;
        let entry = state.jobs.get_mut(&identity)?;

        entry.record.state = JobState::Running;
        entry.record.updated_at = now;
        Some(JobLease {
            job: entry.record.clone(),
            context: entry.context.clone(),
        })
    }

    async fn wait_for_work(&self, kind: JobKind, max_wait: Duration) {
        match self.wakers.get(&kind) {
            Some(waker) => {
                let _ = tokio::time::timeout(max_wait, waker.notified()).await;
            }
            None => tokio::time::sleep(max_wait).await,
        }
    }

    async fn complete(
        &self,
        job_id: JobId,
        identity: &JobIdentity,
        _outcome: CompletionOutcome,
    ) {
        let mut state = self.state.lock();
        if state
            .jobs
            .get(identity)
            .is_some_and(|entry| entry.record.id == job_id)
        {
            state.jobs.remove(identity);
        }
    }

    async fn status(&self, identity: &JobIdentity) -> Option<JobState> {
        self.state
            .lock()
            .jobs
            .get(identity)
            .map(|entry| entry.record.state)
    }

    async fn delete(&self, identity: &JobIdentity) -> bool {
        let Some(context) = self
            .state
            .lock()
            .jobs
            .get(identity)
            .map(|entry| entry.context.clone())
        else {
            return false;
        };

        let _gate = context.gate.lock().await;
        context.cancel.cancel();

        let mut state = self.state.lock();
        let state = &mut *state;
        let removed = state
            .jobs
            .get(identity)
            .is_some_and(|entry| entry.record.id == context.job_id);
        if removed {
            state.jobs.remove(identity);
            if let Some(ready) = state.ready.get_mut(&identity.kind) {
                ready.retain(|queued| queued != identity);
            }
        }
        removed
    }

    async fn delete_path(&self, path: &Path) -> usize {
        let target = super::job::normalize_path(path);
        self.delete_matching(|identity| identity.path == target).await
    }

    async fn delete_under(&self, prefix: &Path) -> usize {
        let prefix = super::job::normalize_path(prefix);
        self.delete_matching(|identity| identity.is_under(&prefix)).await
    }

    async fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }
}
