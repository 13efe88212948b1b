//! Pending file changes waiting to pass the readiness gate.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::orchestration::events::PipelineOutcome;
use super::orchestration::job::normalize_path;
use super::orchestration::orchestrator::Orchestrator;
use super::readiness::{Readiness, ReadinessGate};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingState {
    /// Waiting for the next drain.
    Queued,
    /// A readiness check is running for it.
    Stabilizing,
}

#[derive(Clone, Debug)]
pub struct PendingFile {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub state: PendingState,
    /// Readiness probes repeated for the current check.
    pub retries: u32,
    generation: Uuid,
    cancel: CancellationToken,
}

/// Handed out by [`ChangeQueue::take_queued`]; identifies one readiness run.
#[derive(Clone, Debug)]
pub struct PendingTicket {
    pub path: PathBuf,
    generation: Uuid,
    pub cancel: CancellationToken,
}

/// Concurrent set of detected paths. A path appears at most once, so bursts
/// of events for the same file collapse into one readiness check.
pub struct ChangeQueue {
    entries: DashMap<PathBuf, PendingFile>,
    root: CancellationToken,
}

impl fmt::Debug for ChangeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeQueue")
            .field("pending", &self.entries.len())
            .finish()
    }
}

impl ChangeQueue {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            entries: DashMap::new(),
            root,
        }
    }

    /// Record a detection. Returns false when the path is already pending.
    pub fn enqueue(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        match self.entries.entry(path.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(PendingFile {
                    path,
                    detected_at: Utc::now(),
                    state: PendingState::Queued,
                    retries: 0,
                    generation: Uuid::now_v7(),
                    cancel: self.root.child_token(),
                });
                true
            }
        }
    }

    /// Drop a pending path and stop any readiness check running for it.
    pub fn remove(&self, path: &Path) -> bool {
        match self.entries.remove(&normalize_path(path)) {
            Some((_, pending)) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove_under(&self, prefix: &Path) -> usize {
        let prefix = normalize_path(prefix);
        let doomed: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();
        doomed.iter().filter(|path| self.remove(path)).count()
    }

    /// Move every queued path to `Stabilizing` and return tickets for them.
    pub fn take_queued(&self) -> Vec<PendingTicket> {
        let mut tickets = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.state == PendingState::Queued {
                entry.state = PendingState::Stabilizing;
                tickets.push(PendingTicket {
                    path: entry.path.clone(),
                    generation: entry.generation,
                    cancel: entry.cancel.clone(),
                });
            }
        }
        tickets
    }

    /// Record the retry count of the readiness check behind `ticket`.
    pub fn record_retry(&self, ticket: &PendingTicket, retries: u32) {
        if let Some(mut pending) = self.entries.get_mut(&ticket.path) {
            if pending.generation == ticket.generation {
                pending.retries = retries;
            }
        }
    }

    /// Release the entry a ticket was issued for. A newer entry for the same
    /// path (removed and re-detected meanwhile) is left alone.
    pub fn finish(&self, ticket: &PendingTicket) {
        self.entries
            .remove_if(&ticket.path, |_, pending| pending.generation == ticket.generation);
    }

    pub fn get(&self, path: &Path) -> Option<PendingFile> {
        self.entries.get(&normalize_path(path)).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically moves queued paths through the readiness gate into the job
/// queue.
#[derive(Clone)]
pub struct ChangeQueueDrainer {
    queue: Arc<ChangeQueue>,
    gate: ReadinessGate,
    orchestrator: Orchestrator,
}

impl fmt::Debug for ChangeQueueDrainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeQueueDrainer")
            .field("queue", &self.queue)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl ChangeQueueDrainer {
    pub fn new(queue: Arc<ChangeQueue>, gate: ReadinessGate, orchestrator: Orchestrator) -> Self {
        Self {
            queue,
            gate,
            orchestrator,
        }
    }

    /// Start a readiness check for every queued path.
    pub fn drain_once(&self) -> Vec<JoinHandle<()>> {
        let tickets = self.queue.take_queued();
        if !tickets.is_empty() {
            debug!(count = tickets.len(), "draining pending changes");
        }
        tickets
            .into_iter()
            .map(|ticket| {
                let this = self.clone();
                tokio::spawn(async move { this.settle(ticket).await })
            })
            .collect()
    }

    async fn settle(&self, ticket: PendingTicket) {
        let path = ticket.path.clone();
        let readiness = self
            .gate
            .wait_with(&path, &ticket.cancel, |retries| {
                self.queue.record_retry(&ticket, retries)
            })
            .await;
        match readiness {
            Readiness::Ready { size } if !ticket.cancel.is_cancelled() => {
                self.schedule_ready(&ticket, size).await;
            }
            Readiness::Ready { .. } | Readiness::Cancelled => {
                debug!(path = %path.display(), "readiness check cancelled");
            }
            Readiness::Abandoned { reason } => {
                let retries = self.queue.get(&path).map_or(0, |pending| pending.retries);
                warn!(path = %path.display(), %reason, retries, "file abandoned before hashing");
                self.orchestrator
                    .events()
                    .outcome(PipelineOutcome::Abandoned { path, reason });
            }
        }
        self.queue.finish(&ticket);
    }

    /// Hand a settled file to the job queue. The ticket may be cancelled
    /// while scheduling is in flight (its folder was removed); the job is
    /// withdrawn again in that case.
    async fn schedule_ready(&self, ticket: &PendingTicket, size: u64) {
        let path = &ticket.path;
        let handle = match self.orchestrator.schedule_hash(path.clone()).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not schedule hashing");
                return;
            }
        };
        if ticket.cancel.is_cancelled() {
            let withdrawn = self.orchestrator.cancel_path(path).await;
            debug!(path = %path.display(), withdrawn, "file removed while scheduling");
            return;
        }
        info!(path = %path.display(), size, job_id = %handle.job_id, accepted = handle.accepted, "file ready for hashing");
    }

    /// Drain on a fixed interval until `shutdown` fires.
    pub async fn run(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.drain_once();
                }
            }
        }
        debug!("change queue drain loop stopped");
    }
}
