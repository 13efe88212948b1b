use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::job::{JobId, JobIdentity, JobKind};
use crate::types::{MediaLink, VideoHash};

/// Lifecycle transitions of a single job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Scheduled,
    /// A schedule request collided with an existing job and was dropped.
    Merged,
    Started,
    Succeeded,
    Failed { error: String },
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub identity: JobIdentity,
    pub kind: JobEventKind,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: JobId, identity: JobIdentity, kind: JobEventKind) -> Self {
        Self {
            job_id,
            identity,
            kind,
            at: Utc::now(),
        }
    }
}

/// Terminal result of running one file through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Recognized {
        path: PathBuf,
        hash: VideoHash,
        media: MediaLink,
    },
    Unrecognized {
        path: PathBuf,
        hash: VideoHash,
    },
    Failed {
        path: PathBuf,
        stage: JobKind,
        error: String,
    },
    Abandoned {
        path: PathBuf,
        reason: String,
    },
}

impl PipelineOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            PipelineOutcome::Recognized { path, .. }
            | PipelineOutcome::Unrecognized { path, .. }
            | PipelineOutcome::Failed { path, .. }
            | PipelineOutcome::Abandoned { path, .. } => path,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Job(JobEvent),
    Outcome(PipelineOutcome),
    WatchFailed { folder: PathBuf, error: String },
}

/// In-process fan-out of pipeline notifications. Publishing never blocks and
/// never fails; events sent with no subscribers are dropped.
#[derive(Clone)]
pub struct PipelineEvents {
    sender: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl fmt::Debug for PipelineEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEvents")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl PipelineEvents {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn job(&self, job_id: JobId, identity: &JobIdentity, kind: JobEventKind) {
        self.publish(PipelineEvent::Job(JobEvent::new(
            job_id,
            identity.clone(),
            kind,
        )));
    }

    pub fn outcome(&self, outcome: PipelineOutcome) {
        self.publish(PipelineEvent::Outcome(outcome));
    }
}
