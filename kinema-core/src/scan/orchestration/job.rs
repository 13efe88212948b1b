use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MediaError;
use crate::types::VideoHash;

/// Unique identifier for pipeline jobs. Also keys hashing progress.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|_| MediaError::InvalidMedia(format!("invalid job id '{s}'")))
    }
}

/// Scheduler-visible job states. Finished jobs leave the queue entirely.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Scheduled,
    Running,
}

/// The pipeline stages, one worker pool each.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Hash,
    Identify,
    ResolveMovie,
    ResolveEpisode,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Hash,
        JobKind::Identify,
        JobKind::ResolveMovie,
        JobKind::ResolveEpisode,
    ];
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Hash => write!(f, "hash"),
            JobKind::Identify => write!(f, "identify"),
            JobKind::ResolveMovie => write!(f, "resolve_movie"),
            JobKind::ResolveEpisode => write!(f, "resolve_episode"),
        }
    }
}

impl FromStr for JobKind {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hash" => Ok(JobKind::Hash),
            "identify" => Ok(JobKind::Identify),
            "resolve_movie" => Ok(JobKind::ResolveMovie),
            "resolve_episode" => Ok(JobKind::ResolveEpisode),
            other => Err(MediaError::InvalidMedia(format!(
                "unknown job kind '{other}'"
            ))),
        }
    }
}

/// Normalize a file path for identity purposes without touching the
/// filesystem (the file may already be gone). Drops `.` components and
/// resolves `..` lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `"{kind}:{normalized path}"`. At most one scheduled or running job exists
/// per identity.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobIdentity {
    pub kind: JobKind,
    pub path: PathBuf,
}

impl JobIdentity {
    pub fn new(kind: JobKind, path: &Path) -> Self {
        Self {
            kind,
            path: normalize_path(path),
        }
    }

    /// Component-wise prefix test, so `/media/tv` does not match
    /// `/media/tvshows/x.mkv`.
    pub fn is_under(&self, prefix: &Path) -> bool {
        self.path.starts_with(normalize_path(prefix))
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path.display())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashJob {
    pub path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyJob {
    pub path: PathBuf,
    pub hash: VideoHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveMovieJob {
    pub path: PathBuf,
    pub hash: VideoHash,
    pub tmdb_id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveEpisodeJob {
    pub path: PathBuf,
    pub hash: VideoHash,
    pub show_tmdb_id: u64,
    pub season: u32,
    pub episode: u32,
}

/// Structured payload per job kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum JobPayload {
    Hash(HashJob),
    Identify(IdentifyJob),
    ResolveMovie(ResolveMovieJob),
    ResolveEpisode(ResolveEpisodeJob),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Hash(_) => JobKind::Hash,
            JobPayload::Identify(_) => JobKind::Identify,
            JobPayload::ResolveMovie(_) => JobKind::ResolveMovie,
            JobPayload::ResolveEpisode(_) => JobKind::ResolveEpisode,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            JobPayload::Hash(job) => &job.path,
            JobPayload::Identify(job) => &job.path,
            JobPayload::ResolveMovie(job) => &job.path,
            JobPayload::ResolveEpisode(job) => &job.path,
        }
    }

    pub fn identity(&self) -> JobIdentity {
        JobIdentity::new(self.kind(), self.path())
    }
}

/// When a scheduled job becomes eligible for a worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JobTrigger {
    #[default]
    Immediate,
    After(Duration),
    At(DateTime<Utc>),
}

impl JobTrigger {
    pub fn available_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            JobTrigger::Immediate => now,
            JobTrigger::After(delay) => {
                now + chrono::Duration::from_std(*delay)
                    .unwrap_or(chrono::Duration::zero())
            }
            JobTrigger::At(at) => *at,
        }
    }
}

/// Request to schedule a job.
#[derive(Clone, Debug)]
pub struct EnqueueRequest {
    pub payload: JobPayload,
    pub trigger: JobTrigger,
}

impl EnqueueRequest {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            trigger: JobTrigger::Immediate,
        }
    }

    pub fn with_trigger(mut self, trigger: JobTrigger) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Envelope kept by the queue for each job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub identity: JobIdentity,
    pub payload: JobPayload,
    pub state: JobState,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(payload: JobPayload, trigger: JobTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            identity: payload.identity(),
            payload,
            state: JobState::Scheduled,
            available_at: trigger.available_at(now),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Returned when scheduling a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub identity: JobIdentity,
    /// False when an equivalent job was already scheduled or running and
    /// this request was merged into it.
    pub accepted: bool,
}

impl JobHandle {
    pub fn accepted(job_id: JobId, identity: JobIdentity) -> Self {
        Self {
            job_id,
            identity,
            accepted: true,
        }
    }

    pub fn merged(job_id: JobId, identity: JobIdentity) -> Self {
        Self {
            job_id,
            identity,
            accepted: false,
        }
    }
}

/// The follow-up a completed stage asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NextStep {
    None,
    Identify(IdentifyJob),
    ResolveMovie(ResolveMovieJob),
    ResolveEpisode(ResolveEpisodeJob),
}

impl NextStep {
    pub fn into_payload(self) -> Option<JobPayload> {
        match self {
            NextStep::None => None,
            NextStep::Identify(job) => Some(JobPayload::Identify(job)),
            NextStep::ResolveMovie(job) => Some(JobPayload::ResolveMovie(job)),
            NextStep::ResolveEpisode(job) => Some(JobPayload::ResolveEpisode(job)),
        }
    }
}
