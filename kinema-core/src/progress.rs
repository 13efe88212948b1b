//! Hashing progress registry shared between hashing jobs and API readers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::scan::orchestration::job::JobId;

/// Latest progress reported by one hashing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub job_id: JobId,
    pub filename: String,
    /// Percentage in `0.0..=100.0`.
    pub percent: f32,
    /// Set once the job stopped, whether it completed, failed or was
    /// cancelled. Finished entries stay readable until deleted.
    pub finished: bool,
    pub updated_at: DateTime<Utc>,
}

/// Concurrent map of job id to progress. Constructed once and injected into
/// the components that need it.
#[derive(Debug, Default)]
pub struct ProgressStore {
    entries: DashMap<JobId, ProgressEntry>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the progress for `job_id`.
    pub fn update(&self, job_id: JobId, filename: impl Into<String>, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        self.entries.insert(
            job_id,
            ProgressEntry {
                job_id,
                filename: filename.into(),
                percent,
                finished: false,
                updated_at: Utc::now(),
            },
        );
    }

    /// Mark the job as no longer running while keeping its last reading.
    pub fn finish(&self, job_id: JobId) {
        if let Some(mut entry) = self.entries.get_mut(&job_id) {
            entry.finished = true;
            entry.updated_at = Utc::now();
        }
    }

    pub fn get(&self, job_id: JobId) -> Option<ProgressEntry> {
        self.entries.get(&job_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, job_id: JobId) -> bool {
        self.entries.remove(&job_id).is_some()
    }

    /// Job ids whose hashing is still running.
    pub fn list_active(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .entries
            .iter()
            .filter(|entry| !entry.finished)
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    pub fn has_active(&self) -> bool {
        self.entries.iter().any(|entry| !entry.finished)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
