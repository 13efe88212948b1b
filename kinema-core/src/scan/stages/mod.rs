//! Pipeline stage implementations and their registration.

pub mod hashing;
pub mod identification;
pub mod resolution;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use hashing::HashStage;
pub use identification::IdentifyStage;
pub use resolution::{ResolveEpisodeStage, ResolveMovieStage};

use crate::database::Repositories;
use crate::error::MediaError;
use crate::hashing::ContentHasher;
use crate::progress::ProgressStore;
use crate::providers::MetadataProvider;
use crate::scan::orchestration::job::{JobKind, JobPayload};
use crate::scan::orchestration::registry::StageRegistry;

pub(crate) fn unexpected_payload(stage: &str, payload: &JobPayload) -> MediaError {
    MediaError::Internal(format!(
        "{stage} stage received a {} payload",
        payload.kind()
    ))
}

/// Everything the default stages are built from.
#[derive(Clone)]
pub struct StageDeps {
    pub repos: Repositories,
    pub provider: Arc<dyn MetadataProvider>,
    pub hasher: Arc<dyn ContentHasher>,
    pub progress: Arc<ProgressStore>,
    pub progress_interval: Duration,
}

impl fmt::Debug for StageDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDeps")
            .field("hasher", &self.hasher)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

/// Registry wired with the hash, identify and resolve stages.
pub fn default_registry(deps: StageDeps) -> StageRegistry {
    let mut registry = StageRegistry::new();

    {
        let deps = deps.clone();
        registry.register(JobKind::Hash, move || {
            Box::new(HashStage::new(
                Arc::clone(&deps.repos.videos),
                Arc::clone(&deps.hasher),
                Arc::clone(&deps.progress),
                deps.progress_interval,
            ))
        });
    }
    {
        let known = Arc::clone(&deps.repos.known);
        registry.register(JobKind::Identify, move || {
            Box::new(IdentifyStage::new(Arc::clone(&known)))
        });
    }
    {
        let deps = deps.clone();
        registry.register(JobKind::ResolveMovie, move || {
            Box::new(ResolveMovieStage::new(
                deps.repos.clone(),
                Arc::clone(&deps.provider),
            ))
        });
    }
    registry.register(JobKind::ResolveEpisode, move || {
        Box::new(ResolveEpisodeStage::new(
            deps.repos.clone(),
            Arc::clone(&deps.provider),
        ))
    });

    registry
}
