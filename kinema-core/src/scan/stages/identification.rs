use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::unexpected_payload;
use crate::database::ports::KnownHashRepository;
use crate::error::Result;
use crate::scan::orchestration::events::PipelineOutcome;
use crate::scan::orchestration::job::{
    JobPayload, NextStep, ResolveEpisodeJob, ResolveMovieJob,
};
use crate::scan::orchestration::queue::JobContext;
use crate::scan::orchestration::registry::{Stage, StageOutput};
use crate::types::KnownMedia;

/// Looks the hash up in the known-hash catalog.
pub struct IdentifyStage {
    known: Arc<dyn KnownHashRepository>,
}

impl IdentifyStage {
    pub fn new(known: Arc<dyn KnownHashRepository>) -> Self {
        Self { known }
    }
}

#[async_trait]
impl Stage for IdentifyStage {
    fn name(&self) -> &'static str {
        "identify"
    }

    async fn run(&self, ctx: &JobContext, payload: &JobPayload) -> Result<StageOutput> {
        let JobPayload::Identify(job) = payload else {
            return Err(unexpected_payload(self.name(), payload));
        };
        ctx.checkpoint()?;

        let Some(entry) = self.known.lookup(&job.hash).await? else {
            info!(hash = %job.hash, "hash not in catalog");
            return Ok(StageOutput::terminal(PipelineOutcome::Unrecognized {
                path: job.path.clone(),
                hash: job.hash.clone(),
            }));
        };

        info!(hash = %job.hash, kind = %entry.media.media_kind(), "catalog match");
        let next = match entry.media {
            KnownMedia::Movie { tmdb_id } => NextStep::ResolveMovie(ResolveMovieJob {
                path: job.path.clone(),
                hash: job.hash.clone(),
                tmdb_id,
            }),
            KnownMedia::Episode {
                show_tmdb_id,
                season,
                episode,
            } => NextStep::ResolveEpisode(ResolveEpisodeJob {
                path: job.path.clone(),
                hash: job.hash.clone(),
                show_tmdb_id,
                season,
                episode,
            }),
        };
        Ok(StageOutput::next(next))
    }
}
