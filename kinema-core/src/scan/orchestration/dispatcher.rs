use std::fmt;

use async_trait::async_trait;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::events::{JobEventKind, PipelineOutcome};
use super::job::EnqueueRequest;
use super::orchestrator::Orchestrator;
use super::queue::JobLease;
use super::registry::StageRegistry;
use crate::error::MediaError;

/// Outcome of dispatcher execution for a single job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchStatus {
    Success,
    Cancelled,
    Failed { error: String },
}

/// Primary contract exposed to worker loops for executing leased jobs.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, lease: &JobLease) -> DispatchStatus;
}

/// Runs the registered stage for a job and chains its follow-up.
pub struct PipelineDispatcher {
    orchestrator: Orchestrator,
    registry: StageRegistry,
}

impl fmt::Debug for PipelineDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDispatcher")
            .field("orchestrator", &self.orchestrator)
            .field("registry", &self.registry)
            .finish()
    }
}

impl PipelineDispatcher {
    pub fn new(orchestrator: Orchestrator, registry: StageRegistry) -> Self {
        Self {
            orchestrator,
            registry,
        }
    }

    async fn run(&self, lease: &JobLease) -> DispatchStatus {
        let ctx = &lease.context;
        let payload = &lease.job.payload;
        let kind = payload.kind();
        let events = self.orchestrator.events();

        let Some(stage) = self.registry.instantiate(kind) else {
            let error = format!("no stage registered for job kind {kind}");
            error!(job_id = %ctx.job_id, "{error}");
            return self.fail(lease, error);
        };

        events.job(ctx.job_id, &ctx.identity, JobEventKind::Started);
        debug!(stage = stage.name(), "stage started");

        let output = match stage.run(ctx, payload).await {
            Ok(output) => output,
            Err(err) => return self.handle_error(lease, err),
        };

        if let Some(outcome) = output.outcome {
            info!(?outcome, "pipeline finished for file");
            events.outcome(outcome);
        }

        if let Some(next) = output.next.into_payload() {
            let next_kind = next.kind();
            // Scheduling the follow-up is a commit like any other: a job
            // deleted before this point must not leave a successor behind.
            let scheduled = ctx
                .commit(self.orchestrator.schedule(EnqueueRequest::new(next)))
                .await;
            match scheduled {
                Ok(handle) => {
                    debug!(next = %next_kind, job_id = %handle.job_id, accepted = handle.accepted, "follow-up scheduled");
                }
                Err(err) => return self.handle_error(lease, err),
            }
        }

        events.job(ctx.job_id, &ctx.identity, JobEventKind::Succeeded);
        DispatchStatus::Success
    }

    fn handle_error(&self, lease: &JobLease, err: MediaError) -> DispatchStatus {
        let ctx = &lease.context;
        if err.is_cancelled() {
            info!(job_id = %ctx.job_id, identity = %ctx.identity, "job cancelled");
            self.orchestrator
                .events()
                .job(ctx.job_id, &ctx.identity, JobEventKind::Cancelled);
            return DispatchStatus::Cancelled;
        }

        error!(
            job_id = %ctx.job_id,
            identity = %ctx.identity,
            path = %lease.job.payload.path().display(),
            stage = %lease.job.payload.kind(),
            error = %err,
            "job failed"
        );
        self.fail(lease, err.to_string())
    }

    /// Record a failed job. Also used by the runtime when a stage panics.
    pub fn fail(&self, lease: &JobLease, error: String) -> DispatchStatus {
        let ctx = &lease.context;
        let events = self.orchestrator.events();
        events.job(
            ctx.job_id,
            &ctx.identity,
            JobEventKind::Failed {
                error: error.clone(),
            },
        );
        if ctx.is_cancelled() {
            warn!(job_id = %ctx.job_id, "failure after cancellation; not reporting an outcome");
        } else {
            events.outcome(PipelineOutcome::Failed {
                path: lease.job.payload.path().to_path_buf(),
                stage: lease.job.payload.kind(),
                error: error.clone(),
            });
        }
        DispatchStatus::Failed { error }
    }
}

#[async_trait]
impl JobDispatcher for PipelineDispatcher {
    async fn dispatch(&self, lease: &JobLease) -> DispatchStatus {
        let span = info_span!(
            "job",
            job_id = %lease.job.id,
            kind = %lease.job.payload.kind(),
            path = %lease.job.payload.path().display(),
        );
        self.run(lease).instrument(span).await
    }
}
