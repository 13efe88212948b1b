//! Job scheduling for the ingestion pipeline.
//!
//! Each file moves through `hash -> identify -> resolve_movie | resolve_episode`.
//! Every hop is its own job with identity `"{kind}:{path}"`; a stage returns a
//! [`job::NextStep`] and the [`dispatcher::PipelineDispatcher`] schedules it.

pub mod dispatcher;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod runtime;

pub use dispatcher::{DispatchStatus, JobDispatcher, PipelineDispatcher};
pub use events::{JobEvent, JobEventKind, PipelineEvent, PipelineEvents, PipelineOutcome};
pub use job::{
    EnqueueRequest, JobHandle, JobId, JobIdentity, JobKind, JobPayload, JobState,
    JobTrigger, NextStep,
};
pub use orchestrator::Orchestrator;
pub use queue::{CompletionOutcome, InMemoryJobQueue, JobContext, JobLease, JobQueue};
pub use registry::{Stage, StageOutput, StageRegistry};
pub use runtime::OrchestratorRuntime;
