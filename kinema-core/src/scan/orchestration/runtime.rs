use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::dispatcher::{DispatchStatus, JobDispatcher, PipelineDispatcher};
use super::job::JobKind;
use super::queue::{CompletionOutcome, JobQueue};
use crate::config::WorkerConfig;

/// Worker pools, one per job kind, pulling from the shared queue.
pub struct OrchestratorRuntime {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<PipelineDispatcher>,
    workers: WorkerConfig,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for OrchestratorRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorRuntime")
            .field("workers", &self.workers)
            .field("running_workers", &self.handles.lock().len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl OrchestratorRuntime {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dispatcher: Arc<PipelineDispatcher>,
        workers: WorkerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            workers,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    fn pool_size(&self, kind: JobKind) -> usize {
        let size = match kind {
            JobKind::Hash => self.workers.max_parallel_hashes,
            JobKind::Identify => self.workers.max_parallel_identify,
            JobKind::ResolveMovie | JobKind::ResolveEpisode => {
                self.workers.max_parallel_metadata
            }
        };
        size.max(1)
    }

    /// Spawn every worker pool. Calling this twice is a no-op.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }

        for kind in JobKind::ALL {
            let size = self.pool_size(kind);
            for worker in 0..size {
                handles.push(tokio::spawn(worker_loop(
                    kind,
                    worker,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.dispatcher),
                    self.shutdown.clone(),
                    Duration::from_millis(self.workers.idle_poll_ms.max(1)),
                )));
            }
            debug!(%kind, size, "worker pool started");
        }
        info!(workers = handles.len(), "orchestrator runtime started");
    }

    /// Cancel every job and wait for the workers to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task ended abnormally");
            }
        }
        info!("orchestrator runtime stopped");
    }
}

async fn worker_loop(
    kind: JobKind,
    worker: usize,
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<PipelineDispatcher>,
    shutdown: CancellationToken,
    idle_poll: Duration,
) {
    debug!(%kind, worker, "worker online");
    while !shutdown.is_cancelled() {
        let Some(lease) = queue.lease(kind).await else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = queue.wait_for_work(kind, idle_poll) => {}
            }
            continue;
        };

        // The stage runs in its own task so a panic is contained to this job.
        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            let lease = lease.clone();
            tokio::spawn(async move { dispatcher.dispatch(&lease).await })
        };

        let status = match task.await {
            Ok(status) => status,
            Err(join_err) => {
                let message = panic_message(join_err);
                error!(
                    job_id = %lease.job.id,
                    identity = %lease.job.identity,
                    error = %message,
                    "stage panicked"
                );
                dispatcher.fail(&lease, message)
            }
        };

        let outcome = match status {
            DispatchStatus::Success => CompletionOutcome::Completed,
            DispatchStatus::Cancelled => CompletionOutcome::Cancelled,
            DispatchStatus::Failed { error } => CompletionOutcome::Failed { error },
        };
        queue
            .complete(lease.job.id, &lease.job.identity, outcome)
            .await;
    }
    debug!(%kind, worker, "worker offline");
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("stage task aborted: {err}");
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("stage panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("stage panicked: {message}")
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::scan::orchestration::events::{PipelineEvent, PipelineEvents, PipelineOutcome};
    use crate::scan::orchestration::job::{JobPayload, NextStep};
    use crate::scan::orchestration::orchestrator::Orchestrator;
    use crate::scan::orchestration::queue::{InMemoryJobQueue, JobContext};
    use crate::scan::orchestration::registry::{Stage, StageOutput, StageRegistry};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct Exploding;

    #[async_trait]
    impl Stage for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        async fn run(&self, _ctx: &JobContext, payload: &JobPayload) -> Result<StageOutput> {
            if payload.path().ends_with("boom.mkv") {
                panic!("corrupt container");
            }
            Ok(StageOutput::next(NextStep::None))
        }
    }

    fn runtime_with(registry: StageRegistry) -> (OrchestratorRuntime, Orchestrator) {
        let shutdown = CancellationToken::new();
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(shutdown.clone()));
        let orchestrator = Orchestrator::new(queue.clone(), PipelineEvents::new(64));
        let dispatcher = Arc::new(PipelineDispatcher::new(orchestrator.clone(), registry));
        let workers = WorkerConfig {
            idle_poll_ms: 10,
            ..WorkerConfig::default()
        };
        (
            OrchestratorRuntime::new(queue, dispatcher, workers, shutdown),
            orchestrator,
        )
    }

    #[tokio::test]
    async fn panicking_stage_is_reported_and_pool_survives() {
        let mut registry = StageRegistry::new();
        registry.register(JobKind::Hash, || Box::new(Exploding));
        let (runtime, orchestrator) = runtime_with(registry);
        let mut events = orchestrator.events().subscribe();
        runtime.start();

        orchestrator
            .schedule_hash(PathBuf::from("/m/boom.mkv"))
            .await
            .unwrap();

        let failed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(PipelineEvent::Outcome(PipelineOutcome::Failed { error, stage, .. })) =
                    events.recv().await
                {
                    return (error, stage);
                }
            }
        })
        .await
        .expect("failure outcome");
        assert!(failed.0.contains("corrupt container"));
        assert_eq!(failed.1, JobKind::Hash);

        // The same pool keeps serving jobs after the panic.
        orchestrator
            .schedule_hash(PathBuf::from("/m/fine.mkv"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while orchestrator.queue().len().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue drained");

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let (runtime, _orchestrator) = runtime_with(StageRegistry::new());
        runtime.start();
        tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
            .await
            .expect("workers exit promptly");
    }
}
