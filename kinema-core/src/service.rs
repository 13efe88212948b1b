//! The assembled ingestion pipeline and its lifecycle.
//!
//! [`IngestService`] owns every long-lived piece: the folder watcher, the
//! change queue and its drain loop, the job queue with its worker pools and
//! the progress store. Build it with [`IngestServiceBuilder`], call
//! [`IngestService::start`] once inside a Tokio runtime and
//! [`IngestService::shutdown`] before exit.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::database::Repositories;
use crate::error::{MediaError, Result};
use crate::folders::{AddedFolder, FolderManager};
use crate::hashing::{ContentHasher, MultiDigestHasher};
use crate::progress::ProgressStore;
use crate::providers::MetadataProvider;
use crate::scan::change_queue::{ChangeQueue, ChangeQueueDrainer};
use crate::scan::fs_watch::{FolderEvent, FolderWatcher, NotifyBackend, WatchBackend};
use crate::scan::orchestration::dispatcher::PipelineDispatcher;
use crate::scan::orchestration::events::{PipelineEvent, PipelineEvents};
use crate::scan::orchestration::job::{JobKind, JobState};
use crate::scan::orchestration::orchestrator::Orchestrator;
use crate::scan::orchestration::queue::InMemoryJobQueue;
use crate::scan::orchestration::runtime::OrchestratorRuntime;
use crate::scan::readiness::ReadinessGate;
use crate::scan::stages::{StageDeps, default_registry};
use crate::types::{CrossReference, FolderRoles, VideoHash, VideoRecord, WatchedFolder};

/// A stored video together with its catalog link, if it was recognized.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoDetails {
    pub video: VideoRecord,
    pub cross_reference: Option<CrossReference>,
}

#[derive(Default)]
pub struct IngestServiceBuilder {
    config: Option<IngestConfig>,
    repos: Option<Repositories>,
    provider: Option<Arc<dyn MetadataProvider>>,
    hasher: Option<Arc<dyn ContentHasher>>,
    watch_backend: Option<Arc<dyn WatchBackend>>,
    progress: Option<Arc<ProgressStore>>,
}

impl fmt::Debug for IngestServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestServiceBuilder")
            .field("config", &self.config.is_some())
            .field("repos", &self.repos.is_some())
            .field("provider", &self.provider.is_some())
            .field("hasher", &self.hasher.is_some())
            .field("watch_backend", &self.watch_backend.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl IngestServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_repositories(mut self, repos: Repositories) -> Self {
        self.repos = Some(repos);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn with_watch_backend(mut self, backend: Arc<dyn WatchBackend>) -> Self {
        self.watch_backend = Some(backend);
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressStore>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<IngestService> {
        let config = self.config.unwrap_or_default();
        let repos = self
            .repos
            .ok_or_else(|| MediaError::Internal("repositories dependency missing".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| MediaError::Internal("metadata provider dependency missing".into()))?;
        let hasher = self.hasher.unwrap_or_else(|| {
            Arc::new(MultiDigestHasher::new(config.hashing.read_buffer_bytes))
        });
        let backend = self
            .watch_backend
            .unwrap_or_else(|| Arc::new(NotifyBackend));
        let progress = self.progress.unwrap_or_default();

        let root = CancellationToken::new();
        let events = PipelineEvents::new(config.workers.event_channel_capacity);
        let queue = Arc::new(InMemoryJobQueue::new(root.clone()));
        let orchestrator = Orchestrator::new(queue.clone(), events.clone());

        let registry = default_registry(StageDeps {
            repos: repos.clone(),
            provider,
            hasher,
            progress: Arc::clone(&progress),
            progress_interval: std::time::Duration::from_millis(
                config.hashing.progress_interval_ms,
            ),
        });
        let dispatcher = Arc::new(PipelineDispatcher::new(orchestrator.clone(), registry));
        let runtime = OrchestratorRuntime::new(queue, dispatcher, config.workers, root.clone());

        let (watcher, folder_events) = FolderWatcher::new(config.watch.clone(), backend, root.clone());
        let watcher = Arc::new(watcher);
        let changes = Arc::new(ChangeQueue::new(root.clone()));
        let drainer = ChangeQueueDrainer::new(
            Arc::clone(&changes),
            ReadinessGate::new(config.readiness),
            orchestrator.clone(),
        );
        let folders = Arc::new(FolderManager::new(
            Arc::clone(&repos.folders),
            Arc::clone(&watcher),
            Arc::clone(&changes),
            orchestrator.clone(),
            config.watch.scan_on_add,
        ));

        Ok(IngestService {
            config,
            repos,
            progress,
            events,
            orchestrator,
            runtime,
            watcher,
            changes,
            drainer,
            folders,
            root,
            folder_events: Mutex::new(Some(folder_events)),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }
}

pub struct IngestService {
    config: IngestConfig,
    repos: Repositories,
    progress: Arc<ProgressStore>,
    events: PipelineEvents,
    orchestrator: Orchestrator,
    runtime: OrchestratorRuntime,
    watcher: Arc<FolderWatcher>,
    changes: Arc<ChangeQueue>,
    drainer: ChangeQueueDrainer,
    folders: Arc<FolderManager>,
    root: CancellationToken,
    folder_events: Mutex<Option<mpsc::UnboundedReceiver<FolderEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl fmt::Debug for IngestService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestService")
            .field("runtime", &self.runtime)
            .field("watcher", &self.watcher)
            .field("changes", &self.changes)
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("stopped", &self.root.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl IngestService {
    pub fn builder() -> IngestServiceBuilder {
        IngestServiceBuilder::new()
    }

    /// Start the worker pools, the event router and the drain loop, then
    /// re-watch every stored folder. Calling this twice is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.root.is_cancelled() {
            return Err(MediaError::Internal(
                "ingest service was already shut down".into(),
            ));
        }

        self.runtime.start();

        let Some(folder_events) = self.folder_events.lock().take() else {
            return Err(MediaError::Internal("folder event stream already taken".into()));
        };
        let router = EventRouter {
            watcher: Arc::clone(&self.watcher),
            changes: Arc::clone(&self.changes),
            orchestrator: self.orchestrator.clone(),
            shutdown: self.root.clone(),
        };
        let drain = self
            .drainer
            .clone()
            .run(self.config.queue.drain_interval(), self.root.clone());
        {
            let mut tasks = self.tasks.lock();
            tasks.push(tokio::spawn(router.run(folder_events)));
            tasks.push(tokio::spawn(drain));
        }

        let restored = self.folders.restore().await?;
        info!(folders = restored, "ingest service started");
        Ok(())
    }

    /// Cancel every running job, drop the watches and wait for background
    /// tasks. Progress entries do not outlive the service.
    pub async fn shutdown(&self) {
        info!("ingest service shutting down");
        self.root.cancel();
        self.watcher.shutdown().await;
        self.runtime.shutdown().await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "ingest background task ended abnormally");
            }
        }
        self.progress.clear();
        info!("ingest service stopped");
    }

    pub async fn add_folder(&self, path: &Path, roles: FolderRoles) -> Result<AddedFolder> {
        self.folders.add_folder(path, roles).await
    }

    pub async fn remove_folder(&self, path: &Path) -> Result<WatchedFolder> {
        self.folders.remove_folder(path).await
    }

    pub async fn list_folders(&self) -> Result<Vec<WatchedFolder>> {
        self.folders.list_folders().await
    }

    pub async fn video_details(&self, hash: &VideoHash) -> Result<Option<VideoDetails>> {
        let Some(video) = self.repos.videos.get_video(hash).await? else {
            return Ok(None);
        };
        let cross_reference = self.repos.videos.cross_reference(hash).await?;
        Ok(Some(VideoDetails {
            video,
            cross_reference,
        }))
    }

    pub async fn job_status(&self, kind: JobKind, path: &Path) -> Option<JobState> {
        self.orchestrator.status(kind, path).await
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn progress(&self) -> &Arc<ProgressStore> {
        &self.progress
    }

    pub fn events(&self) -> &PipelineEvents {
        &self.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn change_queue(&self) -> &Arc<ChangeQueue> {
        &self.changes
    }

    pub fn watcher(&self) -> &Arc<FolderWatcher> {
        &self.watcher
    }

    pub fn folders(&self) -> &Arc<FolderManager> {
        &self.folders
    }
}

/// Turns watcher output into change queue and job queue operations.
struct EventRouter {
    watcher: Arc<FolderWatcher>,
    changes: Arc<ChangeQueue>,
    orchestrator: Orchestrator,
    shutdown: CancellationToken,
}

impl EventRouter {
    async fn run(self, mut events: mpsc::UnboundedReceiver<FolderEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.route(event).await;
        }
        debug!("folder event router stopped");
    }

    async fn route(&self, event: FolderEvent) {
        match event {
            FolderEvent::Added { path } => {
                // Events can trail an unwatch; drop those.
                if !self.watcher.covers(&path) {
                    debug!(path = %path.display(), "ignoring event for unwatched path");
                    return;
                }
                if self.changes.enqueue(&path) {
                    debug!(path = %path.display(), "file detected");
                }
            }
            FolderEvent::Removed { path } => {
                let dropped = self.changes.remove_under(&path);
                let cancelled = self.orchestrator.cancel_under(&path).await;
                if dropped + cancelled > 0 {
                    info!(path = %path.display(), dropped, cancelled, "file removed, work cancelled");
                }
            }
            FolderEvent::WatchFailed { folder, error } => {
                warn!(folder = %folder.display(), %error, "folder is no longer watched");
                self.orchestrator
                    .events()
                    .publish(PipelineEvent::WatchFailed { folder, error });
            }
        }
    }
}
