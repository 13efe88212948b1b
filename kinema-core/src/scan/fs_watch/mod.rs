//! Per-folder filesystem watches.
//!
//! Each watched folder gets a supervisor task that owns the OS watch, turns
//! raw `notify` events into [`FolderEvent`]s and re-establishes the watch when
//! it reports an error. Consumers only ever see file events, plus a single
//! [`FolderEvent::WatchFailed`] once the restart budget is spent.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::WatchConfig;
use crate::error::{MediaError, Result};
use crate::scan::orchestration::job::normalize_path;

/// A watch that stays up this long has its failure count reset.
const HEALTHY_AFTER: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderEvent {
    Added { path: PathBuf },
    Removed { path: PathBuf },
    /// The watch for `folder` could not be kept alive.
    WatchFailed { folder: PathBuf, error: String },
}

/// Raw output of a watch backend.
#[derive(Debug)]
pub enum RawWatchMessage {
    Event(Event),
    Error(String),
}

pub type RawEventSink = mpsc::UnboundedSender<RawWatchMessage>;

/// Keeps an OS watch alive; dropping it stops the watch.
pub struct WatchGuard(#[allow(dead_code)] Box<dyn Any + Send>);

impl WatchGuard {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self(Box::new(inner))
    }
}

impl fmt::Debug for WatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WatchGuard")
    }
}

/// Source of raw filesystem notifications for one folder.
///
/// `start` runs on a blocking thread. Implementations must only do a
/// non-blocking send into `sink` from their callbacks.
pub trait WatchBackend: Send + Sync + fmt::Debug {
    fn start(&self, root: &Path, sink: RawEventSink) -> Result<WatchGuard>;
}

/// Backend built on the platform's recommended `notify` watcher.
#[derive(Debug, Default)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn start(&self, root: &Path, sink: RawEventSink) -> Result<WatchGuard> {
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                let message = match res {
                    Ok(event) => RawWatchMessage::Event(event),
                    Err(err) => RawWatchMessage::Error(err.to_string()),
                };
                // The supervisor is gone once the watch is being torn down.
                let _ = sink.send(message);
            },
            NotifyConfig::default(),
        )
        .map_err(|err| {
            MediaError::Internal(format!(
                "failed to create watcher for {}: {err}",
                root.display()
            ))
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| {
                MediaError::Internal(format!("failed to watch {}: {err}", root.display()))
            })?;

        Ok(WatchGuard::new(watcher))
    }
}

struct ActiveWatch {
    generation: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type WatchTable = Arc<Mutex<HashMap<PathBuf, ActiveWatch>>>;

/// Owns the watches for every watched folder.
pub struct FolderWatcher {
    config: WatchConfig,
    backend: Arc<dyn WatchBackend>,
    sink: mpsc::UnboundedSender<FolderEvent>,
    watches: WatchTable,
    root: CancellationToken,
}

impl fmt::Debug for FolderWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderWatcher")
            .field("backend", &self.backend)
            .field("watch_count", &self.watches.lock().len())
            .finish_non_exhaustive()
    }
}

impl FolderWatcher {
    pub fn new(
        config: WatchConfig,
        backend: Arc<dyn WatchBackend>,
        root: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<FolderEvent>) {
        let (sink, events) = mpsc::unbounded_channel();
        let watcher = Self {
            config,
            backend,
            sink,
            watches: Arc::new(Mutex::new(HashMap::new())),
            root,
        };
        (watcher, events)
    }

    pub fn with_notify(
        config: WatchConfig,
        root: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<FolderEvent>) {
        Self::new(config, Arc::new(NotifyBackend), root)
    }

    /// Start watching `folder`. Idempotent. Returns once the first attempt
    /// to establish the watch has finished; `false` means it failed and the
    /// supervisor keeps retrying in the background.
    pub async fn watch(&self, folder: &Path) -> bool {
        let folder = normalize_path(folder);
        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut watches = self.watches.lock();
            if watches.contains_key(&folder) {
                return true;
            }
            let generation = Uuid::now_v7();
            let cancel = self.root.child_token();
            let supervisor = Supervisor {
                folder: folder.clone(),
                generation,
                config: self.config.clone(),
                backend: Arc::clone(&self.backend),
                sink: self.sink.clone(),
                watches: Arc::clone(&self.watches),
                cancel: cancel.clone(),
            };
            let task = tokio::spawn(supervisor.run(ready_tx));
            watches.insert(
                folder.clone(),
                ActiveWatch {
                    generation,
                    cancel,
                    task,
                },
            );
        }
        info!(folder = %folder.display(), "watching folder");
        ready_rx.await.unwrap_or(false)
    }

    /// Stop watching `folder`. Returns false if it was not watched.
    pub fn unwatch(&self, folder: &Path) -> bool {
        let folder = normalize_path(folder);
        match self.watches.lock().remove(&folder) {
            Some(watch) => {
                watch.cancel.cancel();
                info!(folder = %folder.display(), "stopped watching folder");
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, folder: &Path) -> bool {
        self.watches.lock().contains_key(&normalize_path(folder))
    }

    /// Whether `path` lies inside any watched folder.
    pub fn covers(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.watches
            .lock()
            .keys()
            .any(|folder| path.starts_with(folder))
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        let mut folders: Vec<_> = self.watches.lock().keys().cloned().collect();
        folders.sort();
        folders
    }

    /// Walk `folder` and return every video file already present.
    pub async fn scan(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        let folder = folder.to_path_buf();
        let config = self.config.clone();
        spawn_blocking(move || {
            let mut found = Vec::new();
            for entry in WalkDir::new(&folder).follow_links(true) {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if config.is_video_file(entry.path()) {
                            found.push(entry.into_path());
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(folder = %folder.display(), error = %err, "skipping unreadable entry during scan");
                    }
                }
            }
            found.sort();
            debug!(folder = %folder.display(), files = found.len(), "initial scan finished");
            found
        })
        .await
        .map_err(|err| MediaError::Internal(format!("folder scan panicked: {err}")))
    }

    /// Stop every watch and wait for the supervisors to exit.
    pub async fn shutdown(&self) {
        let watches: Vec<ActiveWatch> = self.watches.lock().drain().map(|(_, w)| w).collect();
        for watch in &watches {
            watch.cancel.cancel();
        }
        for watch in watches {
            if let Err(err) = watch.task.await {
                warn!(error = %err, "watch supervisor ended abnormally");
            }
        }
    }
}

struct Supervisor {
    folder: PathBuf,
    generation: Uuid,
    config: WatchConfig,
    backend: Arc<dyn WatchBackend>,
    sink: mpsc::UnboundedSender<FolderEvent>,
    watches: WatchTable,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(self, ready: oneshot::Sender<bool>) {
        let mut ready = Some(ready);
        let mut failures: u32 = 0;

        loop {
            let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
            let backend = Arc::clone(&self.backend);
            let folder = self.folder.clone();
            let started = spawn_blocking(move || backend.start(&folder, raw_tx)).await;

            let failure = match started {
                Ok(Ok(guard)) => {
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(true);
                    }
                    let since = Instant::now();
                    let Some(failure) = self.pump(&mut raw_rx).await else {
                        drop(guard);
                        return;
                    };
                    drop(guard);
                    if since.elapsed() >= HEALTHY_AFTER {
                        failures = 0;
                    }
                    failure
                }
                Ok(Err(err)) => err.to_string(),
                Err(join_err) => format!("watcher initialization panicked: {join_err}"),
            };

            if let Some(ready) = ready.take() {
                let _ = ready.send(false);
            }

            failures += 1;
            if failures > self.config.max_restart_attempts {
                error!(folder = %self.folder.display(), attempts = failures, error = %failure, "giving up on folder watch");
                self.deregister();
                let _ = self.sink.send(FolderEvent::WatchFailed {
                    folder: self.folder.clone(),
                    error: failure,
                });
                return;
            }

            warn!(folder = %self.folder.display(), attempt = failures, error = %failure, "folder watch failed, restarting");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.restart_backoff()) => {}
            }
        }
    }

    /// Drop this supervisor's entry so the folder reads as unwatched and a
    /// later `watch` starts over. A newer entry for the same folder is kept.
    fn deregister(&self) {
        let mut watches = self.watches.lock();
        if watches
            .get(&self.folder)
            .is_some_and(|watch| watch.generation == self.generation)
        {
            watches.remove(&self.folder);
        }
    }

    /// Forward events until the watch fails (`Some(error)`) or is cancelled
    /// (`None`).
    async fn pump(
        &self,
        raw_rx: &mut mpsc::UnboundedReceiver<RawWatchMessage>,
    ) -> Option<String> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                message = raw_rx.recv() => match message {
                    Some(RawWatchMessage::Event(event)) => {
                        for folder_event in convert_event(&self.config, &event) {
                            if self.sink.send(folder_event).is_err() {
                                return None;
                            }
                        }
                    }
                    Some(RawWatchMessage::Error(err)) => return Some(err),
                    None => return Some("watch event stream closed".into()),
                },
            }
        }
    }
}

fn added(config: &WatchConfig, path: &Path) -> Option<FolderEvent> {
    config.is_video_file(path).then(|| FolderEvent::Added {
        path: path.to_path_buf(),
    })
}

fn removed(path: &Path) -> FolderEvent {
    FolderEvent::Removed {
        path: path.to_path_buf(),
    }
}

/// Map a raw notification onto file events. Renames become `Removed(old)`
/// followed by `Added(new)`; only video files produce `Added`.
pub(crate) fn convert_event(config: &WatchConfig, event: &Event) -> Vec<FolderEvent> {
    match &event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => event
            .paths
            .iter()
            .filter_map(|path| added(config, path))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|path| removed(path)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .filter_map(|path| added(config, path))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::with_capacity(2);
            if let Some(old) = event.paths.first() {
                events.push(removed(old));
            }
            if let Some(new) = event.paths.get(1).and_then(|path| added(config, path)) {
                events.push(new);
            }
            events
        }
        // Platforms that cannot pair rename halves report each side alone.
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter_map(|path| {
                if path.exists() {
                    added(config, path)
                } else {
                    Some(removed(path))
                }
            })
            .collect(),
        EventKind::Remove(_) => event.paths.iter().map(|path| removed(path)).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    fn added_at(path: &str) -> FolderEvent {
        FolderEvent::Added { path: path.into() }
    }

    fn removed_at(path: &str) -> FolderEvent {
        FolderEvent::Removed { path: path.into() }
    }

    #[test]
    fn creation_of_video_file_is_added() {
        let config = WatchConfig::default();
        let events = convert_event(
            &config,
            &event(EventKind::Create(CreateKind::File), &["/m/Alien.MKV"]),
        );
        assert_eq!(events, vec![added_at("/m/Alien.MKV")]);
    }

    #[test]
    fn non_video_files_are_ignored() {
        let config = WatchConfig::default();
        let events = convert_event(
            &config,
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/m/cover.jpg"],
            ),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn metadata_changes_are_ignored() {
        let config = WatchConfig::default();
        let events = convert_event(
            &config,
            &event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/m/a.mkv"],
            ),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn rename_is_removed_then_added() {
        let config = WatchConfig::default();
        let events = convert_event(
            &config,
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/m/a.part", "/m/a.mkv"],
            ),
        );
        assert_eq!(events, vec![removed_at("/m/a.part"), added_at("/m/a.mkv")]);
    }

    #[test]
    fn removal_is_forwarded_for_any_path() {
        let config = WatchConfig::default();
        let events = convert_event(
            &config,
            &event(EventKind::Remove(RemoveKind::Folder), &["/m/Season 1"]),
        );
        assert_eq!(events, vec![removed_at("/m/Season 1")]);
    }

    #[derive(Debug, Default)]
    struct ScriptedBackend {
        fail_first: usize,
        starts: AtomicUsize,
        sinks: Mutex<Vec<RawEventSink>>,
    }

    impl WatchBackend for ScriptedBackend {
        fn start(&self, root: &Path, sink: RawEventSink) -> Result<WatchGuard> {
            let attempt = self.starts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(MediaError::Internal(format!(
                    "cannot watch {}",
                    root.display()
                )));
            }
            self.sinks.lock().push(sink);
            Ok(WatchGuard::new(()))
        }
    }

    fn fast_config(max_restart_attempts: u32) -> WatchConfig {
        WatchConfig {
            restart_backoff_ms: 5,
            max_restart_attempts,
            ..WatchConfig::default()
        }
    }

    #[tokio::test]
    async fn exhausted_restarts_report_watch_failed() {
        let backend = Arc::new(ScriptedBackend {
            fail_first: usize::MAX,
            ..Default::default()
        });
        let (watcher, mut events) =
            FolderWatcher::new(fast_config(2), backend.clone(), CancellationToken::new());

        assert!(!watcher.watch(Path::new("/m")).await);
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, FolderEvent::WatchFailed { ref folder, .. } if folder == Path::new("/m")));
        assert_eq!(backend.starts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_watch_is_released_and_can_be_rewatched() {
        let backend = Arc::new(ScriptedBackend {
            fail_first: usize::MAX,
            ..Default::default()
        });
        let (watcher, mut events) =
            FolderWatcher::new(fast_config(1), backend.clone(), CancellationToken::new());

        assert!(!watcher.watch(Path::new("/m")).await);
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, FolderEvent::WatchFailed { .. }));
        assert!(!watcher.is_watching(Path::new("/m")));
        assert!(!watcher.covers(Path::new("/m/a.mkv")));

        let starts_before = backend.starts.load(Ordering::SeqCst);
        assert!(!watcher.watch(Path::new("/m")).await);
        assert!(backend.starts.load(Ordering::SeqCst) > starts_before);
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn watch_recovers_after_runtime_error() {
        let backend = Arc::new(ScriptedBackend::default());
        let (watcher, mut events) =
            FolderWatcher::new(fast_config(3), backend.clone(), CancellationToken::new());
        assert!(watcher.watch(Path::new("/m")).await);

        let first = backend.sinks.lock()[0].clone();
        first
            .send(RawWatchMessage::Error("inotify queue overflow".into()))
            .unwrap();

        // The supervisor restarts the backend with a fresh sink.
        let restarted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(sink) = backend.sinks.lock().get(1).cloned() {
                    return sink;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        restarted
            .send(RawWatchMessage::Event(event(
                EventKind::Create(CreateKind::File),
                &["/m/new.mkv"],
            )))
            .unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, added_at("/m/new.mkv"));
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn watch_is_idempotent_and_unwatch_stops() {
        let backend = Arc::new(ScriptedBackend::default());
        let (watcher, _events) =
            FolderWatcher::new(fast_config(3), backend.clone(), CancellationToken::new());

        assert!(watcher.watch(Path::new("/m")).await);
        assert!(watcher.watch(Path::new("/m/")).await);
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
        assert!(watcher.covers(Path::new("/m/sub/a.mkv")));

        assert!(watcher.unwatch(Path::new("/m")));
        assert!(!watcher.unwatch(Path::new("/m")));
        assert!(!watcher.covers(Path::new("/m/sub/a.mkv")));
    }

    #[tokio::test]
    async fn notify_reports_new_video_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (watcher, mut events) =
            FolderWatcher::with_notify(WatchConfig::default(), CancellationToken::new());
        assert!(watcher.watch(&root).await);

        let target = root.join("Alien (1979).mkv");
        std::fs::write(&target, b"frames").unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = events.recv().await {
                if event == (FolderEvent::Added { path: target.clone() }) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(seen);
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn scan_lists_existing_videos_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Season 1")).unwrap();
        std::fs::write(dir.path().join("Season 1/e01.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("movie.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let (watcher, _events) =
            FolderWatcher::with_notify(WatchConfig::default(), CancellationToken::new());
        let found = watcher.scan(dir.path()).await.unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("Season 1/e01.mkv"), dir.path().join("movie.mp4")]
        );
    }
}
