//! Shared fixtures for pipeline integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use kinema_core::config::{
    ChangeQueueConfig, HashingConfig, IngestConfig, ReadinessConfig, WatchConfig, WorkerConfig,
};
use kinema_core::database::ports::VideoRepository;
use kinema_core::database::{InMemoryStore, Repositories};
use kinema_core::error::{MediaError, Result};
use kinema_core::hashing::{ContentHasher, MultiDigestHasher};
use kinema_core::providers::{
    MetadataProvider, ProviderCredits, ProviderEpisode, ProviderError, ProviderMovie,
    ProviderResult, ProviderShow,
};
use kinema_core::scan::orchestration::{JobId, JobKind, PipelineEvent, PipelineOutcome};
use kinema_core::service::IngestService;
use kinema_core::types::{
    CastCredit, ContentDigests, CrewCredit, CrossReference, Genre, MediaLink, Recommendation,
    VideoHash, VideoRecord,
};

pub const ALIEN_HASH: &str = "5d886780825db91bbc390f10f1b6c95c";

/// Timings tuned so a file moves through the whole pipeline in well under a
/// second.
pub fn fast_config() -> IngestConfig {
    IngestConfig {
        watch: WatchConfig {
            restart_backoff_ms: 10,
            ..WatchConfig::default()
        },
        readiness: ReadinessConfig {
            retry_delay_ms: 10,
            timeout_secs: 10,
            info_retry_count: 3,
            info_retry_delay_ms: 10,
        },
        queue: ChangeQueueConfig {
            drain_interval_ms: 20,
        },
        workers: WorkerConfig {
            idle_poll_ms: 10,
            ..WorkerConfig::default()
        },
        hashing: HashingConfig {
            read_buffer_bytes: 64 * 1024,
            progress_interval_ms: 0,
        },
        ..IngestConfig::default()
    }
}

/// Hashes real content, except that a file whose whole content is a 32-char
/// hex string is reported with that string as its ED2K hash.
#[derive(Debug, Default)]
pub struct ScriptedHasher {
    real: MultiDigestHasher,
    pub calls: AtomicUsize,
    pub hold: AtomicBool,
    pub in_progress: AtomicBool,
}

impl ScriptedHasher {
    pub fn holding() -> Self {
        let hasher = Self::default();
        hasher.hold.store(true, Ordering::SeqCst);
        hasher
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
    }
}

impl ContentHasher for ScriptedHasher {
    fn hash_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<ContentDigests> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_progress.store(true, Ordering::SeqCst);
        while self.hold.load(Ordering::SeqCst) && !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled("hashing cancelled".into()));
        }

        let bytes = std::fs::read(path)?;
        let total = bytes.len() as u64;
        let scripted = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| VideoHash::parse(text.trim()).ok());
        match scripted {
            Some(ed2k) => {
                progress(total / 2, total);
                progress(total, total);
                Ok(ContentDigests {
                    ed2k,
                    crc32: "00000000".into(),
                    md5: "0".repeat(32),
                    sha1: "0".repeat(40),
                })
            }
            None => self.real.hash_file(path, cancel, progress),
        }
    }
}

/// In-memory stand-in for TMDB. Unknown ids are `NotFound`.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    pub movies: HashMap<u64, ProviderMovie>,
    pub shows: HashMap<u64, ProviderShow>,
    pub episodes: HashMap<(u64, u32, u32), ProviderEpisode>,
    pub fail_recommendations: bool,
    pub requests: AtomicUsize,
}

impl ScriptedProvider {
    pub fn with_alien() -> Self {
        let mut provider = Self::default();
        provider.movies.insert(348, alien());
        provider
    }

    pub fn with_episode(mut self, show: ProviderShow, episode: ProviderEpisode) -> Self {
        self.episodes
            .insert((show.tmdb_id, episode.season, episode.episode), episode);
        self.shows.insert(show.tmdb_id, show);
        self
    }

    fn count(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn credits() -> ProviderCredits {
        ProviderCredits {
            cast: vec![CastCredit {
                person_tmdb_id: 10205,
                name: "Sigourney Weaver".into(),
                character: Some("Ripley".into()),
                order: Some(0),
                profile_path: None,
            }],
            crew: vec![CrewCredit {
                person_tmdb_id: 578,
                name: "Ridley Scott".into(),
                job: "Director".into(),
                department: Some("Directing".into()),
            }],
        }
    }

    fn recommendations(&self) -> ProviderResult<Vec<Recommendation>> {
        if self.fail_recommendations {
            return Err(ProviderError::Api {
                status: 500,
                message: "upstream exploded".into(),
            });
        }
        Ok(vec![Recommendation {
            tmdb_id: 679,
            title: "Aliens".into(),
            poster_path: None,
            vote_average: Some(7.9),
        }])
    }
}

pub fn alien() -> ProviderMovie {
    ProviderMovie {
        tmdb_id: 348,
        title: "Alien".into(),
        original_title: Some("Alien".into()),
        overview: Some("During its return to the earth...".into()),
        release_date: Some("1979-05-25".into()),
        runtime_minutes: Some(117),
        genres: vec![
            Genre {
                tmdb_id: 27,
                name: "Horror".into(),
            },
            Genre {
                tmdb_id: 878,
                name: "Science Fiction".into(),
            },
        ],
        poster_path: Some("/vfrQk5IPloGg1v9Rzbh2Eg3VGyM.jpg".into()),
        backdrop_path: None,
        vote_average: Some(8.1),
    }
}

#[async_trait]
impl MetadataProvider for ScriptedProvider {
    async fn get_movie_by_id(&self, tmdb_id: u64) -> ProviderResult<ProviderMovie> {
        self.count();
        self.movies
            .get(&tmdb_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_movie_credits(&self, _tmdb_id: u64) -> ProviderResult<ProviderCredits> {
        self.count();
        Ok(Self::credits())
    }

    async fn get_movie_recommendations(
        &self,
        _tmdb_id: u64,
    ) -> ProviderResult<Vec<Recommendation>> {
        self.count();
        self.recommendations()
    }

    async fn get_movie_certification(&self, _tmdb_id: u64) -> ProviderResult<Option<String>> {
        self.count();
        Ok(Some("R".into()))
    }

    async fn get_tv_show_by_id(&self, tmdb_id: u64) -> ProviderResult<ProviderShow> {
        self.count();
        self.shows
            .get(&tmdb_id)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_tv_episode_by_id(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> ProviderResult<ProviderEpisode> {
        self.count();
        self.episodes
            .get(&(show_tmdb_id, season, episode))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn get_tv_show_credits(&self, _tmdb_id: u64) -> ProviderResult<ProviderCredits> {
        self.count();
        Ok(Self::credits())
    }

    async fn get_tv_episode_credits(
        &self,
        _show_tmdb_id: u64,
        _season: u32,
        _episode: u32,
    ) -> ProviderResult<ProviderCredits> {
        self.count();
        Ok(ProviderCredits::default())
    }

    async fn get_tv_certification(&self, _tmdb_id: u64) -> ProviderResult<Option<String>> {
        self.count();
        Ok(Some("TV-MA".into()))
    }

    async fn get_tv_recommendations(
        &self,
        _tmdb_id: u64,
    ) -> ProviderResult<Vec<Recommendation>> {
        self.count();
        self.recommendations()
    }
}

/// Video port whose writes for one hash fail as if the store were down.
#[derive(Debug)]
pub struct FailingVideos {
    pub inner: Arc<InMemoryStore>,
    pub broken: VideoHash,
}

#[async_trait]
impl VideoRepository for FailingVideos {
    async fn get_video(&self, hash: &VideoHash) -> Result<Option<VideoRecord>> {
        self.inner.get_video(hash).await
    }

    async fn upsert_video(&self, record: VideoRecord) -> Result<VideoRecord> {
        self.inner.upsert_video(record).await
    }

    async fn delete_video(&self, hash: &VideoHash) -> Result<bool> {
        self.inner.delete_video(hash).await
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        self.inner.list_videos().await
    }

    async fn mark_recognized(
        &self,
        hash: &VideoHash,
        media: MediaLink,
    ) -> Result<CrossReference> {
        if *hash == self.broken {
            return Err(MediaError::Persistence(format!(
                "write to cross references failed for {hash}"
            )));
        }
        self.inner.mark_recognized(hash, media).await
    }

    async fn cross_reference(&self, hash: &VideoHash) -> Result<Option<CrossReference>> {
        self.inner.cross_reference(hash).await
    }
}

pub struct Harness {
    pub service: IngestService,
    pub store: Arc<InMemoryStore>,
    pub hasher: Arc<ScriptedHasher>,
    pub provider: Arc<ScriptedProvider>,
    pub events: broadcast::Receiver<PipelineEvent>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn start(provider: ScriptedProvider, hasher: ScriptedHasher) -> Self {
        Self::start_with(provider, hasher, fast_config()).await
    }

    pub async fn start_with(
        provider: ScriptedProvider,
        hasher: ScriptedHasher,
        config: IngestConfig,
    ) -> Self {
        Self::start_with_videos(provider, hasher, config, |store| store as Arc<dyn VideoRepository>).await
    }

    /// Start with the video port replaced by whatever `videos` builds around
    /// the shared store.
    pub async fn start_with_videos<F>(
        provider: ScriptedProvider,
        hasher: ScriptedHasher,
        config: IngestConfig,
        videos: F,
    ) -> Self
    where
        F: FnOnce(Arc<InMemoryStore>) -> Arc<dyn VideoRepository>,
    {
        let store = Arc::new(InMemoryStore::new());
        kinema_core::database::seed::seed_builtin(store.as_ref())
            .await
            .expect("seed catalog");

        let mut repos = Repositories::in_memory(Arc::clone(&store));
        repos.videos = videos(Arc::clone(&store));

        let hasher = Arc::new(hasher);
        let provider = Arc::new(provider);
        let service = IngestService::builder()
            .with_config(config)
            .with_repositories(repos)
            .with_provider(provider.clone())
            .with_hasher(hasher.clone())
            .build()
            .expect("build service");
        let events = service.subscribe();
        service.start().await.expect("start service");

        Self {
            service,
            store,
            hasher,
            provider,
            events,
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Canonical path of the fixture folder, so it matches watcher output.
    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().expect("canonical tempdir")
    }

    pub async fn wait_for_outcome(&mut self, path: &Path) -> PipelineOutcome {
        let deadline = Duration::from_secs(15);
        tokio::time::timeout(deadline, async {
            loop {
                match self.events.recv().await {
                    Ok(PipelineEvent::Outcome(outcome)) if outcome.path() == path => {
                        return outcome;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("event channel closed")
                    }
                }
            }
        })
        .await
        .expect("pipeline outcome in time")
    }

    /// Next terminal outcome for any file.
    pub async fn wait_for_any_outcome(&mut self) -> PipelineOutcome {
        tokio::time::timeout(Duration::from_secs(15), async {
            loop {
                match self.events.recv().await {
                    Ok(PipelineEvent::Outcome(outcome)) => return outcome,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("event channel closed")
                    }
                }
            }
        })
        .await
        .expect("pipeline outcome in time")
    }

    /// Like [`Self::wait_for_outcome`], also returning the id of the hash job
    /// seen on the way.
    pub async fn wait_for_hash_job_and_outcome(
        &mut self,
        path: &Path,
    ) -> (Option<JobId>, PipelineOutcome) {
        let mut hash_job = None;
        let outcome = tokio::time::timeout(Duration::from_secs(15), async {
            loop {
                match self.events.recv().await {
                    Ok(PipelineEvent::Job(event))
                        if event.identity.kind == JobKind::Hash
                            && event.identity.path == path =>
                    {
                        hash_job = Some(event.job_id);
                    }
                    Ok(PipelineEvent::Outcome(outcome)) if outcome.path() == path => {
                        return outcome;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("event channel closed")
                    }
                }
            }
        })
        .await
        .expect("pipeline outcome in time");
        (hash_job, outcome)
    }
}

/// Poll `check` until it holds or the timeout passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
