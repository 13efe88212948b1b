mod support;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use kinema_core::config::ReadinessConfig;
use kinema_core::database::ports::{
    CreditRepository, KnownHashRepository, MovieRepository, RecommendationRepository,
    SeriesRepository, VideoRepository,
};
use kinema_core::error::MediaError;
use kinema_core::providers::{ProviderEpisode, ProviderShow};
use kinema_core::scan::PendingState;
use kinema_core::scan::orchestration::{JobKind, PipelineEvent, PipelineOutcome};
use kinema_core::types::{FolderRoles, KnownHashEntry, KnownMedia, MediaKey, MediaLink, VideoHash};

use support::{
    ALIEN_HASH, FailingVideos, Harness, ScriptedHasher, ScriptedProvider, eventually,
    fast_config,
};

fn hash(raw: &str) -> VideoHash {
    VideoHash::parse(raw).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn seeded_movie_is_recognized_end_to_end() {
    let mut h = Harness::start(ScriptedProvider::with_alien(), ScriptedHasher::default()).await;
    let root = h.root();
    let file = root.join("Alien (1979).mkv");
    std::fs::write(&file, ALIEN_HASH).unwrap();

    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();
    let (hash_job, outcome) = h.wait_for_hash_job_and_outcome(&file).await;

    match outcome {
        PipelineOutcome::Recognized {
            hash: got,
            media: MediaLink::Movie { tmdb_id, .. },
            ..
        } => {
            assert_eq!(got, hash(ALIEN_HASH));
            assert_eq!(tmdb_id, 348);
        }
        other => panic!("expected a recognized movie, got {other:?}"),
    }

    let details = h
        .service
        .video_details(&hash(ALIEN_HASH))
        .await
        .unwrap()
        .expect("video record");
    assert!(details.video.recognized);
    assert_eq!(details.video.last_path, file);
    let cross_ref = details.cross_reference.expect("cross reference");
    assert!(matches!(cross_ref.media, MediaLink::Movie { tmdb_id: 348, .. }));
    assert_eq!(h.store.list_videos().await.unwrap().len(), 1);

    let movie = h.store.movie_by_tmdb(348).await.unwrap().expect("movie row");
    assert_eq!(movie.title, "Alien");
    assert_eq!(movie.certification.as_deref(), Some("R"));
    let key = MediaKey::Movie { tmdb_id: 348 };
    assert_eq!(h.store.cast_for(key).await.unwrap().len(), 1);
    assert_eq!(h.store.crew_for(key).await.unwrap().len(), 1);
    assert_eq!(h.store.recommendations_for(key).await.unwrap().len(), 1);

    let job_id = hash_job.expect("hash job event");
    let progress = h.service.progress().get(job_id).expect("progress entry");
    assert!(progress.finished);
    assert_eq!(progress.percent, 100.0);
    assert_eq!(progress.filename, "Alien (1979).mkv");
    assert!(h.service.progress().list_active().is_empty());

    h.service.shutdown().await;
    assert!(h.service.progress().get(job_id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_dropped_into_watched_folder_without_catalog_match_is_unrecognized() {
    let mut h = Harness::start(ScriptedProvider::with_alien(), ScriptedHasher::default()).await;
    let root = h.root();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let file = root.join("home video.mp4");
    std::fs::write(&file, b"not in any catalog").unwrap();

    let outcome = h.wait_for_outcome(&file).await;
    let PipelineOutcome::Unrecognized { hash: got, .. } = outcome else {
        panic!("expected unrecognized, got {outcome:?}");
    };

    let details = h.service.video_details(&got).await.unwrap().expect("video");
    assert!(!details.video.recognized);
    assert!(details.cross_reference.is_none());
    assert_eq!(details.video.file_size, 18);
    assert_eq!(h.provider.requests.load(Ordering::SeqCst), 0);

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_not_found_leaves_video_unrecognized() {
    let mut h = Harness::start(ScriptedProvider::with_alien(), ScriptedHasher::default()).await;
    let orphan = "0123456789abcdef0123456789abcdef";
    h.store
        .insert_known(KnownHashEntry {
            hash: hash(orphan),
            media: KnownMedia::Movie { tmdb_id: 999_999 },
        })
        .await
        .unwrap();

    let root = h.root();
    let file = root.join("lost.mkv");
    std::fs::write(&file, orphan).unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let outcome = h.wait_for_outcome(&file).await;
    assert!(matches!(outcome, PipelineOutcome::Unrecognized { .. }));
    let details = h.service.video_details(&hash(orphan)).await.unwrap().unwrap();
    assert!(!details.video.recognized);
    assert!(details.cross_reference.is_none());
    assert!(h.store.movie_by_tmdb(999_999).await.unwrap().is_none());

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_enrichment_does_not_block_recognition() {
    let provider = ScriptedProvider {
        fail_recommendations: true,
        ..ScriptedProvider::with_alien()
    };
    let mut h = Harness::start(provider, ScriptedHasher::default()).await;
    let root = h.root();
    let file = root.join("Alien.mkv");
    std::fs::write(&file, ALIEN_HASH).unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let outcome = h.wait_for_outcome(&file).await;
    assert!(matches!(outcome, PipelineOutcome::Recognized { .. }));

    let key = MediaKey::Movie { tmdb_id: 348 };
    assert!(h.store.recommendations_for(key).await.unwrap().is_empty());
    assert_eq!(h.store.cast_for(key).await.unwrap().len(), 1);
    assert!(h.store.cross_reference(&hash(ALIEN_HASH)).await.unwrap().is_some());

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_failure_fails_only_that_file() {
    let mut h = Harness::start_with_videos(
        ScriptedProvider::with_alien(),
        ScriptedHasher::default(),
        fast_config(),
        |store| {
            Arc::new(FailingVideos {
                inner: store,
                broken: hash(ALIEN_HASH),
            }) as Arc<dyn VideoRepository>
        },
    )
    .await;
    let other = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    h.store
        .insert_known(KnownHashEntry {
            hash: hash(other),
            media: KnownMedia::Movie { tmdb_id: 348 },
        })
        .await
        .unwrap();

    let root = h.root();
    let broken = root.join("Alien.mkv");
    let healthy = root.join("Alien (director's cut).mkv");
    std::fs::write(&broken, ALIEN_HASH).unwrap();
    std::fs::write(&healthy, other).unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        outcomes.push(h.wait_for_any_outcome().await);
    }
    let failed = outcomes
        .iter()
        .find(|outcome| outcome.path() == &broken)
        .expect("outcome for the failing file");
    match failed {
        PipelineOutcome::Failed { stage, error, .. } => {
            assert_eq!(*stage, JobKind::ResolveMovie);
            assert!(error.contains("cross references"), "{error}");
        }
        other => panic!("expected a failure, got {other:?}"),
    }
    assert!(
        outcomes
            .iter()
            .any(|outcome| outcome.path() == &healthy
                && matches!(outcome, PipelineOutcome::Recognized { .. }))
    );

    let video = h.store.get_video(&hash(ALIEN_HASH)).await.unwrap().expect("video row");
    assert!(!video.recognized);
    assert!(h.store.cross_reference(&hash(ALIEN_HASH)).await.unwrap().is_none());
    assert!(h.store.cross_reference(&hash(other)).await.unwrap().is_some());

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identical_copies_share_one_video_record() {
    let mut h = Harness::start(ScriptedProvider::default(), ScriptedHasher::default()).await;
    let root = h.root();
    let content = b"the same frames under two names";
    let first = root.join("holiday.mkv");
    let second = root.join("holiday (copy).mp4");
    std::fs::write(&first, content).unwrap();
    std::fs::write(&second, content).unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let mut hashes = Vec::new();
    for _ in 0..2 {
        match h.wait_for_any_outcome().await {
            PipelineOutcome::Unrecognized { hash, .. } => hashes.push(hash),
            other => panic!("expected unrecognized, got {other:?}"),
        }
    }
    assert_eq!(hashes[0], hashes[1]);

    let videos = h.store.list_videos().await.unwrap();
    assert_eq!(videos.len(), 1);
    assert!(videos[0].last_path == first || videos[0].last_path == second);
    assert_eq!(videos[0].file_size, content.len() as u64);

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn episode_match_resolves_show_and_episode() {
    let show = ProviderShow {
        tmdb_id: 1396,
        name: "Breaking Bad".into(),
        original_name: None,
        overview: None,
        first_air_date: Some("2008-01-20".into()),
        genres: Vec::new(),
        poster_path: None,
        backdrop_path: None,
    };
    let episode = ProviderEpisode {
        tmdb_id: 62085,
        season: 1,
        episode: 1,
        name: Some("Pilot".into()),
        overview: None,
        air_date: Some("2008-01-20".into()),
        runtime_minutes: Some(58),
        still_path: None,
    };
    let provider = ScriptedProvider::default().with_episode(show, episode);
    let mut h = Harness::start(provider, ScriptedHasher::default()).await;

    let pilot = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    h.store
        .insert_known(KnownHashEntry {
            hash: hash(pilot),
            media: KnownMedia::Episode {
                show_tmdb_id: 1396,
                season: 1,
                episode: 1,
            },
        })
        .await
        .unwrap();

    let root = h.root();
    std::fs::create_dir(root.join("Season 1")).unwrap();
    let file = root.join("Season 1/S01E01.mkv");
    std::fs::write(&file, pilot).unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let outcome = h.wait_for_outcome(&file).await;
    let PipelineOutcome::Recognized {
        media:
            MediaLink::Episode {
                episode_id,
                show_tmdb_id,
                season,
                episode,
            },
        ..
    } = outcome
    else {
        panic!("expected a recognized episode, got {outcome:?}");
    };
    assert_eq!((show_tmdb_id, season, episode), (1396, 1, 1));

    let stored = h.store.episode(1396, 1, 1).await.unwrap().expect("episode row");
    assert_eq!(stored.id, episode_id);
    assert_eq!(stored.name.as_deref(), Some("Pilot"));
    let show = h.store.show_by_tmdb(1396).await.unwrap().expect("show row");
    assert_eq!(show.certification.as_deref(), Some("TV-MA"));
    assert_eq!(stored.series_id, show.id);

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_schedule_for_same_path_is_merged() {
    let h = Harness::start(ScriptedProvider::with_alien(), ScriptedHasher::holding()).await;
    let root = h.root();
    let file = root.join("Alien.mkv");
    std::fs::write(&file, ALIEN_HASH).unwrap();

    let orchestrator = h.service.orchestrator();
    let first = orchestrator.schedule_hash(file.clone()).await.unwrap();
    let second = orchestrator.schedule_hash(file.clone()).await.unwrap();

    assert!(first.accepted);
    assert!(!second.accepted);
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(orchestrator.queue().len().await, 1);

    h.hasher.release();
    assert!(
        eventually(Duration::from_secs(10), || {
            h.hasher.calls.load(Ordering::SeqCst) == 1 && !h.service.progress().has_active()
        })
        .await
    );
    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removing_folder_mid_hash_commits_nothing() {
    let mut h = Harness::start(ScriptedProvider::with_alien(), ScriptedHasher::holding()).await;
    let root = h.root();
    let file = root.join("Alien.mkv");
    std::fs::write(&file, ALIEN_HASH).unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let hasher = h.hasher.clone();
    assert!(
        eventually(Duration::from_secs(10), || hasher
            .in_progress
            .load(Ordering::SeqCst))
        .await
    );

    h.service.remove_folder(&root).await.unwrap();
    h.hasher.release();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(h.store.list_videos().await.unwrap().is_empty());
    assert_eq!(h.service.orchestrator().queue().len().await, 0);
    assert!(h.service.list_folders().await.unwrap().is_empty());
    while let Ok(event) = h.events.try_recv() {
        if let PipelineEvent::Outcome(outcome) = event {
            assert!(
                !matches!(
                    outcome,
                    PipelineOutcome::Recognized { .. } | PipelineOutcome::Unrecognized { .. }
                ),
                "unexpected outcome {outcome:?}"
            );
        }
    }

    h.service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_deleted_while_stabilizing_is_never_hashed() {
    let mut config = fast_config();
    config.readiness = ReadinessConfig {
        info_retry_count: 100_000,
        ..config.readiness
    };
    let h = Harness::start_with(
        ScriptedProvider::with_alien(),
        ScriptedHasher::default(),
        config,
    )
    .await;
    let root = h.root();
    let file = root.join("partial.mkv");
    std::fs::write(&file, b"").unwrap();
    h.service
        .add_folder(&root, FolderRoles::default())
        .await
        .unwrap();

    let changes = h.service.change_queue().clone();
    assert!(
        eventually(Duration::from_secs(10), || changes
            .get(&file)
            .is_some_and(|pending| pending.state == PendingState::Stabilizing))
        .await
    );

    std::fs::remove_file(&file).unwrap();
    assert!(eventually(Duration::from_secs(10), || changes.is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.hasher.calls.load(Ordering::SeqCst), 0);
    assert!(h.store.list_videos().await.unwrap().is_empty());
    h.service.shutdown().await;
}

#[tokio::test]
async fn folder_registration_is_idempotent() -> anyhow::Result<()> {
    let h = Harness::start(ScriptedProvider::default(), ScriptedHasher::default()).await;
    let root = h.root();

    let first = h.service.add_folder(&root, FolderRoles::default()).await?;
    let second = h.service.add_folder(&root, FolderRoles::default()).await?;
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(h.service.list_folders().await?.len(), 1);
    assert!(h.service.watcher().is_watching(&root));

    let missing = h
        .service
        .add_folder(Path::new("/does/not/exist"), FolderRoles::default())
        .await;
    assert!(matches!(missing, Err(MediaError::NotFound(_))));

    h.service.remove_folder(&root).await?;
    assert!(!h.service.watcher().is_watching(&root));
    assert!(matches!(
        h.service.remove_folder(&root).await,
        Err(MediaError::NotFound(_))
    ));

    h.service.shutdown().await;
    Ok(())
}
