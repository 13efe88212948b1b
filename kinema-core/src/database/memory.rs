use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;

use crate::database::ports::{
    CreditRepository, FolderRepository, GenreRepository, KnownHashRepository,
    MovieRepository, RecommendationRepository, SeriesRepository, VideoRepository,
};
use crate::error::{MediaError, Result};
use crate::types::{
    CastCredit, CrewCredit, CrossReference, Genre, KnownHashEntry, MediaKey,
    MediaLink, Movie, Recommendation, TvEpisode, TvShow, VideoHash, VideoRecord,
    WatchedFolder,
};

#[derive(Default)]
struct VideoTables {
    videos: HashMap<VideoHash, VideoRecord>,
    cross_refs: HashMap<VideoHash, CrossReference>,
}

/// Process-local store backing every repository port.
///
/// Videos and cross references share one lock so that linking a video and
/// flipping its `recognized` flag is observed as a single change.
#[derive(Default)]
pub struct InMemoryStore {
    video_tables: RwLock<VideoTables>,
    known: DashMap<VideoHash, KnownHashEntry>,
    movies: DashMap<u64, Movie>,
    shows: DashMap<u64, TvShow>,
    episodes: DashMap<(u64, u32, u32), TvEpisode>,
    genres: DashMap<u64, Genre>,
    cast: DashMap<MediaKey, Vec<CastCredit>>,
    crew: DashMap<MediaKey, Vec<CrewCredit>>,
    recommendations: DashMap<MediaKey, Vec<Recommendation>>,
    folders: DashMap<PathBuf, WatchedFolder>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.video_tables.read();
        f.debug_struct("InMemoryStore")
            .field("videos", &tables.videos.len())
            .field("cross_refs", &tables.cross_refs.len())
            .field("known", &self.known.len())
            .field("movies", &self.movies.len())
            .field("shows", &self.shows.len())
            .field("episodes", &self.episodes.len())
            .field("folders", &self.folders.len())
            .finish()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for InMemoryStore {
    async fn get_video(&self, hash: &VideoHash) -> Result<Option<VideoRecord>> {
        Ok(self.video_tables.read().videos.get(hash).cloned())
    }

    async fn upsert_video(&self, record: VideoRecord) -> Result<VideoRecord> {
        let mut tables = self.video_tables.write();
        let stored = match tables.videos.get(&record.hash) {
            Some(existing) => VideoRecord {
                recognized: existing.recognized,
                created_at: existing.created_at,
                updated_at: Utc::now(),
                ..record
            },
            None => record,
        };
        tables.videos.insert(stored.hash.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete_video(&self, hash: &VideoHash) -> Result<bool> {
        let mut tables = self.video_tables.write();
        tables.cross_refs.remove(hash);
        Ok(tables.videos.remove(hash).is_some())
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let mut videos: Vec<VideoRecord> =
            self.video_tables.read().videos.values().cloned().collect();
        videos.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(videos)
    }

    async fn mark_recognized(
        &self,
        hash: &VideoHash,
        media: MediaLink,
    ) -> Result<CrossReference> {
        let mut tables = self.video_tables.write();
        let tables = &mut *tables;

        let Some(video) = tables.videos.get_mut(hash) else {
            return Err(MediaError::NotFound(format!(
                "no video record for hash {hash}"
            )));
        };

        if let Some(existing) = tables.cross_refs.get(hash) {
            video.recognized = true;
            return Ok(existing.clone());
        }

        let cross_ref = CrossReference {
            video_hash: hash.clone(),
            media,
            created_at: Utc::now(),
        };
        tables.cross_refs.insert(hash.clone(), cross_ref.clone());
        video.recognized = true;
        video.updated_at = Utc::now();
        Ok(cross_ref)
    }

    async fn cross_reference(
        &self,
        hash: &VideoHash,
    ) -> Result<Option<CrossReference>> {
        Ok(self.video_tables.read().cross_refs.get(hash).cloned())
    }
}

#[async_trait]
impl KnownHashRepository for InMemoryStore {
    async fn lookup(&self, hash: &VideoHash) -> Result<Option<KnownHashEntry>> {
        Ok(self.known.get(hash).map(|entry| entry.clone()))
    }

    async fn insert_known(&self, entry: KnownHashEntry) -> Result<()> {
        self.known.insert(entry.hash.clone(), entry);
        Ok(())
    }

    async fn known_count(&self) -> Result<usize> {
        Ok(self.known.len())
    }
}

#[async_trait]
impl MovieRepository for InMemoryStore {
    async fn movie_by_tmdb(&self, tmdb_id: u64) -> Result<Option<Movie>> {
        Ok(self.movies.get(&tmdb_id).map(|movie| movie.clone()))
    }

    async fn upsert_movie(&self, movie: Movie) -> Result<Movie> {
        let stored = match self.movies.entry(movie.tmdb_id) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let next = Movie {
                    id: current.id,
                    certification: movie
                        .certification
                        .or_else(|| current.certification.clone()),
                    updated_at: Utc::now(),
                    ..movie
                };
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(movie.clone());
                movie
            }
        };
        Ok(stored)
    }

    async fn set_movie_certification(
        &self,
        tmdb_id: u64,
        certification: Option<String>,
    ) -> Result<()> {
        match self.movies.get_mut(&tmdb_id) {
            Some(mut movie) => {
                movie.certification = certification;
                movie.updated_at = Utc::now();
                Ok(())
            }
            None => Err(MediaError::NotFound(format!("movie {tmdb_id}"))),
        }
    }
}

#[async_trait]
impl SeriesRepository for InMemoryStore {
    async fn show_by_tmdb(&self, tmdb_id: u64) -> Result<Option<TvShow>> {
        Ok(self.shows.get(&tmdb_id).map(|show| show.clone()))
    }

    async fn upsert_show(&self, show: TvShow) -> Result<TvShow> {
        let stored = match self.shows.entry(show.tmdb_id) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let next = TvShow {
                    id: current.id,
                    certification: show
                        .certification
                        .or_else(|| current.certification.clone()),
                    updated_at: Utc::now(),
                    ..show
                };
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(show.clone());
                show
            }
        };
        Ok(stored)
    }

    async fn set_show_certification(
        &self,
        tmdb_id: u64,
        certification: Option<String>,
    ) -> Result<()> {
        match self.shows.get_mut(&tmdb_id) {
            Some(mut show) => {
                show.certification = certification;
                show.updated_at = Utc::now();
                Ok(())
            }
            None => Err(MediaError::NotFound(format!("show {tmdb_id}"))),
        }
    }

    async fn episode(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<TvEpisode>> {
        Ok(self
            .episodes
            .get(&(show_tmdb_id, season, episode))
            .map(|row| row.clone()))
    }

    async fn upsert_episode(&self, episode: TvEpisode) -> Result<TvEpisode> {
        let key = (episode.show_tmdb_id, episode.season, episode.episode);
        let stored = match self.episodes.entry(key) {
            Entry::Occupied(mut occupied) => {
                let next = TvEpisode {
                    id: occupied.get().id,
                    updated_at: Utc::now(),
                    ..episode
                };
                occupied.insert(next.clone());
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(episode.clone());
                episode
            }
        };
        Ok(stored)
    }
}

#[async_trait]
impl GenreRepository for InMemoryStore {
    async fn upsert_genres(&self, genres: &[Genre]) -> Result<()> {
        for genre in genres {
            self.genres.insert(genre.tmdb_id, genre.clone());
        }
        Ok(())
    }

    async fn list_genres(&self) -> Result<Vec<Genre>> {
        let mut genres: Vec<Genre> =
            self.genres.iter().map(|g| g.value().clone()).collect();
        genres.sort_by_key(|g| g.tmdb_id);
        Ok(genres)
    }
}

#[async_trait]
impl CreditRepository for InMemoryStore {
    async fn replace_credits(
        &self,
        media: MediaKey,
        cast: Vec<CastCredit>,
        crew: Vec<CrewCredit>,
    ) -> Result<()> {
        self.cast.insert(media, cast);
        self.crew.insert(media, crew);
        Ok(())
    }

    async fn cast_for(&self, media: MediaKey) -> Result<Vec<CastCredit>> {
        Ok(self.cast.get(&media).map(|c| c.clone()).unwrap_or_default())
    }

    async fn crew_for(&self, media: MediaKey) -> Result<Vec<CrewCredit>> {
        Ok(self.crew.get(&media).map(|c| c.clone()).unwrap_or_default())
    }
}

#[async_trait]
impl RecommendationRepository for InMemoryStore {
    async fn replace_recommendations(
        &self,
        media: MediaKey,
        recommendations: Vec<Recommendation>,
    ) -> Result<()> {
        self.recommendations.insert(media, recommendations);
        Ok(())
    }

    async fn recommendations_for(
        &self,
        media: MediaKey,
    ) -> Result<Vec<Recommendation>> {
        Ok(self
            .recommendations
            .get(&media)
            .map(|r| r.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl FolderRepository for InMemoryStore {
    async fn list_folders(&self) -> Result<Vec<WatchedFolder>> {
        let mut folders: Vec<WatchedFolder> =
            self.folders.iter().map(|f| f.value().clone()).collect();
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(folders)
    }

    async fn folder_by_path(&self, path: &Path) -> Result<Option<WatchedFolder>> {
        Ok(self.folders.get(path).map(|f| f.clone()))
    }

    async fn insert_folder(&self, folder: WatchedFolder) -> Result<WatchedFolder> {
        match self.folders.entry(folder.path.clone()) {
            Entry::Occupied(_) => Err(MediaError::Conflict(format!(
                "folder {} is already registered",
                folder.path.display()
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(folder.clone());
                Ok(folder)
            }
        }
    }

    async fn delete_folder(&self, path: &Path) -> Result<bool> {
        Ok(self.folders.remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentDigests, MovieID};

    fn hash(raw: &str) -> VideoHash {
        VideoHash::parse(raw).unwrap()
    }

    fn record(h: &str) -> VideoRecord {
        VideoRecord::unrecognized(
            ContentDigests {
                ed2k: hash(h),
                crc32: "352441c2".into(),
                md5: "900150983cd24fb0d6963f7d28e17f72".into(),
                sha1: "a9993e364706816aba3e25717850c26c9cd0d89d".into(),
            },
            3,
            PathBuf::from("/media/a.mkv"),
        )
    }

    fn movie(tmdb_id: u64, title: &str) -> Movie {
        Movie {
            id: MovieID::new(),
            tmdb_id,
            title: title.into(),
            original_title: None,
            overview: None,
            release_date: None,
            runtime_minutes: None,
            genres: Vec::new(),
            poster_path: None,
            backdrop_path: None,
            vote_average: None,
            certification: None,
            updated_at: Utc::now(),
        }
    }

    const H: &str = "5d886780825db91bbc390f10f1b6c95c";

    #[tokio::test]
    async fn upsert_video_keeps_recognized_flag() {
        let store = InMemoryStore::new();
        store.upsert_video(record(H)).await.unwrap();
        let stored_movie = store.upsert_movie(movie(348, "Alien")).await.unwrap();
        store
            .mark_recognized(
                &hash(H),
                MediaLink::Movie {
                    movie_id: stored_movie.id,
                    tmdb_id: 348,
                },
            )
            .await
            .unwrap();

        let mut again = record(H);
        again.last_path = PathBuf::from("/media/renamed.mkv");
        let stored = store.upsert_video(again).await.unwrap();

        assert!(stored.recognized);
        assert_eq!(stored.last_path, PathBuf::from("/media/renamed.mkv"));
        assert_eq!(store.list_videos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_recognized_is_idempotent() {
        let store = InMemoryStore::new();
        store.upsert_video(record(H)).await.unwrap();
        let link = MediaLink::Movie {
            movie_id: MovieID::new(),
            tmdb_id: 348,
        };

        let first = store.mark_recognized(&hash(H), link).await.unwrap();
        let second = store
            .mark_recognized(
                &hash(H),
                MediaLink::Movie {
                    movie_id: MovieID::new(),
                    tmdb_id: 999,
                },
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(store.get_video(&hash(H)).await.unwrap().unwrap().recognized);
    }

    #[tokio::test]
    async fn mark_recognized_requires_video() {
        let store = InMemoryStore::new();
        let err = store
            .mark_recognized(
                &hash(H),
                MediaLink::Movie {
                    movie_id: MovieID::new(),
                    tmdb_id: 348,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NotFound(_)));
        assert!(store.cross_reference(&hash(H)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_movie_returns_stable_id() {
        let store = InMemoryStore::new();
        let first = store.upsert_movie(movie(348, "Alien")).await.unwrap();
        let second = store.upsert_movie(movie(348, "Alien (1979)")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Alien (1979)");
    }

    #[tokio::test]
    async fn replacing_credits_does_not_duplicate() {
        let store = InMemoryStore::new();
        let key = MediaKey::Movie { tmdb_id: 348 };
        let cast = vec![CastCredit {
            person_tmdb_id: 10205,
            name: "Sigourney Weaver".into(),
            character: Some("Ripley".into()),
            order: Some(0),
            profile_path: None,
        }];
        store.replace_credits(key, cast.clone(), Vec::new()).await.unwrap();
        store.replace_credits(key, cast, Vec::new()).await.unwrap();
        assert_eq!(store.cast_for(key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn folder_paths_are_unique() {
        let store = InMemoryStore::new();
        let folder = WatchedFolder {
            id: crate::types::FolderID::new(),
            path: PathBuf::from("/media/movies"),
            roles: Default::default(),
            created_at: Utc::now(),
        };
        store.insert_folder(folder.clone()).await.unwrap();
        let err = store.insert_folder(folder).await.unwrap_err();
        assert!(matches!(err, MediaError::Conflict(_)));
        assert!(store.delete_folder(Path::new("/media/movies")).await.unwrap());
        assert!(store.list_folders().await.unwrap().is_empty());
    }
}
