use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CastCredit, CrewCredit, Genre, MediaKey, Movie, Recommendation, TvEpisode,
    TvShow,
};

/// Movie rows keyed by TMDB id.
#[async_trait]
pub trait MovieRepository: Send + Sync {
    async fn movie_by_tmdb(&self, tmdb_id: u64) -> Result<Option<Movie>>;

    /// Insert or update by `tmdb_id`. The stored row keeps its original
    /// internal id; the returned value is what was persisted.
    async fn upsert_movie(&self, movie: Movie) -> Result<Movie>;

    async fn set_movie_certification(
        &self,
        tmdb_id: u64,
        certification: Option<String>,
    ) -> Result<()>;
}

/// TV show and episode rows.
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    async fn show_by_tmdb(&self, tmdb_id: u64) -> Result<Option<TvShow>>;

    async fn upsert_show(&self, show: TvShow) -> Result<TvShow>;

    async fn set_show_certification(
        &self,
        tmdb_id: u64,
        certification: Option<String>,
    ) -> Result<()>;

    async fn episode(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> Result<Option<TvEpisode>>;

    async fn upsert_episode(&self, episode: TvEpisode) -> Result<TvEpisode>;
}

#[async_trait]
pub trait GenreRepository: Send + Sync {
    async fn upsert_genres(&self, genres: &[Genre]) -> Result<()>;

    async fn list_genres(&self) -> Result<Vec<Genre>>;
}

/// Cast and crew per media item. Writes replace the full set so repeated
/// enrichment never duplicates rows.
#[async_trait]
pub trait CreditRepository: Send + Sync {
    async fn replace_credits(
        &self,
        media: MediaKey,
        cast: Vec<CastCredit>,
        crew: Vec<CrewCredit>,
    ) -> Result<()>;

    async fn cast_for(&self, media: MediaKey) -> Result<Vec<CastCredit>>;

    async fn crew_for(&self, media: MediaKey) -> Result<Vec<CrewCredit>>;
}

#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    async fn replace_recommendations(
        &self,
        media: MediaKey,
        recommendations: Vec<Recommendation>,
    ) -> Result<()>;

    async fn recommendations_for(
        &self,
        media: MediaKey,
    ) -> Result<Vec<Recommendation>>;
}
