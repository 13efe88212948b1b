use async_trait::async_trait;

use super::ProviderError;
use super::models::{ProviderCredits, ProviderEpisode, ProviderMovie, ProviderShow};
use crate::types::Recommendation;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Read-only access to the external metadata catalog.
///
/// Every call is independent and may fail; callers decide which failures are
/// fatal. A missing id surfaces as [`ProviderError::NotFound`].
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_movie_by_id(&self, tmdb_id: u64) -> ProviderResult<ProviderMovie>;

    async fn get_movie_credits(&self, tmdb_id: u64)
    -> ProviderResult<ProviderCredits>;

    async fn get_movie_recommendations(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Vec<Recommendation>>;

    /// Certification for the configured country, `None` when the provider
    /// has no rating for it.
    async fn get_movie_certification(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Option<String>>;

    async fn get_tv_show_by_id(&self, tmdb_id: u64) -> ProviderResult<ProviderShow>;

    async fn get_tv_episode_by_id(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> ProviderResult<ProviderEpisode>;

    async fn get_tv_show_credits(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<ProviderCredits>;

    async fn get_tv_episode_credits(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> ProviderResult<ProviderCredits>;

    async fn get_tv_certification(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Option<String>>;

    async fn get_tv_recommendations(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Vec<Recommendation>>;
}
