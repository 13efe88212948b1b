pub mod memory;
pub mod ports;
pub mod seed;

use std::fmt;
use std::sync::Arc;

pub use memory::InMemoryStore;
use ports::{
    CreditRepository, FolderRepository, GenreRepository, KnownHashRepository,
    MovieRepository, RecommendationRepository, SeriesRepository, VideoRepository,
};

/// Handles to every repository port, cloned into the stages that need them.
#[derive(Clone)]
pub struct Repositories {
    pub videos: Arc<dyn VideoRepository>,
    pub known: Arc<dyn KnownHashRepository>,
    pub movies: Arc<dyn MovieRepository>,
    pub series: Arc<dyn SeriesRepository>,
    pub genres: Arc<dyn GenreRepository>,
    pub credits: Arc<dyn CreditRepository>,
    pub recommendations: Arc<dyn RecommendationRepository>,
    pub folders: Arc<dyn FolderRepository>,
}

impl Repositories {
    /// Wire every port to the same in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            videos: store.clone(),
            known: store.clone(),
            movies: store.clone(),
            series: store.clone(),
            genres: store.clone(),
            credits: store.clone(),
            recommendations: store.clone(),
            folders: store,
        }
    }
}

impl fmt::Debug for Repositories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
