pub mod models;
pub mod tmdb;
pub mod traits;

use thiserror::Error;

pub use models::{ProviderCredits, ProviderEpisode, ProviderMovie, ProviderShow};
pub use tmdb::TmdbProvider;
pub use traits::{MetadataProvider, ProviderResult};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound)
    }
}
