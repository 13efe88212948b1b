pub mod catalog;
pub mod folders;
pub mod media;
pub mod videos;

pub use catalog::KnownHashRepository;
pub use folders::FolderRepository;
pub use media::{
    CreditRepository, GenreRepository, MovieRepository, RecommendationRepository,
    SeriesRepository,
};
pub use videos::VideoRepository;
