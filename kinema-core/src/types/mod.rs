pub mod catalog;
pub mod folder;
pub mod ids;
pub mod media;
pub mod video;

pub use catalog::{CrossReference, KnownHashEntry, KnownMedia, MediaKind, MediaLink};
pub use folder::{FolderRoles, WatchedFolder};
pub use ids::{EpisodeID, FolderID, MovieID, SeriesID, VideoHash};
pub use media::{
    CastCredit, CrewCredit, Genre, MediaKey, Movie, Recommendation, TvEpisode,
    TvShow,
};
pub use video::{ContentDigests, VideoRecord};
