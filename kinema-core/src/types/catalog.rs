use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EpisodeID, MovieID, VideoHash};

/// What a known content hash refers to in the external catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnownMedia {
    Movie {
        tmdb_id: u64,
    },
    Episode {
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    },
}

impl KnownMedia {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            KnownMedia::Movie { .. } => MediaKind::Movie,
            KnownMedia::Episode { .. } => MediaKind::Episode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => f.write_str("movie"),
            MediaKind::Episode => f.write_str("episode"),
        }
    }
}

/// Read-only catalog entry mapping a content hash to external ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHashEntry {
    pub hash: VideoHash,
    pub media: KnownMedia,
}

/// Stored media row a recognized video points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaLink {
    Movie {
        movie_id: MovieID,
        tmdb_id: u64,
    },
    Episode {
        episode_id: EpisodeID,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    },
}

/// Link between a video record and the media it was identified as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    pub video_hash: VideoHash,
    pub media: MediaLink,
    pub created_at: DateTime<Utc>,
}
