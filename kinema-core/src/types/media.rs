use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EpisodeID, MovieID, SeriesID};

/// Natural key of a media item in the external catalog. Credits and
/// recommendations hang off this rather than internal row ids so enrichment
/// stays idempotent across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaKey {
    Movie {
        tmdb_id: u64,
    },
    Show {
        tmdb_id: u64,
    },
    Episode {
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    },
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKey::Movie { tmdb_id } => write!(f, "movie:{tmdb_id}"),
            MediaKey::Show { tmdb_id } => write!(f, "show:{tmdb_id}"),
            MediaKey::Episode {
                show_tmdb_id,
                season,
                episode,
            } => write!(f, "episode:{show_tmdb_id}:s{season}e{episode}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub tmdb_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieID,
    pub tmdb_id: u64,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<Genre>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub vote_average: Option<f32>,
    pub certification: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvShow {
    pub id: SeriesID,
    pub tmdb_id: u64,
    pub name: String,
    pub original_name: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub genres: Vec<Genre>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub certification: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvEpisode {
    pub id: EpisodeID,
    pub series_id: SeriesID,
    pub show_tmdb_id: u64,
    pub tmdb_id: u64,
    pub season: u32,
    pub episode: u32,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub air_date: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub still_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastCredit {
    pub person_tmdb_id: u64,
    pub name: String,
    pub character: Option<String>,
    pub order: Option<u32>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewCredit {
    pub person_tmdb_id: u64,
    pub name: String,
    pub job: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub tmdb_id: u64,
    pub title: String,
    pub poster_path: Option<String>,
    pub vote_average: Option<f32>,
}
