//! TMDB (The Movie Database) client implementing [`MetadataProvider`].
//!
//! Base URL defaults to `https://api.themoviedb.org/3`. The key may be either
//! a v3 API key (sent as `api_key` query parameter) or a v4 read access token
//! (sent as a bearer header).

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::ProviderError;
use super::models::{ProviderCredits, ProviderEpisode, ProviderMovie, ProviderShow};
use super::traits::{MetadataProvider, ProviderResult};
use crate::config::ProviderConfig;
use crate::types::{CastCredit, CrewCredit, Genre, Recommendation};

/// Theatrical release type in TMDB release date listings.
const RELEASE_TYPE_THEATRICAL: u8 = 3;

pub struct TmdbProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
    certification_country: String,
}

impl fmt::Debug for TmdbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TmdbProvider")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("certification_country", &self.certification_country)
            .finish_non_exhaustive()
    }
}

impl TmdbProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("kinema/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            certification_country: config.certification_country.clone(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn uses_bearer_token(&self) -> bool {
        // v4 read access tokens are JWTs
        self.api_key.starts_with("eyJ")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        if !self.has_api_key() {
            return Err(ProviderError::InvalidApiKey);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "TMDB request");

        let mut request = self
            .client
            .get(&url)
            .query(&[("language", self.language.as_str())]);
        request = if self.uses_bearer_token() {
            request.bearer_auth(&self.api_key)
        } else {
            request.query(&[("api_key", self.api_key.as_str())])
        };

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        match status {
            StatusCode::NOT_FOUND => return Err(ProviderError::NotFound),
            StatusCode::UNAUTHORIZED => return Err(ProviderError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(%url, "TMDB rate limit hit");
                return Err(ProviderError::RateLimited);
            }
            _ => {}
        }

        let body = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            let message = serde_json::from_str::<TmdbStatus>(&body)
                .ok()
                .and_then(|s| s.status_message)
                .unwrap_or(body);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|err| ProviderError::Parse(format!("{path}: {err}")))
    }

    fn pick_movie_certification(&self, dates: TmdbReleaseDates) -> Option<String> {
        let country = dates
            .results
            .into_iter()
            .find(|r| r.iso_3166_1.eq_ignore_ascii_case(&self.certification_country))?;

        let mut certified: Vec<TmdbReleaseDate> = country
            .release_dates
            .into_iter()
            .filter(|d| d.certification.as_deref().is_some_and(|c| !c.trim().is_empty()))
            .collect();
        certified.sort_by_key(|d| d.release_type != Some(RELEASE_TYPE_THEATRICAL));
        certified
            .into_iter()
            .next()
            .and_then(|d| d.certification)
            .map(|c| c.trim().to_string())
    }

    fn pick_tv_certification(&self, ratings: TmdbContentRatings) -> Option<String> {
        ratings
            .results
            .into_iter()
            .find(|r| r.iso_3166_1.eq_ignore_ascii_case(&self.certification_country))
            .map(|r| r.rating.trim().to_string())
            .filter(|r| !r.is_empty())
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err)
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    async fn get_movie_by_id(&self, tmdb_id: u64) -> ProviderResult<ProviderMovie> {
        let movie: TmdbMovie = self.get_json(&format!("/movie/{tmdb_id}")).await?;
        Ok(movie.into())
    }

    async fn get_movie_credits(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<ProviderCredits> {
        let credits: TmdbCredits =
            self.get_json(&format!("/movie/{tmdb_id}/credits")).await?;
        Ok(credits.into())
    }

    async fn get_movie_recommendations(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Vec<Recommendation>> {
        let page: TmdbPage<TmdbRecommendation> = self
            .get_json(&format!("/movie/{tmdb_id}/recommendations"))
            .await?;
        Ok(page.results.into_iter().map(Into::into).collect())
    }

    async fn get_movie_certification(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Option<String>> {
        let dates: TmdbReleaseDates = self
            .get_json(&format!("/movie/{tmdb_id}/release_dates"))
            .await?;
        Ok(self.pick_movie_certification(dates))
    }

    async fn get_tv_show_by_id(&self, tmdb_id: u64) -> ProviderResult<ProviderShow> {
        let show: TmdbShow = self.get_json(&format!("/tv/{tmdb_id}")).await?;
        Ok(show.into())
    }

    async fn get_tv_episode_by_id(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> ProviderResult<ProviderEpisode> {
        let ep: TmdbEpisode = self
            .get_json(&format!(
                "/tv/{show_tmdb_id}/season/{season}/episode/{episode}"
            ))
            .await?;
        Ok(ep.into())
    }

    async fn get_tv_show_credits(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<ProviderCredits> {
        let credits: TmdbCredits =
            self.get_json(&format!("/tv/{tmdb_id}/credits")).await?;
        Ok(credits.into())
    }

    async fn get_tv_episode_credits(
        &self,
        show_tmdb_id: u64,
        season: u32,
        episode: u32,
    ) -> ProviderResult<ProviderCredits> {
        let credits: TmdbCredits = self
            .get_json(&format!(
                "/tv/{show_tmdb_id}/season/{season}/episode/{episode}/credits"
            ))
            .await?;
        Ok(credits.into())
    }

    async fn get_tv_certification(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Option<String>> {
        let ratings: TmdbContentRatings = self
            .get_json(&format!("/tv/{tmdb_id}/content_ratings"))
            .await?;
        Ok(self.pick_tv_certification(ratings))
    }

    async fn get_tv_recommendations(
        &self,
        tmdb_id: u64,
    ) -> ProviderResult<Vec<Recommendation>> {
        let page: TmdbPage<TmdbRecommendation> = self
            .get_json(&format!("/tv/{tmdb_id}/recommendations"))
            .await?;
        Ok(page.results.into_iter().map(Into::into).collect())
    }
}

// Wire formats

#[derive(Debug, Deserialize)]
struct TmdbStatus {
    status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    id: u64,
    name: String,
}

impl From<TmdbGenre> for Genre {
    fn from(g: TmdbGenre) -> Self {
        Genre {
            tmdb_id: g.id,
            name: g.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    id: u64,
    title: String,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    runtime: Option<u32>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f32>,
}

impl From<TmdbMovie> for ProviderMovie {
    fn from(m: TmdbMovie) -> Self {
        ProviderMovie {
            tmdb_id: m.id,
            title: m.title,
            original_title: m.original_title,
            overview: non_empty(m.overview),
            release_date: non_empty(m.release_date),
            runtime_minutes: m.runtime.filter(|r| *r > 0),
            genres: m.genres.into_iter().map(Into::into).collect(),
            poster_path: m.poster_path,
            backdrop_path: m.backdrop_path,
            vote_average: m.vote_average,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbShow {
    id: u64,
    name: String,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
}

impl From<TmdbShow> for ProviderShow {
    fn from(s: TmdbShow) -> Self {
        ProviderShow {
            tmdb_id: s.id,
            name: s.name,
            original_name: s.original_name,
            overview: non_empty(s.overview),
            first_air_date: non_empty(s.first_air_date),
            genres: s.genres.into_iter().map(Into::into).collect(),
            poster_path: s.poster_path,
            backdrop_path: s.backdrop_path,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbEpisode {
    id: u64,
    season_number: u32,
    episode_number: u32,
    name: Option<String>,
    overview: Option<String>,
    air_date: Option<String>,
    runtime: Option<u32>,
    still_path: Option<String>,
}

impl From<TmdbEpisode> for ProviderEpisode {
    fn from(e: TmdbEpisode) -> Self {
        ProviderEpisode {
            tmdb_id: e.id,
            season: e.season_number,
            episode: e.episode_number,
            name: non_empty(e.name),
            overview: non_empty(e.overview),
            air_date: non_empty(e.air_date),
            runtime_minutes: e.runtime.filter(|r| *r > 0),
            still_path: e.still_path,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbCredits {
    #[serde(default)]
    cast: Vec<TmdbCastMember>,
    #[serde(default)]
    crew: Vec<TmdbCrewMember>,
    /// Present on episode credits only.
    #[serde(default)]
    guest_stars: Vec<TmdbCastMember>,
}

#[derive(Debug, Deserialize)]
struct TmdbCastMember {
    id: u64,
    name: String,
    character: Option<String>,
    order: Option<u32>,
    profile_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbCrewMember {
    id: u64,
    name: String,
    job: String,
    department: Option<String>,
}

impl From<TmdbCredits> for ProviderCredits {
    fn from(c: TmdbCredits) -> Self {
        let cast = c
            .cast
            .into_iter()
            .chain(c.guest_stars)
            .map(|m| CastCredit {
                person_tmdb_id: m.id,
                name: m.name,
                character: non_empty(m.character),
                order: m.order,
                profile_path: m.profile_path,
            })
            .collect();
        let crew = c
            .crew
            .into_iter()
            .map(|m| CrewCredit {
                person_tmdb_id: m.id,
                name: m.name,
                job: m.job,
                department: m.department,
            })
            .collect();
        ProviderCredits { cast, crew }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbRecommendation {
    id: u64,
    /// Movies carry `title`, shows carry `name`.
    #[serde(alias = "name")]
    title: String,
    poster_path: Option<String>,
    vote_average: Option<f32>,
}

impl From<TmdbRecommendation> for Recommendation {
    fn from(r: TmdbRecommendation) -> Self {
        Recommendation {
            tmdb_id: r.id,
            title: r.title,
            poster_path: r.poster_path,
            vote_average: r.vote_average,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbReleaseDates {
    #[serde(default)]
    results: Vec<TmdbReleaseDateResult>,
}

#[derive(Debug, Deserialize)]
struct TmdbReleaseDateResult {
    iso_3166_1: String,
    #[serde(default)]
    release_dates: Vec<TmdbReleaseDate>,
}

#[derive(Debug, Deserialize)]
struct TmdbReleaseDate {
    certification: Option<String>,
    #[serde(rename = "type")]
    release_type: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct TmdbContentRatings {
    #[serde(default)]
    results: Vec<TmdbContentRating>,
}

#[derive(Debug, Deserialize)]
struct TmdbContentRating {
    iso_3166_1: String,
    rating: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
