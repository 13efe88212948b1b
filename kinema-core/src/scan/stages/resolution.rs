//! Metadata resolution for catalog matches.
//!
//! Steps one to three (fetch or reuse the media rows, then link the video)
//! decide the outcome. Enrichment afterwards is best effort: every call is
//! independent, failures are logged and never undo the link.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::unexpected_payload;
use crate::database::Repositories;
use crate::error::{MediaError, Result};
use crate::providers::{
    MetadataProvider, ProviderCredits, ProviderEpisode, ProviderError, ProviderMovie,
    ProviderShow,
};
use crate::scan::orchestration::events::PipelineOutcome;
use crate::scan::orchestration::job::{JobPayload, ResolveEpisodeJob, ResolveMovieJob};
use crate::scan::orchestration::queue::JobContext;
use crate::scan::orchestration::registry::{Stage, StageOutput};
use crate::types::{
    EpisodeID, MediaKey, MediaLink, Movie, MovieID, Recommendation, SeriesID,
    TvEpisode, TvShow,
};

/// Provider lookup where "no such id" is an answer, not an error.
async fn fetch_optional<T, F>(ctx: &JobContext, call: F) -> Result<Option<T>>
where
    F: Future<Output = std::result::Result<T, ProviderError>>,
{
    match ctx.guard(call).await {
        Ok(value) => Ok(Some(value)),
        Err(MediaError::Provider(err)) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

fn movie_row(details: ProviderMovie) -> Movie {
    Movie {
        id: MovieID::new(),
        tmdb_id: details.tmdb_id,
        title: details.title,
        original_title: details.original_title,
        overview: details.overview,
        release_date: details.release_date,
        runtime_minutes: details.runtime_minutes,
        genres: details.genres,
        poster_path: details.poster_path,
        backdrop_path: details.backdrop_path,
        vote_average: details.vote_average,
        certification: None,
        updated_at: Utc::now(),
    }
}

fn show_row(details: ProviderShow) -> TvShow {
    TvShow {
        id: SeriesID::new(),
        tmdb_id: details.tmdb_id,
        name: details.name,
        original_name: details.original_name,
        overview: details.overview,
        first_air_date: details.first_air_date,
        genres: details.genres,
        poster_path: details.poster_path,
        backdrop_path: details.backdrop_path,
        certification: None,
        updated_at: Utc::now(),
    }
}

fn episode_row(show: &TvShow, details: ProviderEpisode) -> TvEpisode {
    TvEpisode {
        id: EpisodeID::new(),
        series_id: show.id,
        show_tmdb_id: show.tmdb_id,
        tmdb_id: details.tmdb_id,
        season: details.season,
        episode: details.episode,
        name: details.name,
        overview: details.overview,
        air_date: details.air_date,
        runtime_minutes: details.runtime_minutes,
        still_path: details.still_path,
        updated_at: Utc::now(),
    }
}

/// Shared enrichment writers.
struct Enricher<'a> {
    ctx: &'a JobContext,
    repos: &'a Repositories,
}

impl Enricher<'_> {
    async fn credits(
        &self,
        media: MediaKey,
        fetched: Result<ProviderCredits>,
    ) {
        let credits = match fetched {
            Ok(credits) => credits,
            Err(err) => return skip(media, "credits", &err),
        };
        let (cast, crew) = (credits.cast.len(), credits.crew.len());
        let written = self
            .ctx
            .commit(self.repos.credits.replace_credits(media, credits.cast, credits.crew))
            .await;
        match written {
            Ok(()) => debug!(%media, cast, crew, "credits stored"),
            Err(err) => skip(media, "credits", &err),
        }
    }

    async fn recommendations(
        &self,
        media: MediaKey,
        fetched: Result<Vec<Recommendation>>,
    ) {
        let recommendations = match fetched {
            Ok(recommendations) => recommendations,
            Err(err) => return skip(media, "recommendations", &err),
        };
        let count = recommendations.len();
        let written = self
            .ctx
            .commit(
                self.repos
                    .recommendations
                    .replace_recommendations(media, recommendations),
            )
            .await;
        match written {
            Ok(()) => debug!(%media, count, "recommendations stored"),
            Err(err) => skip(media, "recommendations", &err),
        }
    }

    async fn certification<F>(&self, media: MediaKey, fetched: Result<Option<String>>, write: F)
    where
        F: Future<Output = Result<()>>,
    {
        let certification = match fetched {
            Ok(certification) => certification,
            Err(err) => return skip(media, "certification", &err),
        };
        if certification.is_none() {
            debug!(%media, "no certification for configured country");
        }
        if let Err(err) = self.ctx.commit(write).await {
            skip(media, "certification", &err);
        }
    }
}

fn skip(media: MediaKey, what: &str, err: &MediaError) {
    if err.is_cancelled() {
        debug!(%media, what, "enrichment skipped after cancellation");
    } else {
        warn!(%media, what, error = %err, "enrichment step failed");
    }
}

/// Resolves a movie match and links the video to it.
pub struct ResolveMovieStage {
    repos: Repositories,
    provider: Arc<dyn MetadataProvider>,
}

impl ResolveMovieStage {
    pub fn new(repos: Repositories, provider: Arc<dyn MetadataProvider>) -> Self {
        Self { repos, provider }
    }

    async fn ensure_movie(&self, ctx: &JobContext, tmdb_id: u64) -> Result<Option<Movie>> {
        if let Some(movie) = self.repos.movies.movie_by_tmdb(tmdb_id).await? {
            debug!(tmdb_id, "movie already stored");
            return Ok(Some(movie));
        }

        let Some(details) = fetch_optional(ctx, self.provider.get_movie_by_id(tmdb_id)).await?
        else {
            return Ok(None);
        };

        let movie = movie_row(details);
        let stored = ctx
            .commit(async {
                self.repos.genres.upsert_genres(&movie.genres).await?;
                self.repos.movies.upsert_movie(movie.clone()).await
            })
            .await?;
        info!(tmdb_id, title = %stored.title, "movie stored");
        Ok(Some(stored))
    }

    async fn enrich(&self, ctx: &JobContext, tmdb_id: u64) {
        let media = MediaKey::Movie { tmdb_id };
        let provider = &self.provider;
        let (credits, certification, recommendations) = tokio::join!(
            ctx.guard(provider.get_movie_credits(tmdb_id)),
            ctx.guard(provider.get_movie_certification(tmdb_id)),
            ctx.guard(provider.get_movie_recommendations(tmdb_id)),
        );

        let enricher = Enricher {
            ctx,
            repos: &self.repos,
        };
        enricher.credits(media, credits).await;
        let cert_value = certification.as_ref().ok().cloned().flatten();
        enricher
            .certification(
                media,
                certification,
                self.repos.movies.set_movie_certification(tmdb_id, cert_value),
            )
            .await;
        enricher.recommendations(media, recommendations).await;
    }

    async fn resolve(&self, ctx: &JobContext, job: &ResolveMovieJob) -> Result<StageOutput> {
        ctx.checkpoint()?;
        let Some(movie) = self.ensure_movie(ctx, job.tmdb_id).await? else {
            info!(tmdb_id = job.tmdb_id, "movie id unknown to provider");
            return Ok(StageOutput::terminal(PipelineOutcome::Unrecognized {
                path: job.path.clone(),
                hash: job.hash.clone(),
            }));
        };

        let link = MediaLink::Movie {
            movie_id: movie.id,
            tmdb_id: movie.tmdb_id,
        };
        let cross_ref = ctx
            .commit(self.repos.videos.mark_recognized(&job.hash, link))
            .await?;
        info!(hash = %job.hash, title = %movie.title, "video recognized as movie");

        self.enrich(ctx, job.tmdb_id).await;

        Ok(StageOutput::terminal(PipelineOutcome::Recognized {
            path: job.path.clone(),
            hash: job.hash.clone(),
            media: cross_ref.media,
        }))
    }
}

#[async_trait]
impl Stage for ResolveMovieStage {
    fn name(&self) -> &'static str {
        "resolve_movie"
    }

    async fn run(&self, ctx: &JobContext, payload: &JobPayload) -> Result<StageOutput> {
        match payload {
            JobPayload::ResolveMovie(job) => self.resolve(ctx, job).await,
            other => Err(unexpected_payload(self.name(), other)),
        }
    }
}

/// Resolves a TV episode match: show row, then episode row, then the link.
pub struct ResolveEpisodeStage {
    repos: Repositories,
    provider: Arc<dyn MetadataProvider>,
}

impl ResolveEpisodeStage {
    pub fn new(repos: Repositories, provider: Arc<dyn MetadataProvider>) -> Self {
        Self { repos, provider }
    }

    async fn ensure_show(&self, ctx: &JobContext, tmdb_id: u64) -> Result<Option<TvShow>> {
        if let Some(show) = self.repos.series.show_by_tmdb(tmdb_id).await? {
            return Ok(Some(show));
        }

        let Some(details) = fetch_optional(ctx, self.provider.get_tv_show_by_id(tmdb_id)).await?
        else {
            return Ok(None);
        };

        let show = show_row(details);
        let stored = ctx
            .commit(async {
                self.repos.genres.upsert_genres(&show.genres).await?;
                self.repos.series.upsert_show(show.clone()).await
            })
            .await?;
        info!(tmdb_id, name = %stored.name, "show stored");
        Ok(Some(stored))
    }

    async fn ensure_episode(
        &self,
        ctx: &JobContext,
        show: &TvShow,
        season: u32,
        episode: u32,
    ) -> Result<Option<TvEpisode>> {
        if let Some(row) = self.repos.series.episode(show.tmdb_id, season, episode).await? {
            return Ok(Some(row));
        }

        let Some(details) = fetch_optional(
            ctx,
            self.provider.get_tv_episode_by_id(show.tmdb_id, season, episode),
        )
        .await?
        else {
            return Ok(None);
        };

        let row = episode_row(show, details);
        let stored = ctx.commit(self.repos.series.upsert_episode(row)).await?;
        info!(show = show.tmdb_id, season, episode, "episode stored");
        Ok(Some(stored))
    }

    async fn enrich(&self, ctx: &JobContext, job: &ResolveEpisodeJob) {
        let show_key = MediaKey::Show {
            tmdb_id: job.show_tmdb_id,
        };
        let episode_key = MediaKey::Episode {
            show_tmdb_id: job.show_tmdb_id,
            season: job.season,
            episode: job.episode,
        };
        let provider = &self.provider;
        let (show_credits, episode_credits, certification, recommendations) = tokio::join!(
            ctx.guard(provider.get_tv_show_credits(job.show_tmdb_id)),
            ctx.guard(provider.get_tv_episode_credits(job.show_tmdb_id, job.season, job.episode)),
            ctx.guard(provider.get_tv_certification(job.show_tmdb_id)),
            ctx.guard(provider.get_tv_recommendations(job.show_tmdb_id)),
        );

        let enricher = Enricher {
            ctx,
            repos: &self.repos,
        };
        enricher.credits(show_key, show_credits).await;
        enricher.credits(episode_key, episode_credits).await;
        let cert_value = certification.as_ref().ok().cloned().flatten();
        enricher
            .certification(
                show_key,
                certification,
                self.repos
                    .series
                    .set_show_certification(job.show_tmdb_id, cert_value),
            )
            .await;
        enricher.recommendations(show_key, recommendations).await;
    }

    async fn resolve(&self, ctx: &JobContext, job: &ResolveEpisodeJob) -> Result<StageOutput> {
        ctx.checkpoint()?;
        let unrecognized = || {
            StageOutput::terminal(PipelineOutcome::Unrecognized {
                path: job.path.clone(),
                hash: job.hash.clone(),
            })
        };

        let Some(show) = self.ensure_show(ctx, job.show_tmdb_id).await? else {
            info!(show = job.show_tmdb_id, "show id unknown to provider");
            return Ok(unrecognized());
        };
        let Some(episode) = self
            .ensure_episode(ctx, &show, job.season, job.episode)
            .await?
        else {
            info!(
                show = job.show_tmdb_id,
                season = job.season,
                episode = job.episode,
                "episode unknown to provider"
            );
            return Ok(unrecognized());
        };

        let link = MediaLink::Episode {
            episode_id: episode.id,
            show_tmdb_id: show.tmdb_id,
            season: episode.season,
            episode: episode.episode,
        };
        let cross_ref = ctx
            .commit(self.repos.videos.mark_recognized(&job.hash, link))
            .await?;
        info!(
            hash = %job.hash,
            show = %show.name,
            season = episode.season,
            episode = episode.episode,
            "video recognized as episode"
        );

        self.enrich(ctx, job).await;

        Ok(StageOutput::terminal(PipelineOutcome::Recognized {
            path: job.path.clone(),
            hash: job.hash.clone(),
            media: cross_ref.media,
        }))
    }
}

#[async_trait]
impl Stage for ResolveEpisodeStage {
    fn name(&self) -> &'static str {
        "resolve_episode"
    }

    async fn run(&self, ctx: &JobContext, payload: &JobPayload) -> Result<StageOutput> {
        match payload {
            JobPayload::ResolveEpisode(job) => self.resolve(ctx, job).await,
            other => Err(unexpected_payload(self.name(), other)),
        }
    }
}
