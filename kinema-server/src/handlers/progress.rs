//! Hashing progress queries.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use kinema_core::progress::ProgressEntry;
use kinema_core::scan::orchestration::job::JobId;
use serde::Serialize;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct ActiveResponse {
    pub active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIdsResponse {
    pub job_ids: Vec<JobId>,
}

fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse::<JobId>().map_err(AppError::from)
}

pub async fn active_handler(State(state): State<AppState>) -> Json<ActiveResponse> {
    Json(ActiveResponse {
        active: state.service().progress().has_active(),
    })
}

pub async fn jobs_handler(State(state): State<AppState>) -> Json<JobIdsResponse> {
    Json(JobIdsResponse {
        job_ids: state.service().progress().list_active(),
    })
}

pub async fn get_progress_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<ProgressEntry>> {
    let job_id = parse_job_id(&job_id)?;
    state
        .service()
        .progress()
        .get(job_id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no progress for job {job_id}")))
}

pub async fn delete_progress_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<StatusCode> {
    let job_id = parse_job_id(&job_id)?;
    if state.service().progress().remove(job_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("no progress for job {job_id}")))
    }
}
