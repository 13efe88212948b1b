use std::path::PathBuf;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use kinema_core::scan::orchestration::job::{JobIdentity, JobKind, JobState};
use serde::{Deserialize, Serialize};

use crate::infra::app_state::AppState;
use crate::infra::errors::AppResult;

#[derive(Debug, Deserialize)]
pub struct JobPathQuery {
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub identity: String,
    pub kind: JobKind,
    pub path: PathBuf,
    /// `None` when no job with this identity is scheduled or running.
    pub state: Option<JobState>,
}

pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<JobPathQuery>,
) -> AppResult<Json<JobStatusResponse>> {
    let kind: JobKind = kind.parse()?;
    let identity = JobIdentity::new(kind, &query.path);
    let status = state.service().job_status(kind, &identity.path).await;

    Ok(Json(JobStatusResponse {
        identity: identity.to_string(),
        kind,
        path: identity.path,
        state: status,
    }))
}
