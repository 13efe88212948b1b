use axum::{
    Router,
    routing::get,
};

use crate::handlers::{folders, jobs, progress, videos};
use crate::infra::app_state::AppState;

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/folders",
            get(folders::list_folders_handler)
                .post(folders::add_folder_handler)
                .delete(folders::remove_folder_handler),
        )
        .merge(create_progress_routes())
        .route("/videos/{hash}", get(videos::get_video_handler))
        .route("/jobs/{kind}", get(jobs::job_status_handler))
}

fn create_progress_routes() -> Router<AppState> {
    Router::new()
        .route("/progress/active", get(progress::active_handler))
        .route("/progress/jobs", get(progress::jobs_handler))
        .route(
            "/progress/{job_id}",
            get(progress::get_progress_handler).delete(progress::delete_progress_handler),
        )
}
