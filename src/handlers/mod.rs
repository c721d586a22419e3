// HTTP surface
pub mod analysis;
pub mod jobs;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use analysis::{analyze_video, get_results, FILES_ROUTE};
pub use jobs::{cancel_job, delete_job, get_job, list_jobs, submit_job};

/// Slack on top of the video limit for multipart framing.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.settings.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let files = ServeDir::new(&state.paths.results_root);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/hawkeye/analyze", post(analyze_video))
        .route("/api/hawkeye/results/{analysis_id}", get(get_results))
        .route("/api/hawkeye/jobs", post(submit_job).get(list_jobs))
        .route("/api/hawkeye/jobs/{id}", get(get_job).delete(delete_job))
        .route("/api/hawkeye/jobs/{id}/cancel", post(cancel_job))
        .nest_service(FILES_ROUTE, files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
