// Background analysis job endpoints

use super::analysis::persist_upload;
use crate::analysis::receive_video;
use crate::error::AnalysisError;
use crate::models::{AnalysisJob, ApiResponse};
use crate::state::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct DeleteJobQuery {
    #[serde(default)]
    pub delete_output: bool,
}

pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AnalysisError> {
    let policy = state.upload_policy();
    let video = receive_video(&mut multipart, &policy).await?;
    let upload = persist_upload(&state, video, policy).await?;

    let job = state.jobs.submit(upload)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(
            "Hawk-Eye analysis queued",
            serde_json::json!({ "job_id": job.id, "status": job.status }),
        )),
    ))
}

pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<AnalysisJob>>>, AnalysisError> {
    Ok(Json(ApiResponse::data(state.jobs.list()?)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<AnalysisJob>>, AnalysisError> {
    Ok(Json(ApiResponse::data(state.jobs.get(&job_id)?)))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<AnalysisJob>>, AnalysisError> {
    let job = state.jobs.cancel(&job_id)?;
    Ok(Json(ApiResponse::ok("Job cancelled", job)))
}

pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<DeleteJobQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AnalysisError> {
    state.jobs.delete(&job_id, query.delete_output)?;
    Ok(Json(ApiResponse::ok(
        "Job deleted",
        serde_json::json!({ "job_id": job_id }),
    )))
}
