// Synchronous analysis and results lookup endpoints

use crate::analysis::{
    is_valid_analysis_id, new_analysis_id, receive_video, store_upload, ReceivedVideo, RunHooks,
    StoredUpload, UploadPolicy,
};
use crate::error::AnalysisError;
use crate::file_manager::list_files_relative;
use crate::models::{AnalysisData, ApiResponse, ResultsListing};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::Json;

pub const FILES_ROUTE: &str = "/api/hawkeye/files";

/// Write a received video to the upload root off the async runtime.
pub(crate) async fn persist_upload(
    state: &AppState,
    video: ReceivedVideo,
    policy: UploadPolicy,
) -> Result<StoredUpload, AnalysisError> {
    let upload_root = state.paths.upload_root.clone();
    tokio::task::spawn_blocking(move || store_upload(&upload_root, &video, &policy))
        .await
        .map_err(|e| AnalysisError::Storage(format!("Upload task failed: {}", e)))?
}

/// `POST /api/hawkeye/analyze`: upload, run detection and answer in one request.
pub async fn analyze_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<AnalysisData>>, AnalysisError> {
    let policy = state.upload_policy();
    let video = receive_video(&mut multipart, &policy).await?;
    let upload = persist_upload(&state, video, policy).await?;

    let analysis_id = new_analysis_id();
    let data = state
        .pipeline
        .analyze(&analysis_id, &upload, RunHooks::default())
        .await?;

    Ok(Json(ApiResponse::ok("Hawk-Eye analysis completed", data)))
}

pub async fn get_results(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
) -> Result<Json<ApiResponse<ResultsListing>>, AnalysisError> {
    let not_found = || AnalysisError::NotFound("not found".to_string());

    if !is_valid_analysis_id(&analysis_id) {
        return Err(not_found());
    }
    let results_dir = state.paths.results_dir_for(&analysis_id);
    if !results_dir.is_dir() {
        return Err(not_found());
    }

    let all_files = list_files_relative(&results_dir).map_err(|e| {
        AnalysisError::Storage(format!("Failed to list results {:?}: {}", results_dir, e))
    })?;

    let policy = state.upload_policy();
    let annotated_video = all_files
        .iter()
        .find(|file| policy.is_allowed_video(file))
        .map(|file| format!("{}/{}/{}", FILES_ROUTE, analysis_id, file));

    Ok(Json(ApiResponse::data(ResultsListing {
        analysis_id,
        annotated_video,
        all_files,
    })))
}
