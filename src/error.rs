//! Error taxonomy for the analysis flow and its conversion into HTTP responses.

use crate::models::{DebugInfo, FailureDiagnostics};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;

/// The runtime is missing something before any process is spawned.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Python interpreter not found (tried: {tried})")]
    InterpreterNotFound { tried: String },
    #[error("Detection script not found: {last_tried:?}")]
    ScriptNotFound { last_tried: PathBuf },
    #[error("Video file not found before invocation: {0:?}")]
    VideoMissing(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Failed to start detection process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Failed to wait for detection process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("Detection execution failed - no output")]
    NoOutput { exit_code: Option<i32> },
    #[error("Detection timed out after {0} seconds")]
    TimedOut(u64),
    #[error("Detection was cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("{message}")]
    Semantic {
        message: String,
        diagnostics: Box<FailureDiagnostics>,
    },
    #[error("{0}")]
    PostProcessing(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Storage(String),
}

impl AnalysisError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Environment(_)
            | Self::Invocation(_)
            | Self::Semantic { .. }
            | Self::PostProcessing(_)
            | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to a client. Local paths stay in the log.
    pub fn client_message(&self) -> String {
        match self {
            Self::Environment(EnvironmentError::InterpreterNotFound { .. }) => {
                "Hawk-Eye environment error: Python interpreter not found".to_string()
            }
            Self::Environment(EnvironmentError::ScriptNotFound { .. }) => {
                "Hawk-Eye environment error: detection script not found".to_string()
            }
            Self::Environment(EnvironmentError::VideoMissing(_)) => {
                "Hawk-Eye environment error: uploaded video is no longer available".to_string()
            }
            Self::Invocation(InvocationError::Spawn(_)) => {
                "Hawk-Eye execution failed - could not start detection".to_string()
            }
            Self::Storage(_) => "Hawk-Eye storage error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn diagnostics(&self) -> Option<FailureDiagnostics> {
        match self {
            Self::Semantic { diagnostics, .. } => Some((**diagnostics).clone()),
            Self::Invocation(InvocationError::NoOutput { exit_code }) => Some(FailureDiagnostics {
                debug_info: DebugInfo {
                    exit_code: *exit_code,
                    ..DebugInfo::default()
                },
                debug_output: String::new(),
            }),
            _ => None,
        }
    }
}

impl From<String> for AnalysisError {
    fn from(message: String) -> Self {
        Self::Storage(message)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_info: Option<DebugInfo>,
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Hawk-Eye request failed: {}", self);
        } else {
            log::debug!("Hawk-Eye request rejected: {}", self);
        }

        let diagnostics = self.diagnostics();
        let body = ErrorBody {
            success: false,
            message: self.client_message(),
            debug_output: diagnostics.as_ref().map(|d| d.debug_output.clone()),
            debug_info: diagnostics.map(|d| d.debug_info),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_follows_taxonomy() {
        assert_eq!(
            AnalysisError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AnalysisError::PayloadTooLarge("big".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AnalysisError::from(InvocationError::TimedOut(900)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AnalysisError::PostProcessing("mkdir".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_message_hides_paths() {
        let err = AnalysisError::from(EnvironmentError::ScriptNotFound {
            last_tried: PathBuf::from("/opt/secret/layout/detect_ball.py"),
        });
        assert!(err.to_string().contains("/opt/secret/layout"));
        assert!(!err.client_message().contains("/opt/secret/layout"));
    }

    #[test]
    fn test_no_output_carries_empty_diagnostics() {
        let err = AnalysisError::from(InvocationError::NoOutput { exit_code: Some(1) });
        let diagnostics = err.diagnostics().unwrap();
        assert!(!diagnostics.debug_info.json_found);
        assert_eq!(diagnostics.debug_info.total_json_lines, 0);
        assert_eq!(diagnostics.debug_info.exit_code, Some(1));
        assert_eq!(err.client_message(), "Detection execution failed - no output");
    }
}
