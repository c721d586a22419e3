// Analysis job data models
use crate::models::{AnalysisData, FailureDiagnostics};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisJobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub original_filename: String,
    pub upload_path: String,
    pub status: AnalysisJobStatus,
    pub progress: u8, // 0-100
    pub stage: Option<String>,
    pub result: Option<AnalysisData>,
    pub error: Option<String>,
    pub debug: Option<FailureDiagnostics>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl AnalysisJob {
    pub fn new(id: String, original_filename: String, upload_path: String) -> Self {
        Self {
            id,
            original_filename,
            upload_path,
            status: AnalysisJobStatus::Pending,
            progress: 0,
            stage: None,
            result: None,
            error: None,
            debug: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
        }
    }
}
