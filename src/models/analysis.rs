// Analysis data models
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// `null` decodes the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn whole_count(value: f64) -> u64 {
    // `as` saturates; NaN becomes 0
    value.round() as u64
}

/// Frame counts arrive as `42` or `42.0` depending on how the script read them.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(whole_count))
}

fn lenient_counts<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<f64>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(class, count)| (class, count.map(whole_count).unwrap_or(0)))
        .collect())
}

/// One JSON line emitted by the detection script, decoded leniently.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectionReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_count")]
    pub frames: Option<u64>,
    #[serde(default, deserialize_with = "lenient_counts")]
    pub counts: BTreeMap<String, u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub classes: Vec<String>,
    #[serde(default)]
    pub annotated_relpath: Option<String>,
    #[serde(default)]
    pub model_load_time: Option<f64>,
    #[serde(default)]
    pub inference_time: Option<f64>,
    #[serde(default)]
    pub video_processing_time: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Success payload returned to clients under `data`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisData {
    pub analysis_id: String,
    pub detection_counts: BTreeMap<String, u64>,
    pub classes_detected: Vec<String>,
    pub annotated_video: Option<String>,
    pub upload_path: String,
    pub results_path: String,
    pub frames: Option<u64>,
    pub model_load_time: Option<f64>,
    pub inference_time: Option<f64>,
    pub video_processing_time: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DebugInfo {
    pub json_found: bool,
    pub last_json_line: Option<String>,
    pub total_json_lines: usize,
    pub script_error: Option<String>,
    pub exit_code: Option<i32>,
    pub output_length: usize,
}

/// Everything an operator needs to tell "script crashed" apart from
/// "script succeeded in an unexpected format".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FailureDiagnostics {
    pub debug_info: DebugInfo,
    pub debug_output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsListing {
    pub analysis_id: String,
    pub annotated_video: Option<String>,
    pub all_files: Vec<String>,
}

/// Uniform `{ success, message, data }` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn data(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }
}
