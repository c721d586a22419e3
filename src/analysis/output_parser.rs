//! Scans captured detection output for JSON lines and selects the result.
//!
//! The script interleaves progress/log JSON with its final result line. The
//! first `success: true` object scanning forward wins; a reverse scan of the
//! collected objects is the fallback.

use crate::models::{DebugInfo, DetectionReport, FailureDiagnostics};
use crate::utils::text::tail_chars;
use serde_json::Value;

/// A decoded JSON object and the raw (trimmed) line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonCandidate {
    pub line: String,
    pub value: Value,
}

impl JsonCandidate {
    fn is_success(&self) -> bool {
        self.value.get("success").and_then(Value::as_bool) == Some(true)
    }

    fn is_failure(&self) -> bool {
        self.value.get("success").and_then(Value::as_bool) == Some(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedOutput {
    pub candidates: Vec<JsonCandidate>,
    selected: Option<usize>,
}

/// Split on `\r\n`, `\r` and `\n` alike.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c| c == '\r' || c == '\n')
}

fn decode_line(line: &str) -> Option<JsonCandidate> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => Some(JsonCandidate {
            line: trimmed.to_string(),
            value,
        }),
        _ => None,
    }
}

pub fn parse_output(text: &str) -> ParsedOutput {
    let candidates: Vec<JsonCandidate> = split_lines(text).filter_map(decode_line).collect();

    let selected = candidates
        .iter()
        .position(JsonCandidate::is_success)
        .or_else(|| candidates.iter().rposition(JsonCandidate::is_success));

    ParsedOutput {
        candidates,
        selected,
    }
}

impl ParsedOutput {
    pub fn selected(&self) -> Option<&JsonCandidate> {
        self.selected.map(|idx| &self.candidates[idx])
    }

    /// The selected object as a typed report. `None` when nothing succeeded.
    pub fn report(&self) -> Option<Result<DetectionReport, serde_json::Error>> {
        self.selected()
            .map(|candidate| serde_json::from_value(candidate.value.clone()))
    }

    pub fn last_json_line(&self) -> Option<&str> {
        self.candidates.last().map(|c| c.line.as_str())
    }

    /// `error` field of the last `success: false` object, if the script sent one.
    pub fn script_error(&self) -> Option<String> {
        self.candidates
            .iter()
            .rev()
            .filter(|c| c.is_failure())
            .find_map(|c| c.value.get("error").and_then(Value::as_str))
            .map(str::to_string)
    }

    pub fn diagnostics(&self, raw: &str, exit_code: Option<i32>, tail: usize) -> FailureDiagnostics {
        FailureDiagnostics {
            debug_info: DebugInfo {
                json_found: self.selected.is_some(),
                last_json_line: self.last_json_line().map(str::to_string),
                total_json_lines: self.candidates.len(),
                script_error: self.script_error(),
                exit_code,
                output_length: raw.len(),
            },
            debug_output: tail_chars(raw, tail).to_string(),
        }
    }
}

/// Progress percent (clamped to 0-100) and optional stage from a
/// `{"progress": n, "stage": "..."}` line.
pub fn progress_from_line(line: &str) -> Option<(u8, Option<String>)> {
    let candidate = decode_line(line)?;
    let percent = candidate.value.get("progress").and_then(Value::as_f64)?;
    let stage = candidate
        .value
        .get("stage")
        .or_else(|| candidate.value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some((percent.clamp(0.0, 100.0).round() as u8, stage))
}
