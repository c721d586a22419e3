// Upload receiver
// Validates the submitted video and persists it under a collision-resistant
// name in the upload root.

use crate::error::AnalysisError;
use crate::models::Settings;
use axum::extract::Multipart;
use std::fs;
use std::path::{Path, PathBuf};

pub const VIDEO_FIELD: &str = "video";

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_bytes: settings.max_upload_bytes,
            allowed_extensions: settings
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn is_allowed_video(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.allowed_extensions.contains(&ext))
            .unwrap_or(false)
    }

    pub fn check_name(&self, file_name: &str) -> Result<(), AnalysisError> {
        if file_name.trim().is_empty() {
            return Err(AnalysisError::Validation("No video file uploaded".to_string()));
        }
        if !self.is_allowed_video(file_name) {
            return Err(AnalysisError::Validation(format!(
                "Invalid video format. Allowed: {}",
                self.allowed_extensions.join(", ")
            )));
        }
        Ok(())
    }

    pub fn too_large(&self) -> AnalysisError {
        AnalysisError::PayloadTooLarge(format!(
            "Video exceeds the maximum size of {} MB",
            self.max_bytes / (1024 * 1024)
        ))
    }

    pub fn check_size(&self, size: u64) -> Result<(), AnalysisError> {
        if size == 0 {
            return Err(AnalysisError::Validation("Uploaded video is empty".to_string()));
        }
        if size > self.max_bytes {
            return Err(self.too_large());
        }
        Ok(())
    }
}

/// A video received from a client, validated but not yet written.
#[derive(Debug, Clone)]
pub struct ReceivedVideo {
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub original_filename: String,
    pub path: PathBuf,
    pub size: u64,
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

/// `<unix-seconds>_<8 hex chars>_<sanitized original>`
pub fn upload_file_name(original: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        chrono::Utc::now().timestamp(),
        &suffix[..8],
        sanitize_filename(original)
    )
}

/// Pull the `video` field out of a multipart body, enforcing the policy
/// while the body streams in. Nothing is written to disk here.
pub async fn receive_video(
    multipart: &mut Multipart,
    policy: &UploadPolicy,
) -> Result<ReceivedVideo, AnalysisError> {
    let map_err = |e: axum::extract::multipart::MultipartError| {
        if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
            policy.too_large()
        } else {
            AnalysisError::Validation(format!("Malformed upload: {}", e.body_text()))
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(map_err)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let original_filename = field.file_name().unwrap_or_default().to_string();
        policy.check_name(&original_filename)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(map_err)? {
            if (bytes.len() + chunk.len()) as u64 > policy.max_bytes {
                return Err(policy.too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        policy.check_size(bytes.len() as u64)?;

        return Ok(ReceivedVideo {
            original_filename,
            bytes,
        });
    }

    Err(AnalysisError::Validation("No video file uploaded".to_string()))
}

/// Write to `<dest>.part` and rename into place. A partial temp file is
/// removed; a complete one is left for the fallback.
fn write_via_temp(temp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Err(e) = fs::write(temp, bytes) {
        if temp.is_file() {
            let _ = fs::remove_file(temp);
        }
        return Err(e);
    }
    fs::rename(temp, dest)
}

/// Fallback: copy a complete temp file to `dest` (or write the bytes
/// directly when none exists), then remove the temp file.
fn write_fallback(temp: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let result = if temp.is_file() {
        fs::copy(temp, dest).map(|_| ())
    } else {
        fs::write(dest, bytes)
    };
    if temp.is_file() {
        let _ = fs::remove_file(temp);
    }
    result
}

pub(crate) fn write_upload(dest: &Path, bytes: &[u8]) -> Result<(), AnalysisError> {
    let temp = dest.with_extension("part");

    let Err(primary) = write_via_temp(&temp, dest, bytes) else {
        return Ok(());
    };
    log::warn!(
        "Primary upload store failed for {:?} ({}); falling back to copy",
        dest,
        primary
    );

    write_fallback(&temp, dest, bytes).map_err(|fallback| {
        AnalysisError::Storage(format!(
            "Failed to store upload {:?}: {} (fallback: {})",
            dest, primary, fallback
        ))
    })
}

/// Validate and persist a received video. Rejections happen before any
/// directory or file is created.
pub fn store_upload(
    upload_root: &Path,
    video: &ReceivedVideo,
    policy: &UploadPolicy,
) -> Result<StoredUpload, AnalysisError> {
    policy.check_name(&video.original_filename)?;
    policy.check_size(video.bytes.len() as u64)?;

    fs::create_dir_all(upload_root).map_err(|e| {
        AnalysisError::Storage(format!("Failed to create upload directory {:?}: {}", upload_root, e))
    })?;

    let dest = upload_root.join(upload_file_name(&video.original_filename));

    write_upload(&dest, &video.bytes)?;

    if !dest.is_file() {
        return Err(AnalysisError::Storage(format!(
            "Upload {:?} missing after store",
            dest
        )));
    }

    let path = dest.canonicalize().unwrap_or(dest);
    log::info!(
        "Stored upload {} ({} bytes) at {:?}",
        video.original_filename,
        video.bytes.len(),
        path
    );

    Ok(StoredUpload {
        original_filename: video.original_filename.clone(),
        path,
        size: video.bytes.len() as u64,
    })
}
