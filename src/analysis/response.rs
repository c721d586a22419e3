// Response shaping for successful analyses

use crate::models::{AnalysisData, DetectionReport};
use std::path::{Component, Path};

/// Map the script's `annotated_relpath` (relative to its output dir, usually
/// `pred/<file>`) onto the organized results layout: `<analysis_id>/<file>`,
/// relative to the results root.
pub fn annotated_video_path(analysis_id: &str, relpath: &str) -> Option<String> {
    let normalized = relpath.replace('\\', "/");
    let path = Path::new(&normalized);

    let mut parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();

    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        // Anything outside the output tree only keeps its file name.
        let file_name = parts.pop()?;
        parts = vec![file_name];
    } else if parts.first().map(String::as_str) == Some(super::organizer::PRED_DIR) {
        parts.remove(0);
    }

    if parts.is_empty() {
        return None;
    }
    Some(format!("{}/{}", analysis_id, parts.join("/")))
}

pub fn format_success(
    analysis_id: &str,
    report: &DetectionReport,
    upload_path: &Path,
    results_dir: &Path,
    results_root: &Path,
) -> AnalysisData {
    let classes_detected = if report.classes.is_empty() {
        report.counts.keys().cloned().collect()
    } else {
        report.classes.clone()
    };

    let annotated_video = report
        .annotated_relpath
        .as_deref()
        .and_then(|rel| annotated_video_path(analysis_id, rel))
        .filter(|rel| {
            let exists = results_root.join(rel).is_file();
            if !exists {
                log::warn!("Annotated video {} not present in results", rel);
            }
            exists
        });

    AnalysisData {
        analysis_id: analysis_id.to_string(),
        detection_counts: report.counts.clone(),
        classes_detected,
        annotated_video,
        upload_path: upload_path.to_string_lossy().to_string(),
        results_path: results_dir.to_string_lossy().to_string(),
        frames: report.frames,
        model_load_time: report.model_load_time,
        inference_time: report.inference_time,
        video_processing_time: report.video_processing_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn test_annotated_path_drops_pred_prefix() {
        assert_eq!(
            annotated_video_path("1_ab", "pred/annotated.mp4").as_deref(),
            Some("1_ab/annotated.mp4")
        );
        assert_eq!(
            annotated_video_path("1_ab", ".\\pred\\clips\\annotated.mp4").as_deref(),
            Some("1_ab/clips/annotated.mp4")
        );
        assert_eq!(
            annotated_video_path("1_ab", "../../etc/annotated.mp4").as_deref(),
            Some("1_ab/annotated.mp4")
        );
        assert_eq!(annotated_video_path("1_ab", ""), None);
    }

    #[test]
    fn test_classes_fall_back_to_count_keys() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("1_ab");
        fs::create_dir_all(&results_dir).unwrap();
        fs::write(results_dir.join("annotated.mp4"), b"v").unwrap();

        let report = DetectionReport {
            success: true,
            frames: Some(10),
            counts: BTreeMap::from([("ball".to_string(), 9), ("stumps".to_string(), 1)]),
            annotated_relpath: Some("pred/annotated.mp4".to_string()),
            ..DetectionReport::default()
        };

        let data = format_success("1_ab", &report, Path::new("/u/v.mp4"), &results_dir, dir.path());

        assert_eq!(data.classes_detected, vec!["ball", "stumps"]);
        assert_eq!(data.annotated_video.as_deref(), Some("1_ab/annotated.mp4"));
        assert_eq!(data.inference_time, None);
    }

    #[test]
    fn test_missing_annotated_file_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let report = DetectionReport {
            success: true,
            annotated_relpath: Some("pred/annotated.mp4".to_string()),
            ..DetectionReport::default()
        };

        let data = format_success("1_ab", &report, Path::new("/u/v.mp4"), dir.path(), dir.path());

        assert_eq!(data.annotated_video, None);
    }
}
