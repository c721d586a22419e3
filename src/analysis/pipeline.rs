//! Chains command building, invocation, parsing and organization for one
//! stored upload. Both the synchronous endpoint and the job queue run
//! analyses through [`HawkEyePipeline`].

use super::organizer::organize_results;
use super::output_parser::parse_output;
use super::response::format_success;
use super::upload::StoredUpload;
use crate::error::AnalysisError;
use crate::models::{AnalysisData, Settings};
use crate::process_manager::{build_analysis_command, run_detection, InvokeOptions};
use crate::utils::AppPaths;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MAX_ANALYSIS_ID_LEN: usize = 128;

/// `<unix-millis>_<uuid-v4-simple>`: sortable, unique, path and URL safe.
pub fn new_analysis_id() -> String {
    format!(
        "{}_{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

pub fn is_valid_analysis_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ANALYSIS_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// IDs whose working directory is currently owned by a running analysis.
#[derive(Debug, Clone, Default)]
pub struct ActiveAnalyses {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveAnalyses {
    pub fn register(&self, analysis_id: &str) -> ActiveGuard {
        self.inner.lock().insert(analysis_id.to_string());
        ActiveGuard {
            set: self.clone(),
            analysis_id: analysis_id.to_string(),
        }
    }

    pub fn contains(&self, analysis_id: &str) -> bool {
        self.inner.lock().contains(analysis_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ActiveGuard {
    set: ActiveAnalyses,
    analysis_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.set.inner.lock().remove(&self.analysis_id);
    }
}

/// Per-run hooks used by the job queue.
#[derive(Default)]
pub struct RunHooks {
    pub line_observer: Option<mpsc::Sender<String>>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Clone)]
pub struct HawkEyePipeline {
    settings: Arc<Settings>,
    paths: Arc<AppPaths>,
    active: ActiveAnalyses,
}

impl HawkEyePipeline {
    pub fn new(settings: Arc<Settings>, paths: Arc<AppPaths>, active: ActiveAnalyses) -> Self {
        Self {
            settings,
            paths,
            active,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Run the external detector on `upload` and organize its output.
    pub async fn analyze(
        &self,
        analysis_id: &str,
        upload: &StoredUpload,
        hooks: RunHooks,
    ) -> Result<AnalysisData, AnalysisError> {
        let _active = self.active.register(analysis_id);
        let work_dir = self.paths.work_dir_for(analysis_id);

        let command = build_analysis_command(&self.settings, &upload.path, &work_dir)?;

        fs::create_dir_all(&work_dir).map_err(|e| {
            AnalysisError::Storage(format!(
                "Failed to create working directory {:?}: {}",
                work_dir, e
            ))
        })?;

        log::info!(
            "Starting Hawk-Eye analysis {} for {}",
            analysis_id,
            upload.original_filename
        );

        let output = run_detection(
            &command,
            InvokeOptions {
                timeout: Duration::from_secs(self.settings.timeout_secs),
                preview_chars: self.settings.preview_chars,
                line_observer: hooks.line_observer,
                cancel: hooks.cancel,
            },
        )
        .await?;

        self.finish(analysis_id, &upload.path, &output.text, output.exit_code)
    }

    /// Parse captured output, organize results and shape the success payload.
    pub fn finish(
        &self,
        analysis_id: &str,
        upload_path: &Path,
        raw_output: &str,
        exit_code: Option<i32>,
    ) -> Result<AnalysisData, AnalysisError> {
        let parsed = parse_output(raw_output);
        let semantic = |message: String| AnalysisError::Semantic {
            message,
            diagnostics: Box::new(parsed.diagnostics(
                raw_output,
                exit_code,
                self.settings.debug_tail_chars,
            )),
        };

        let report = match parsed.report() {
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                return Err(semantic(format!(
                    "Hawk-Eye processing failed - unreadable result line: {}",
                    e
                )))
            }
            None => {
                let message = match parsed.script_error() {
                    Some(error) => format!("Hawk-Eye processing failed: {}", error),
                    None => "Hawk-Eye processing failed - no success result found".to_string(),
                };
                log::warn!(
                    "Analysis {}: {} ({} JSON lines, exit code {:?})",
                    analysis_id,
                    message,
                    parsed.candidates.len(),
                    exit_code
                );
                return Err(semantic(message));
            }
        };

        let work_dir = self.paths.work_dir_for(analysis_id);
        let results_dir = self.paths.results_dir_for(analysis_id);
        let organized = organize_results(&work_dir, &results_dir)?;

        log::info!(
            "Analysis {} complete: {:?} frames, {} classes",
            analysis_id,
            report.frames,
            report.counts.len()
        );

        Ok(format_success(
            analysis_id,
            &report,
            upload_path,
            &organized.results_dir,
            &self.paths.results_root,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn pipeline_in(dir: &Path, settings: Settings) -> HawkEyePipeline {
        let paths = AppPaths::resolve(dir, &settings);
        paths.initialize_data_directories().unwrap();
        HawkEyePipeline::new(Arc::new(settings), Arc::new(paths), ActiveAnalyses::default())
    }

    #[test]
    fn test_analysis_ids_are_unique_and_safe() {
        let ids: HashSet<String> = (0..1000).map(|_| new_analysis_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| is_valid_analysis_id(id)));
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        assert!(!is_valid_analysis_id(""));
        assert!(!is_valid_analysis_id("../etc"));
        assert!(!is_valid_analysis_id("a/b"));
        assert!(!is_valid_analysis_id(&"a".repeat(129)));
        assert!(is_valid_analysis_id("1700000000000_abc-def"));
    }

    #[test]
    fn test_active_guard_unregisters_on_drop() {
        let active = ActiveAnalyses::default();
        {
            let _guard = active.register("1_a");
            assert!(active.contains("1_a"));
        }
        assert!(active.is_empty());
    }

    #[test]
    fn test_end_to_end_success() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path(), Settings::default());
        let id = "1700000000000_abc";
        let work = pipeline.paths().work_dir_for(id);
        fs::create_dir_all(work.join("pred")).unwrap();
        fs::write(work.join("pred").join("annotated.mp4"), b"video").unwrap();

        let raw = "{\"progress\":10}\n{\"success\":true,\"frames\":42,\"counts\":{\"ball\":42},\"annotated_relpath\":\"pred/annotated.mp4\"}\n";
        let data = pipeline
            .finish(id, Path::new("/uploads/clip.mp4"), raw, Some(0))
            .unwrap();

        let results = pipeline.paths().results_dir_for(id);
        assert!(results.join("annotated.mp4").is_file());
        assert!(!work.exists());
        assert_eq!(data.frames, Some(42));
        assert_eq!(data.detection_counts, BTreeMap::from([("ball".to_string(), 42)]));
        assert_eq!(data.annotated_video.as_deref(), Some("1700000000000_abc/annotated.mp4"));
        assert_eq!(PathBuf::from(&data.results_path), results);
    }

    #[test]
    fn test_end_to_end_failure_leaves_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path(), Settings::default());
        let id = "1700000000000_def";
        let work = pipeline.paths().work_dir_for(id);
        fs::create_dir_all(&work).unwrap();

        let err = pipeline
            .finish(id, Path::new("/uploads/clip.mp4"), "Traceback...\nerror\n", Some(1))
            .unwrap_err();

        let diagnostics = err.diagnostics().unwrap();
        assert!(!diagnostics.debug_info.json_found);
        assert_eq!(diagnostics.debug_info.total_json_lines, 0);
        assert_eq!(diagnostics.debug_output, "Traceback...\nerror\n");
        assert!(!pipeline.paths().results_dir_for(id).exists());
        assert!(work.exists());
    }

    #[test]
    fn test_success_with_null_fields_and_float_frames() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path(), Settings::default());
        let id = "1700000000000_nul";
        fs::create_dir_all(pipeline.paths().work_dir_for(id).join("pred")).unwrap();

        let raw = "{\"success\":true,\"frames\":42.0,\"counts\":null,\"classes\":null}\n";
        let data = pipeline
            .finish(id, Path::new("/uploads/clip.mp4"), raw, Some(0))
            .unwrap();

        assert_eq!(data.frames, Some(42));
        assert!(data.detection_counts.is_empty());
        assert!(data.classes_detected.is_empty());
        assert!(!pipeline.paths().work_dir_for(id).exists());
    }

    #[test]
    fn test_script_error_surfaces_in_message() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_in(dir.path(), Settings::default());

        let err = pipeline
            .finish(
                "1_x",
                Path::new("/u.mp4"),
                "{\"success\":false,\"error\":\"cannot open video\"}\n",
                Some(1),
            )
            .unwrap_err();

        assert_eq!(err.to_string(), "Hawk-Eye processing failed: cannot open video");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_analyze_runs_external_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("detect_ball.sh");
        fs::write(
            &script,
            r#"out="$4"
mkdir -p "$out/pred"
printf 'video' > "$out/pred/annotated.mp4"
echo '{"progress":50}'
echo 'loading weights' 1>&2
echo '{"success":true,"frames":42,"counts":{"ball":42},"classes":["ball"],"annotated_relpath":"pred/annotated.mp4","inference_time":1.5}'
exit 1
"#,
        )
        .unwrap();

        let settings = Settings {
            interpreter_candidates: vec!["/bin/sh".to_string()],
            script_candidates: vec![script.to_string_lossy().to_string()],
            ..Settings::default()
        };
        let pipeline = pipeline_in(dir.path(), settings);
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"video").unwrap();
        let upload = StoredUpload {
            original_filename: "clip.mp4".to_string(),
            path: video,
            size: 5,
        };

        let id = new_analysis_id();
        let data = pipeline.analyze(&id, &upload, RunHooks::default()).await.unwrap();

        assert_eq!(data.frames, Some(42));
        assert_eq!(data.classes_detected, vec!["ball"]);
        assert_eq!(data.inference_time, Some(1.5));
        assert!(pipeline.paths().results_dir_for(&id).join("annotated.mp4").is_file());
        assert!(!pipeline.paths().work_dir_for(&id).exists());
        assert!(pipeline.active.is_empty());
    }
}
