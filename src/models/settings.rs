// Settings data models
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionFlags {
    pub conf: f32,
    pub iou: f32,
    pub device: String,
}

impl Default for DetectionFlags {
    fn default() -> Self {
        Self {
            conf: 0.25,
            iou: 0.7,
            device: String::from("cpu"),
        }
    }
}

/// Missing keys in `settings.json` take their value from `Settings::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    pub upload_root: String,
    pub results_root: String,
    pub work_root: String,
    pub max_upload_bytes: u64,
    pub allowed_extensions: Vec<String>,
    pub interpreter_candidates: Vec<String>,
    pub script_candidates: Vec<String>,
    pub script_base_dir: Option<String>,
    pub script_env: BTreeMap<String, String>,
    pub timeout_secs: u64,
    pub detection: DetectionFlags,
    pub max_concurrent_jobs: u32,
    pub sweep_interval_secs: u64,
    pub work_dir_ttl_secs: u64,
    pub log_retention_days: u64,
    /// Finished job records older than this are pruned by the sweeper.
    pub job_retention_days: u64,
    pub preview_chars: usize,
    pub debug_tail_chars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let mut script_env = BTreeMap::new();
        script_env.insert(String::from("PYTHONUNBUFFERED"), String::from("1"));
        script_env.insert(String::from("PYTHONIOENCODING"), String::from("utf-8"));

        Self {
            bind_address: String::from("127.0.0.1:8080"),
            upload_root: String::from("uploads/videos"),
            results_root: String::from("hawkeye_results"),
            work_root: String::from("hawkeye_work"),
            max_upload_bytes: 100 * 1024 * 1024,
            allowed_extensions: ["mp4", "avi", "mov", "m4v", "webm"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            interpreter_candidates: vec![
                String::from("/opt/hawkeye/venv/bin/python"),
                String::from("/usr/local/bin/python3"),
                String::from("/usr/bin/python3"),
                String::from("python3"),
                String::from("python"),
            ],
            script_candidates: vec![
                String::from("hawkeye/detect_ball.py"),
                String::from("scripts/hawkeye/detect_ball.py"),
                String::from("../hawkeye/detect_ball.py"),
                String::from("/opt/hawkeye/detect_ball.py"),
            ],
            script_base_dir: None,
            script_env,
            timeout_secs: 900,
            detection: DetectionFlags::default(),
            max_concurrent_jobs: 1,
            sweep_interval_secs: 3600,
            work_dir_ttl_secs: 1800,
            log_retention_days: 7,
            job_retention_days: 30,
            preview_chars: 500,
            debug_tail_chars: 2000,
        }
    }
}
