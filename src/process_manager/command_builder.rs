// Detection command assembly
// Resolves the interpreter and script, then builds an argument array for a
// direct spawn. Only existence checks touch the file system.

use crate::error::EnvironmentError;
use crate::models::{DetectionFlags, Settings};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisCommand {
    pub program: PathBuf,
    pub script: PathBuf,
    pub args: Vec<OsString>,
    pub env: BTreeMap<String, String>,
}

impl fmt::Display for AnalysisCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn is_bare_name(candidate: &str) -> bool {
    !candidate.contains('/') && !candidate.contains('\\')
}

/// Search `PATH` for an executable file called `name`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;

    #[cfg(windows)]
    let names = [name.to_string(), format!("{}.exe", name)];
    #[cfg(not(windows))]
    let names = [name.to_string()];

    std::env::split_paths(&path_var)
        .flat_map(|dir| names.iter().map(move |n| dir.join(n)))
        .find(|candidate| candidate.is_file())
}

/// First existing interpreter. Explicit paths are checked before bare
/// names, which are looked up on `PATH`.
pub fn locate_interpreter(candidates: &[String], base_dir: &Path) -> Result<PathBuf, EnvironmentError> {
    let (bare, explicit): (Vec<&String>, Vec<&String>) =
        candidates.iter().partition(|c| is_bare_name(c));

    for candidate in explicit {
        let path = crate::utils::resolve_relative_to(base_dir, candidate);
        if path.is_file() {
            return Ok(path);
        }
    }

    for name in bare {
        if let Some(path) = find_on_path(name) {
            return Ok(path);
        }
    }

    Err(EnvironmentError::InterpreterNotFound {
        tried: candidates.join(", "),
    })
}

/// First existing script in priority order. The error names the last path tried.
pub fn locate_script(candidates: &[String], base_dir: &Path) -> Result<PathBuf, EnvironmentError> {
    let mut last_tried = PathBuf::new();

    for candidate in candidates {
        let path = crate::utils::resolve_relative_to(base_dir, candidate);
        if path.is_file() {
            return Ok(path);
        }
        last_tried = path;
    }

    Err(EnvironmentError::ScriptNotFound { last_tried })
}

pub fn script_base_dir(settings: &Settings) -> PathBuf {
    match &settings.script_base_dir {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub fn detection_args(script: &Path, video: &Path, out_dir: &Path, flags: &DetectionFlags) -> Vec<OsString> {
    vec![
        script.as_os_str().to_os_string(),
        OsString::from("--video"),
        video.as_os_str().to_os_string(),
        OsString::from("--out"),
        out_dir.as_os_str().to_os_string(),
        OsString::from("--conf"),
        OsString::from(flags.conf.to_string()),
        OsString::from("--iou"),
        OsString::from(flags.iou.to_string()),
        OsString::from("--device"),
        OsString::from(&flags.device),
    ]
}

pub fn build_analysis_command(
    settings: &Settings,
    video: &Path,
    out_dir: &Path,
) -> Result<AnalysisCommand, EnvironmentError> {
    let base_dir = script_base_dir(settings);
    let program = locate_interpreter(&settings.interpreter_candidates, &base_dir)?;
    let script = locate_script(&settings.script_candidates, &base_dir)?;

    if !video.is_file() {
        return Err(EnvironmentError::VideoMissing(video.to_path_buf()));
    }

    Ok(AnalysisCommand {
        args: detection_args(&script, video, out_dir, &settings.detection),
        program,
        script,
        env: settings.script_env.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn settings_in(dir: &Path) -> Settings {
        let interpreter = dir.join("python3");
        fs::write(&interpreter, b"").unwrap();
        fs::create_dir_all(dir.join("hawkeye")).unwrap();
        fs::write(dir.join("hawkeye").join("detect_ball.py"), b"").unwrap();

        Settings {
            interpreter_candidates: vec![
                dir.join("missing").join("python").to_string_lossy().to_string(),
                interpreter.to_string_lossy().to_string(),
            ],
            script_candidates: vec![
                "scripts/detect_ball.py".to_string(),
                "hawkeye/detect_ball.py".to_string(),
            ],
            script_base_dir: Some(dir.to_string_lossy().to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_builds_fixed_flags_as_argument_array() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let video = dir.path().join("1700000000_clip.mp4");
        fs::write(&video, b"video").unwrap();
        let out_dir = dir.path().join("work").join("abc");

        let command = build_analysis_command(&settings, &video, &out_dir).unwrap();

        assert_eq!(command.program, dir.path().join("python3"));
        assert_eq!(command.script, dir.path().join("hawkeye").join("detect_ball.py"));
        let args: Vec<String> = command
            .args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            &args[1..],
            &[
                "--video".to_string(),
                video.to_string_lossy().to_string(),
                "--out".to_string(),
                out_dir.to_string_lossy().to_string(),
                "--conf".to_string(),
                "0.25".to_string(),
                "--iou".to_string(),
                "0.7".to_string(),
                "--device".to_string(),
                "cpu".to_string(),
            ]
        );
        assert_eq!(command.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_filename_with_shell_metacharacters_stays_one_argument() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let video = dir.path().join("clip & rm -rf ~.mp4");
        fs::write(&video, b"video").unwrap();

        let command = build_analysis_command(&settings, &video, dir.path()).unwrap();

        assert_eq!(command.args[2], video.as_os_str());
    }

    #[test]
    fn test_script_not_found_names_last_tried_path() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec!["a/detect.py".to_string(), "b/detect.py".to_string()];

        match locate_script(&candidates, dir.path()) {
            Err(EnvironmentError::ScriptNotFound { last_tried }) => {
                assert_eq!(last_tried, dir.path().join("b/detect.py"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_interpreter_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let candidates = vec![
            dir.path().join("nope").to_string_lossy().to_string(),
            "definitely-not-a-real-python-binary".to_string(),
        ];

        assert!(matches!(
            locate_interpreter(&candidates, dir.path()),
            Err(EnvironmentError::InterpreterNotFound { .. })
        ));
    }

    #[test]
    fn test_vanished_video_is_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());

        let result = build_analysis_command(&settings, &dir.path().join("gone.mp4"), dir.path());

        assert!(matches!(result, Err(EnvironmentError::VideoMissing(_))));
    }
}
