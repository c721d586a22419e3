//! Logging setup for Hawk-Eye
//! Installs a tracing subscriber (stdout + daily file) that also captures
//! `log` records, and handles log file cleanup for retention

use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "hawkeye.log";
const SECS_PER_DAY: u64 = 24 * 60 * 60;
const DEFAULT_FILTER: &str = "info,hawkeye_lib=debug,tower_http=info";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging to stdout and `<logs_dir>/hawkeye.log.<date>`.
/// Subsequent calls are no-ops.
pub fn init(logs_dir: &Path) -> Result<(), String> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    fs::create_dir_all(logs_dir)
        .map_err(|e| format!("Failed to create log directory {:?}: {}", logs_dir, e))?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);
    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

    tracing_subscriber::registry()
        .with(build_env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("Failed to install global tracing subscriber: {}", e))?;
    let _ = LOG_GUARD.set(guard);

    log::info!("Logging initialized; log files in {:?}", logs_dir);
    Ok(())
}

pub fn cleanup_old_logs(logs_dir: &Path, retention_days: u64) {
    if !logs_dir.exists() {
        return;
    }

    let retention = Duration::from_secs(retention_days.saturating_mul(SECS_PER_DAY));
    let now = SystemTime::now();

    if let Ok(entries) = fs::read_dir(logs_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_log = path
                .file_name()
                .map_or(false, |name| name.to_string_lossy().starts_with(LOG_FILE_PREFIX));
            if !is_log {
                continue;
            }
            let age = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if let Some(age) = age {
                if age > retention && fs::remove_file(&path).is_ok() {
                    log::info!("Cleaned up old log: {:?}", path.file_name());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_recent_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hawkeye.log.2026-10-16"), b"recent").unwrap();
        fs::write(dir.path().join("notes.txt"), b"other").unwrap();

        cleanup_old_logs(dir.path(), 7);

        assert!(dir.path().join("hawkeye.log.2026-10-16").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_huge_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hawkeye.log.2026-01-01"), b"old").unwrap();

        cleanup_old_logs(dir.path(), u64::MAX);

        assert!(dir.path().join("hawkeye.log.2026-01-01").exists());
    }

    #[test]
    fn test_zero_retention_removes_logs_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hawkeye.log.2026-01-01"), b"old").unwrap();
        fs::write(dir.path().join("notes.txt"), b"other").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        cleanup_old_logs(dir.path(), 0);

        assert!(!dir.path().join("hawkeye.log.2026-01-01").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
