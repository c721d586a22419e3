// Periodic reconciliation of abandoned working directories
// Failed or interrupted analyses leave their working output behind; this
// pass removes anything past its TTL that no running analysis owns.

use super::pipeline::ActiveAnalyses;
use crate::file_manager::entries_older_than;
use crate::jobs::JobQueue;
use crate::logging::cleanup_old_logs;
use crate::models::Settings;
use crate::utils::AppPaths;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub removed: usize,
    pub skipped_active: usize,
    pub failed: usize,
}

pub fn sweep_work_root(
    work_root: &Path,
    ttl: Duration,
    active: &ActiveAnalyses,
    now: SystemTime,
) -> SweepReport {
    let mut report = SweepReport::default();

    let stale = match entries_older_than(work_root, ttl, now) {
        Ok(stale) => stale,
        Err(e) => {
            log::warn!("Failed to scan working root {:?}: {}", work_root, e);
            return report;
        }
    };

    for path in stale {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if active.contains(&name) {
            report.skipped_active += 1;
            continue;
        }

        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match removed {
            Ok(()) => {
                log::info!("Swept stale working output {:?}", path);
                report.removed += 1;
            }
            Err(e) => {
                log::warn!("Failed to sweep {:?}: {}", path, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Run the sweep every `sweep_interval_secs`, along with log retention and
/// pruning of finished job records.
pub fn spawn_sweeper(
    settings: Arc<Settings>,
    paths: Arc<AppPaths>,
    active: ActiveAnalyses,
    jobs: JobQueue,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(settings.sweep_interval_secs.max(1));
    let ttl = Duration::from_secs(settings.work_dir_ttl_secs);
    let job_retention =
        Duration::from_secs(settings.job_retention_days.saturating_mul(24 * 60 * 60));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            let paths = paths.clone();
            let active = active.clone();
            let jobs = jobs.clone();
            let retention_days = settings.log_retention_days;
            let swept = tokio::task::spawn_blocking(move || {
                cleanup_old_logs(&paths.logs_dir, retention_days);
                if let Err(e) = jobs.prune_finished(job_retention, chrono::Utc::now()) {
                    log::warn!("Failed to prune finished jobs: {}", e);
                }
                sweep_work_root(&paths.work_root, ttl, &active, SystemTime::now())
            })
            .await;

            match swept {
                Ok(report) if report.removed > 0 || report.failed > 0 => {
                    log::info!("Working directory sweep: {:?}", report)
                }
                Ok(_) => {}
                Err(e) => log::error!("Working directory sweep panicked: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_stale_and_keeps_active() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1_old").join("pred")).unwrap();
        fs::create_dir_all(dir.path().join("2_running")).unwrap();
        let active = ActiveAnalyses::default();
        let _guard = active.register("2_running");

        let later = SystemTime::now() + Duration::from_secs(7200);
        let report = sweep_work_root(dir.path(), Duration::from_secs(3600), &active, later);

        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped_active, 1);
        assert!(!dir.path().join("1_old").exists());
        assert!(dir.path().join("2_running").exists());
    }

    #[test]
    fn test_fresh_directories_survive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("1_new")).unwrap();

        let report = sweep_work_root(
            dir.path(),
            Duration::from_secs(3600),
            &ActiveAnalyses::default(),
            SystemTime::now(),
        );

        assert_eq!(report, SweepReport::default());
        assert!(dir.path().join("1_new").exists());
    }

    #[test]
    fn test_missing_root_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let report = sweep_work_root(
            &dir.path().join("absent"),
            Duration::from_secs(1),
            &ActiveAnalyses::default(),
            SystemTime::now(),
        );
        assert_eq!(report.removed, 0);
    }
}
