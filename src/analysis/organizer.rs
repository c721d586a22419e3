// Result organization
// Moves the script's `pred/` output into the per-analysis results directory
// and always removes the working directory afterwards.

use crate::error::AnalysisError;
use crate::file_manager::copy_dir_all;
use std::fs;
use std::path::{Path, PathBuf};

pub const PRED_DIR: &str = "pred";

#[derive(Debug, Clone, PartialEq)]
pub struct OrganizedResults {
    pub results_dir: PathBuf,
    pub pred_found: bool,
    pub files_copied: u64,
}

/// Best-effort removal of a working directory. Failures are logged only.
pub fn cleanup_work_dir(work_dir: &Path) {
    if !work_dir.exists() {
        return;
    }
    match fs::remove_dir_all(work_dir) {
        Ok(()) => log::debug!("Removed working directory {:?}", work_dir),
        Err(e) => log::warn!("Failed to remove working directory {:?}: {}", work_dir, e),
    }
}

fn copy_pred(work_dir: &Path, results_dir: &Path) -> Result<OrganizedResults, AnalysisError> {
    fs::create_dir_all(results_dir).map_err(|e| {
        AnalysisError::PostProcessing(format!(
            "Failed to create results directory {:?}: {}",
            results_dir, e
        ))
    })?;

    let pred = work_dir.join(PRED_DIR);
    if !pred.is_dir() {
        log::warn!(
            "Detection reported success but {:?} has no {} directory",
            work_dir,
            PRED_DIR
        );
        return Ok(OrganizedResults {
            results_dir: results_dir.to_path_buf(),
            pred_found: false,
            files_copied: 0,
        });
    }

    let files_copied = copy_dir_all(&pred, results_dir).map_err(|e| {
        AnalysisError::PostProcessing(format!(
            "Failed to copy {:?} into {:?}: {}",
            pred, results_dir, e
        ))
    })?;

    log::info!("Copied {} result files into {:?}", files_copied, results_dir);
    Ok(OrganizedResults {
        results_dir: results_dir.to_path_buf(),
        pred_found: true,
        files_copied,
    })
}

/// Copy `<work_dir>/pred/*` into `results_dir`, then delete `work_dir`
/// whether or not the copy succeeded. A results directory that cannot be
/// created or filled is an error.
pub fn organize_results(work_dir: &Path, results_dir: &Path) -> Result<OrganizedResults, AnalysisError> {
    let outcome = copy_pred(work_dir, results_dir);
    cleanup_work_dir(work_dir);
    outcome
}
