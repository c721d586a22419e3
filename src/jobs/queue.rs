// Analysis job queue
// Persists job records and runs the pipeline on bounded background workers.

use chrono::{DateTime, Utc};
use crate::analysis::output_parser::progress_from_line;
use crate::analysis::{new_analysis_id, HawkEyePipeline, RunHooks, StoredUpload};
use crate::error::{AnalysisError, InvocationError};
use crate::file_manager::{read_json_file_or_default, update_json_file};
use crate::models::{AnalysisData, AnalysisJob, AnalysisJobStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

const PROGRESS_WRITE_DEBOUNCE_MS: u64 = 500;
const PROGRESS_CHANNEL_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<JobQueueInner>,
}

struct JobQueueInner {
    pipeline: HawkEyePipeline,
    jobs_path: PathBuf,
    workers: Arc<Semaphore>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn not_found(job_id: &str) -> AnalysisError {
    AnalysisError::NotFound(format!("Analysis job not found: {}", job_id))
}

fn find_job<'a>(jobs: &'a mut [AnalysisJob], job_id: &str) -> Result<&'a mut AnalysisJob, AnalysisError> {
    jobs.iter_mut()
        .find(|j| j.id == job_id)
        .ok_or_else(|| not_found(job_id))
}

impl JobQueue {
    pub fn new(pipeline: HawkEyePipeline, jobs_path: PathBuf, max_concurrent: u32) -> Self {
        Self {
            inner: Arc::new(JobQueueInner {
                pipeline,
                jobs_path,
                workers: Arc::new(Semaphore::new(max_concurrent.max(1) as usize)),
                tokens: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn jobs_path(&self) -> &Path {
        &self.inner.jobs_path
    }

    pub fn list(&self) -> Result<Vec<AnalysisJob>, AnalysisError> {
        Ok(read_json_file_or_default(self.jobs_path())?)
    }

    pub fn get(&self, job_id: &str) -> Result<AnalysisJob, AnalysisError> {
        self.list()?
            .into_iter()
            .find(|j| j.id == job_id)
            .ok_or_else(|| not_found(job_id))
    }

    /// Record a pending job for `upload` and hand it to a worker.
    pub fn submit(&self, upload: StoredUpload) -> Result<AnalysisJob, AnalysisError> {
        let job = AnalysisJob::new(
            new_analysis_id(),
            upload.original_filename.clone(),
            upload.path.to_string_lossy().to_string(),
        );

        update_json_file(self.jobs_path(), |jobs: &mut Vec<AnalysisJob>| {
            jobs.push(job.clone());
            Ok::<_, AnalysisError>(())
        })?;

        log::debug!("Submitted analysis job {} for {}", job.id, job.original_filename);
        self.spawn_worker(job.id.clone(), upload);
        Ok(job)
    }

    /// Cancel a pending or processing job. A running detector is killed.
    pub fn cancel(&self, job_id: &str) -> Result<AnalysisJob, AnalysisError> {
        let job = update_json_file(
            self.jobs_path(),
            |jobs: &mut Vec<AnalysisJob>| -> Result<AnalysisJob, AnalysisError> {
                let job = find_job(jobs, job_id)?;
                if job.status.is_terminal() {
                    return Err(AnalysisError::Conflict(format!(
                        "Cannot cancel job with status {:?}",
                        job.status
                    )));
                }
                job.status = AnalysisJobStatus::Cancelled;
                job.stage = None;
                job.completed_at = Some(now_rfc3339());
                Ok(job.clone())
            },
        )?;

        if let Some(token) = self.inner.tokens.lock().get(job_id) {
            token.cancel();
        }

        log::debug!("Cancelled analysis job: {}", job_id);
        Ok(job)
    }

    /// Remove a finished job, optionally with its results directory and upload.
    pub fn delete(&self, job_id: &str, delete_output: bool) -> Result<(), AnalysisError> {
        let removed = update_json_file(
            self.jobs_path(),
            |jobs: &mut Vec<AnalysisJob>| -> Result<AnalysisJob, AnalysisError> {
                let index = jobs
                    .iter()
                    .position(|j| j.id == job_id)
                    .ok_or_else(|| not_found(job_id))?;
                if !jobs[index].status.is_terminal() {
                    return Err(AnalysisError::Conflict(format!(
                        "Cannot delete job with status {:?}",
                        jobs[index].status
                    )));
                }
                Ok(jobs.remove(index))
            },
        )?;

        if delete_output {
            let paths = self.inner.pipeline.paths();
            let results_dir = paths.results_dir_for(&removed.id);
            if results_dir.exists() {
                if let Err(e) = fs::remove_dir_all(&results_dir) {
                    log::warn!("Failed to delete results {:?}: {}", results_dir, e);
                }
            }
            let upload = Path::new(&removed.upload_path);
            if upload.exists() {
                if let Err(e) = fs::remove_file(upload) {
                    log::warn!("Failed to delete upload {:?}: {}", upload, e);
                }
            }
        }

        log::debug!("Deleted analysis job: {}", job_id);
        Ok(())
    }

    /// Startup reconciliation: jobs interrupted mid-run are failed, pending
    /// jobs are queued again. Returns the number re-queued.
    pub fn recover(&self) -> Result<usize, AnalysisError> {
        let pending = update_json_file(self.jobs_path(), |jobs: &mut Vec<AnalysisJob>| {
            let mut pending = Vec::new();
            for job in jobs.iter_mut() {
                match job.status {
                    AnalysisJobStatus::Processing => {
                        job.status = AnalysisJobStatus::Failed;
                        job.stage = None;
                        job.error = Some("Interrupted by service restart".to_string());
                        job.completed_at = Some(now_rfc3339());
                    }
                    AnalysisJobStatus::Pending => pending.push(job.clone()),
                    _ => {}
                }
            }
            Ok::<_, AnalysisError>(pending)
        })?;

        for job in &pending {
            let upload = StoredUpload {
                original_filename: job.original_filename.clone(),
                path: PathBuf::from(&job.upload_path),
                size: fs::metadata(&job.upload_path).map(|m| m.len()).unwrap_or(0),
            };
            self.spawn_worker(job.id.clone(), upload);
        }

        if !pending.is_empty() {
            log::info!("Re-queued {} pending analysis jobs", pending.len());
        }
        Ok(pending.len())
    }

    /// Drop terminal job records that finished more than `max_age` before
    /// `now`. Outputs on disk are left alone. Returns the number pruned.
    pub fn prune_finished(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, AnalysisError> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return Ok(0);
        };

        let pruned = update_json_file(self.jobs_path(), |jobs: &mut Vec<AnalysisJob>| {
            let before = jobs.len();
            jobs.retain(|job| {
                let finished_at = job
                    .completed_at
                    .as_deref()
                    .and_then(|at| DateTime::parse_from_rfc3339(at).ok());
                match finished_at {
                    Some(at) if job.status.is_terminal() => at.with_timezone(&Utc) >= cutoff,
                    _ => true,
                }
            });
            Ok::<_, AnalysisError>(before - jobs.len())
        })?;

        if pruned > 0 {
            log::info!("Pruned {} finished analysis jobs", pruned);
        }
        Ok(pruned)
    }

    fn spawn_worker(&self, job_id: String, upload: StoredUpload) {
        let token = CancellationToken::new();
        self.inner.tokens.lock().insert(job_id.clone(), token.clone());

        let queue = self.clone();
        tokio::spawn(async move {
            queue.run_job(&job_id, upload, token).await;
            queue.inner.tokens.lock().remove(&job_id);
        });
    }

    fn mark_processing(&self, job_id: &str) -> Result<bool, AnalysisError> {
        update_json_file(self.jobs_path(), |jobs: &mut Vec<AnalysisJob>| {
            let job = find_job(jobs, job_id)?;
            if job.status != AnalysisJobStatus::Pending {
                return Ok(false);
            }
            job.status = AnalysisJobStatus::Processing;
            job.stage = Some("starting".to_string());
            job.started_at = Some(now_rfc3339());
            Ok(true)
        })
    }

    async fn run_job(&self, job_id: &str, upload: StoredUpload, token: CancellationToken) {
        let _permit = tokio::select! {
            permit = self.inner.workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = token.cancelled() => return,
        };

        match self.mark_processing(job_id) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Skipping analysis job {}: no longer pending", job_id);
                return;
            }
            Err(e) => {
                log::error!("Failed to start analysis job {}: {}", job_id, e);
                return;
            }
        }

        let (tx, rx) = mpsc::channel::<String>(PROGRESS_CHANNEL_CAPACITY);
        let progress = tokio::spawn(track_progress(
            self.jobs_path().to_path_buf(),
            job_id.to_string(),
            rx,
        ));

        let result = self
            .inner
            .pipeline
            .analyze(
                job_id,
                &upload,
                RunHooks {
                    line_observer: Some(tx),
                    cancel: Some(token),
                },
            )
            .await;
        let _ = progress.await;

        if let Err(e) = self.store_outcome(job_id, result) {
            log::error!("Failed to record outcome of analysis job {}: {}", job_id, e);
        }
    }

    /// Record the pipeline outcome. Only a job still marked processing takes
    /// it; a job cancelled or deleted meanwhile keeps its state, and results
    /// organized for it are removed. Returns whether the outcome was applied.
    fn store_outcome(
        &self,
        job_id: &str,
        result: Result<AnalysisData, AnalysisError>,
    ) -> Result<bool, AnalysisError> {
        let produced_results = result.is_ok();

        let applied = update_json_file(self.jobs_path(), |jobs: &mut Vec<AnalysisJob>| {
            let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
                return Ok::<_, AnalysisError>(false);
            };
            if job.status != AnalysisJobStatus::Processing {
                log::info!(
                    "Dropping late outcome for analysis job {} ({:?})",
                    job_id,
                    job.status
                );
                return Ok(false);
            }

            job.stage = None;
            job.completed_at = Some(now_rfc3339());

            match result {
                Ok(data) => {
                    job.status = AnalysisJobStatus::Completed;
                    job.progress = 100;
                    job.result = Some(data);
                }
                Err(AnalysisError::Invocation(InvocationError::Cancelled)) => {
                    job.status = AnalysisJobStatus::Cancelled;
                }
                Err(error) => {
                    log::warn!("Analysis job {} failed: {}", job_id, error);
                    job.status = AnalysisJobStatus::Failed;
                    job.error = Some(error.client_message());
                    job.debug = error.diagnostics();
                }
            }
            Ok(true)
        })?;

        if !applied && produced_results {
            let results_dir = self.inner.pipeline.paths().results_dir_for(job_id);
            if results_dir.exists() {
                if let Err(e) = fs::remove_dir_all(&results_dir) {
                    log::warn!("Failed to remove orphaned results {:?}: {}", results_dir, e);
                }
            }
        }
        Ok(applied)
    }
}

async fn track_progress(jobs_path: PathBuf, job_id: String, mut rx: mpsc::Receiver<String>) {
    let debounce = Duration::from_millis(PROGRESS_WRITE_DEBOUNCE_MS);
    let mut last_write: Option<Instant> = None;

    while let Some(line) = rx.recv().await {
        let Some((percent, stage)) = progress_from_line(&line) else {
            continue;
        };

        let due = percent == 100 || last_write.map_or(true, |at| at.elapsed() >= debounce);
        if !due {
            continue;
        }

        let written = update_json_file(&jobs_path, |jobs: &mut Vec<AnalysisJob>| {
            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                if job.status == AnalysisJobStatus::Processing {
                    job.progress = percent;
                    job.stage = stage.or_else(|| Some("processing".to_string()));
                }
            }
            Ok::<_, String>(())
        });
        if let Err(e) = written {
            log::warn!("Failed to record progress for {}: {}", job_id, e);
        }
        last_write = Some(Instant::now());
    }
}
