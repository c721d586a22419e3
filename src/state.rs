// Shared application state handed to every request handler

use crate::analysis::{ActiveAnalyses, HawkEyePipeline, UploadPolicy};
use crate::jobs::JobQueue;
use crate::models::Settings;
use crate::utils::AppPaths;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub paths: Arc<AppPaths>,
    pub pipeline: HawkEyePipeline,
    pub jobs: JobQueue,
    pub active: ActiveAnalyses,
}

impl AppState {
    pub fn new(settings: Settings, paths: AppPaths) -> Self {
        let settings = Arc::new(settings);
        let paths = Arc::new(paths);
        let active = ActiveAnalyses::default();
        let pipeline = HawkEyePipeline::new(settings.clone(), paths.clone(), active.clone());
        let jobs = JobQueue::new(
            pipeline.clone(),
            paths.jobs_json_path(),
            settings.max_concurrent_jobs,
        );

        Self {
            settings,
            paths,
            pipeline,
            jobs,
            active,
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::from_settings(&self.settings)
    }
}
