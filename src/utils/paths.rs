use crate::models::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DATA_DIR_ENV: &str = "HAWKEYE_DATA_DIR";

static APP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

pub fn get_app_data_dir() -> PathBuf {
    APP_DATA_DIR
        .get_or_init(|| {
            if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
                return PathBuf::from(dir);
            }
            let base_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
            base_dir.join("HawkEye")
        })
        .clone()
}

pub fn get_data_dir() -> PathBuf {
    get_app_data_dir().join("data")
}

pub fn get_logs_dir() -> PathBuf {
    get_app_data_dir().join("logs")
}

pub fn get_settings_json_path() -> PathBuf {
    get_data_dir().join("settings.json")
}

/// Resolve a configured root: absolute paths are kept, relative ones hang off `base`.
pub fn resolve_relative_to(base: &Path, configured: &str) -> PathBuf {
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Every directory the service touches, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub app_data_dir: PathBuf,
    pub upload_root: PathBuf,
    pub results_root: PathBuf,
    pub work_root: PathBuf,
    pub logs_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve(app_data_dir: &Path, settings: &Settings) -> Self {
        Self {
            app_data_dir: app_data_dir.to_path_buf(),
            upload_root: resolve_relative_to(app_data_dir, &settings.upload_root),
            results_root: resolve_relative_to(app_data_dir, &settings.results_root),
            work_root: resolve_relative_to(app_data_dir, &settings.work_root),
            logs_dir: app_data_dir.join("logs"),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.app_data_dir.join("data")
    }

    pub fn jobs_json_path(&self) -> PathBuf {
        self.data_dir().join("analysis_jobs.json")
    }

    pub fn work_dir_for(&self, analysis_id: &str) -> PathBuf {
        self.work_root.join(analysis_id)
    }

    pub fn results_dir_for(&self, analysis_id: &str) -> PathBuf {
        self.results_root.join(analysis_id)
    }

    pub fn initialize_data_directories(&self) -> Result<(), String> {
        let directories = [
            self.data_dir(),
            self.upload_root.clone(),
            self.results_root.clone(),
            self.work_root.clone(),
            self.logs_dir.clone(),
        ];

        for dir in &directories {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create directory {:?}: {}", dir, e))?;
                log::debug!("Created directory: {:?}", dir);
            }
        }

        log::info!("Data directories initialized at: {:?}", self.app_data_dir);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_roots_hang_off_data_dir() {
        let mut settings = Settings::default();
        settings.results_root = "/srv/hawkeye/results".to_string();

        let paths = AppPaths::resolve(Path::new("/var/lib/hawkeye"), &settings);

        assert_eq!(paths.upload_root, PathBuf::from("/var/lib/hawkeye/uploads/videos"));
        assert_eq!(paths.results_root, PathBuf::from("/srv/hawkeye/results"));
        assert_eq!(
            paths.jobs_json_path(),
            PathBuf::from("/var/lib/hawkeye/data/analysis_jobs.json")
        );
        assert_eq!(paths.work_dir_for("1_ab"), PathBuf::from("/var/lib/hawkeye/hawkeye_work/1_ab"));
    }

    #[test]
    fn test_initialize_creates_every_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::resolve(dir.path(), &Settings::default());

        paths.initialize_data_directories().unwrap();

        assert!(paths.upload_root.is_dir());
        assert!(paths.results_root.is_dir());
        assert!(paths.work_root.is_dir());
        assert!(paths.data_dir().is_dir());
    }
}
