pub mod analysis;
pub mod error;
pub mod file_manager;
pub mod handlers;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod process_manager;
pub mod state;
pub mod utils;

use analysis::sweeper::spawn_sweeper;
use file_manager::{initialize_json_file, read_json_file};
use handlers::build_router;
use models::{AnalysisJob, Settings};
use state::AppState;
use tokio::net::TcpListener;
use utils::{get_app_data_dir, get_logs_dir, get_settings_json_path, AppPaths};

pub const BIND_ENV: &str = "HAWKEYE_BIND";

fn load_settings() -> Result<Settings, String> {
    let settings_path = get_settings_json_path();
    initialize_json_file(&settings_path, &Settings::default())?;
    let mut settings: Settings = read_json_file(&settings_path)?;

    if let Some(bind) = std::env::var(BIND_ENV).ok().filter(|v| !v.trim().is_empty()) {
        log::info!("Bind address overridden by {}: {}", BIND_ENV, bind);
        settings.bind_address = bind;
    }
    Ok(settings)
}

fn initialize_app_data(settings: &Settings) -> Result<AppPaths, String> {
    let paths = AppPaths::resolve(&get_app_data_dir(), settings);
    paths.initialize_data_directories()?;
    initialize_json_file(&paths.jobs_json_path(), &Vec::<AnalysisJob>::new())?;
    Ok(paths)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}

/// Start the Hawk-Eye service and serve until Ctrl-C.
pub async fn run() -> Result<(), String> {
    logging::init(&get_logs_dir())?;

    let settings = load_settings()?;
    let paths = initialize_app_data(&settings)?;
    logging::cleanup_old_logs(&paths.logs_dir, settings.log_retention_days);

    let state = AppState::new(settings, paths);

    if let Err(e) = state.jobs.recover() {
        log::error!("Failed to recover analysis jobs: {}", e);
    }

    let _sweeper = spawn_sweeper(
        state.settings.clone(),
        state.paths.clone(),
        state.active.clone(),
        state.jobs.clone(),
    );

    let bind_address = state.settings.bind_address.clone();
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", bind_address, e))?;
    log::info!("Hawk-Eye listening on http://{}", bind_address);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {}", e))
}
