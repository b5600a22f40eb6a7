use crate::config::IdCaptureConfig;
use std::sync::{Arc, RwLock};
use tauri::command;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Arc<RwLock<IdCaptureConfig>> = Arc::new(RwLock::new(IdCaptureConfig::load_or_default()));
}

/// Snapshot of the active configuration, used when a flow starts
pub(crate) fn current_config() -> Result<IdCaptureConfig, String> {
    let config = GLOBAL_CONFIG.read().map_err(|e| e.to_string())?;
    Ok(config.clone())
}

/// Get the current configuration
#[command]
pub async fn get_config() -> Result<IdCaptureConfig, String> {
    current_config()
}

/// Update configuration. Flows already started keep their settings.
#[command]
pub async fn update_config(new_config: IdCaptureConfig) -> Result<(), String> {
    new_config.validate().map_err(|e| e.to_string())?;

    {
        let mut config = GLOBAL_CONFIG.write().map_err(|e| e.to_string())?;
        *config = new_config.clone();
    }

    new_config
        .save_to_file(IdCaptureConfig::default_path())
        .map_err(|e| e.to_string())?;

    log::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults
#[command]
pub async fn reset_config() -> Result<IdCaptureConfig, String> {
    let default_config = IdCaptureConfig::default();

    {
        let mut config = GLOBAL_CONFIG
            .write()
            .map_err(|e| format!("Failed to write config: {}", e))?;
        *config = default_config.clone();
    }

    default_config
        .save_to_file(IdCaptureConfig::default_path())
        .map_err(|e| e.to_string())?;

    Ok(default_config)
}
