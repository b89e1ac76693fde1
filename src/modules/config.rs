use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::AppConfig;

const DATA_DIR: &str = ".quota_failover";
const CONFIG_FILE: &str = "quota_config.json";

/// Get data directory path
pub fn get_data_dir() -> AppResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Config("Failed to get user home directory".to_string()))?;
    let data_dir = home.join(DATA_DIR);

    // Ensure directory exists
    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)?;
    }

    Ok(data_dir)
}

/// Path of the ledger file configured in `config`, under `data_dir`
pub fn ledger_path(data_dir: &Path, config: &AppConfig) -> PathBuf {
    data_dir.join(&config.ledger.file_name)
}

/// Load application config
pub fn load_app_config(data_dir: &Path) -> AppResult<AppConfig> {
    let config_path = data_dir.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(AppConfig::new());
    }

    let content = fs::read_to_string(&config_path)?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))
}

/// Save application config (atomic write)
pub fn save_app_config(data_dir: &Path, config: &AppConfig) -> AppResult<()> {
    if !data_dir.exists() {
        fs::create_dir_all(data_dir)?;
    }
    let config_path = data_dir.join(CONFIG_FILE);
    let temp_path = data_dir.join(format!("{}.tmp", CONFIG_FILE));

    let content = serde_json::to_string_pretty(config)?;
    fs::write(&temp_path, content)?;
    fs::rename(temp_path, config_path)?;
    Ok(())
}
