//! Subcommand implementations.

pub mod check;
pub mod config_cmd;
pub mod events;
pub mod init;
pub mod replay;
pub mod run;

use std::path::{Path, PathBuf};

use causeway_config::AppConfig;

/// The config file in effect: `--config`, or `~/.causeway/config.toml`.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load_with_env(&config_file(path))
        .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}
