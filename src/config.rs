use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::ai::DEFAULT_MODEL;

const DB_FILE: &str = "apptrack.db";

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub export_dir: PathBuf,
    pub model: String,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = match optional_env("APPTRACK_DATA_DIR")? {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };
        let export_dir = optional_env("APPTRACK_EXPORT_DIR")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            data_dir,
            export_dir,
            model: optional_env("APPTRACK_MODEL")?.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            log_filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "apptrack") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

/// Unset is fine; set-but-blank is a mistake worth reporting.
fn optional_env(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => {
            Err(anyhow!("Environment variable '{}' is set but empty", key))
        }
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow!("Environment variable '{}' is invalid: {}", key, e)),
    }
}
