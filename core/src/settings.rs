//! Tool-level settings.
//!
//! Settings live in `settings.yaml` inside the config directory
//! (`$MLBOX_CONFIG_DIR`, else `~/.config/mlbox`). A missing file yields the
//! defaults; selected fields can be overridden from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};


/// Settings shared by all runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SSH `ConnectTimeout` in seconds.
    pub connect_timeout_secs: u32,
    /// Patterns excluded from every rsync transfer.
    pub default_excludes: Vec<String>,
    /// Log filter used when neither `RUST_LOG` nor `--log-level` is given.
    pub log_level: String,
    /// Stream docker/rsync output to the terminal instead of capturing it.
    pub stream_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            connect_timeout_secs: 10,
            default_excludes: vec![
                ".git".to_string(),
                "__pycache__".to_string(),
                "*.pyc".to_string(),
            ],
            log_level: "info".to_string(),
            stream_output: true,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> Result<Settings> {
        let content = crate::error::read_to_string(path)?;
        Self::parse_at(&content, path)
    }

    /// Parse settings from a YAML string.
    pub fn parse(content: &str) -> Result<Settings> {
        Self::parse_at(content, Path::new("<settings>"))
    }

    fn parse_at(content: &str, origin: &Path) -> Result<Settings> {
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(content).map_err(|e| Error::yaml(origin, e))
    }

    /// Load `settings.yaml` from `config_dir` if present, then apply
    /// environment overrides.
    pub fn resolve(config_dir: &Path) -> Result<Settings> {
        let path = config_dir.join("settings.yaml");
        let mut settings = if path.is_file() {
            Self::load(&path)?
        } else {
            Settings::default()
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `MLBOX_LOG_LEVEL` / `MLBOX_CONNECT_TIMEOUT` via the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("MLBOX_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.log_level = level.trim().to_string();
            }
        }
        if let Some(timeout) = lookup("MLBOX_CONNECT_TIMEOUT") {
            self.connect_timeout_secs = timeout.trim().parse().map_err(|_| {
                Error::config(format!("MLBOX_CONNECT_TIMEOUT must be an integer, got '{}'", timeout))
            })?;
        }
        Ok(())
    }
}


/// Directory holding `settings.yaml`.
pub fn resolve_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MLBOX_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".config").join("mlbox")
}
