use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use quill_core::ComposerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {0}")]
    Read(String),
    #[error("parse {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub composer: ComposerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<CliConfig, ConfigError> {
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let raw = fs::read_to_string(path).map_err(|err| ConfigError::Read(err.to_string()))?;
    toml::from_str(&raw).map_err(|err| ConfigError::Parse(err.to_string()))
}
