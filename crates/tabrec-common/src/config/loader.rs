use super::schema::RecorderConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Resolves the recorder config. The first match wins:
/// 1. an explicit path (a missing or unreadable file is an error, not a fallback)
/// 2. `./tabrec.yaml`
/// 3. `~/.tabrec/config.yaml`
/// 4. built-in defaults
pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn load(path: Option<&Path>) -> Result<RecorderConfig, ConfigError> {
        match path {
            Some(path) => Self::load_from(path).await,
            None => Self::load_default().await,
        }
    }

    /// Steps 2 to 4: the first existing default location, else defaults.
    pub async fn load_default() -> Result<RecorderConfig, ConfigError> {
        for candidate in Self::default_locations() {
            if candidate.exists() {
                return Self::load_from(&candidate).await;
            }
        }
        Ok(RecorderConfig::default())
    }

    /// Default locations in lookup order.
    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from("./tabrec.yaml")];
        if let Some(home) = dirs::home_dir() {
            locations.push(home.join(".tabrec").join("config.yaml"));
        }
        locations
    }

    pub async fn load_from(path: &Path) -> Result<RecorderConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: RecorderConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
