use std::path::Path;

use serde::{Deserialize, Serialize};
use twine::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub session: SessionConfig,
    pub tick_rate: u32,
    /// Frames to run before exiting; runs until killed when absent.
    pub frames: Option<u64>,
    /// Radius of the circle the local player drifts along.
    pub drift_radius: f32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            tick_rate: 60,
            frames: None,
            drift_radius: 5.0,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display.clone(),
            source,
        })?;
        log::info!("Loaded config from {}", display);
        Ok(config)
    }
}
