use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "llama3";
const DEFAULT_CONFIG_PATH: &str = "config/helmsman.toml";
const DEFAULT_MAX_ROUNDS: usize = 8;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub max_rounds: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub host: Option<HostConfig>,
}

/// Command line for the tool host process, spoken to over stdio.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    model: Option<String>,
    max_rounds: Option<usize>,
    model_timeout_secs: Option<u64>,
    tool_timeout_secs: Option<u64>,
    host: Option<HostConfig>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return read_config(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        match read_config(default_path) {
            Ok(config) => Ok(config),
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("Configuration file not found; using defaults");
                Ok(Self::default())
            }
            Err(other) => Err(other),
        }
    }

    pub fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            host: None,
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "Reading client configuration file");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(AppConfig {
        model: parsed.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        max_rounds: parsed.max_rounds.unwrap_or(DEFAULT_MAX_ROUNDS),
        model_timeout: Duration::from_secs(
            parsed
                .model_timeout_secs
                .unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS),
        ),
        tool_timeout: Duration::from_secs(
            parsed.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
        ),
        host: parsed.host,
    })
}
