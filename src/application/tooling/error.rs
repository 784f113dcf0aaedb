use std::io;
use thiserror::Error;

/// Failures while talking to the tool host process.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to spawn tool host '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("tool host transport failure: {message}")]
    Transport { message: String },
    #[error("tool host rejected request ({code}): {message}")]
    Rpc { code: i64, message: String },
    #[error("tool host process terminated")]
    Terminated,
    #[error("tool host produced invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
    #[error("no tool host configured")]
    NotConfigured,
}

impl HostError {
    pub fn user_message(&self) -> String {
        match self {
            HostError::Spawn { command, .. } => {
                format!("Could not start the tool host '{command}'. Check the [host] configuration.")
            }
            HostError::Transport { .. } | HostError::Terminated => {
                "Lost the connection to the tool host.".to_string()
            }
            HostError::Rpc { message, .. } => {
                format!("The tool host rejected the request: {message}")
            }
            HostError::InvalidJson { .. } => {
                "The tool host sent a response that could not be parsed.".to_string()
            }
            HostError::NotConfigured => {
                "No tool host is configured; running without tools.".to_string()
            }
        }
    }
}
