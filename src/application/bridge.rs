use super::directory::CapabilityDirectory;
use super::tooling::{ToolHostInterface, ToolPayload};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Substituted whenever a tool produces no usable output, so the model
/// always has something to reason over.
pub const NO_CONTENT: &str = "no content";

/// Adapts a model-issued tool call into a host invocation and normalizes
/// whatever comes back into plain, never-empty text. Tool-level failures are
/// encoded as result text; nothing escapes this layer as an error.
pub struct ToolBridge {
    host: Arc<dyn ToolHostInterface>,
    call_timeout: Duration,
}

impl ToolBridge {
    pub fn new(host: Arc<dyn ToolHostInterface>, call_timeout: Duration) -> Self {
        Self { host, call_timeout }
    }

    /// Invoke `name` with `arguments`. Unknown names are not rejected
    /// locally; the host is authoritative and is asked directly. The
    /// directory is consulted for logging context only.
    pub async fn invoke(
        &self,
        directory: &CapabilityDirectory,
        name: &str,
        arguments: Value,
    ) -> String {
        if directory.get(name).is_none() {
            debug!(tool = name, "invoking tool absent from the directory");
        }

        let outcome =
            tokio::time::timeout(self.call_timeout, self.host.call_tool(name, arguments)).await;

        let text = match outcome {
            Ok(Ok(payload)) => render_payload(name, payload),
            Ok(Err(err)) => {
                warn!(tool = name, %err, "tool invocation failed");
                format!("tool '{name}' failed: {err}")
            }
            Err(_) => {
                warn!(
                    tool = name,
                    timeout_secs = self.call_timeout.as_secs(),
                    "tool invocation timed out"
                );
                format!(
                    "tool '{name}' timed out after {} seconds",
                    self.call_timeout.as_secs()
                )
            }
        };

        debug_assert!(!text.is_empty());
        text
    }

    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }
}

fn render_payload(name: &str, payload: ToolPayload) -> String {
    let joined = payload
        .content
        .iter()
        .map(|block| block.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if payload.is_error {
        info!(tool = name, "tool reported an error result");
        if joined.is_empty() {
            return format!("tool '{name}' reported an error with no detail");
        }
        return format!("tool '{name}' error: {joined}");
    }

    if joined.is_empty() {
        return NO_CONTENT.to_string();
    }
    joined
}
