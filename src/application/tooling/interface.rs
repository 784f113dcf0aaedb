use super::error::HostError;
use crate::domain::types::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;

/// One block of tool output as returned by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub kind: String,
    pub text: String,
}

/// Raw result of one `tools/call` round trip.
#[derive(Debug, Clone, Default)]
pub struct ToolPayload {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
}

/// The tool host as consumed by the orchestrator: a capability listing plus
/// an invoker. Request dispatch inside the host is a black box.
#[async_trait]
pub trait ToolHostInterface: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, HostError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolPayload, HostError>;

    /// Release the host connection. Idempotent.
    async fn shutdown(&self);
}

/// Stand-in host for sessions configured without tools.
pub struct NullHost;

#[async_trait]
impl ToolHostInterface for NullHost {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, HostError> {
        Ok(Vec::new())
    }

    async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<ToolPayload, HostError> {
        Err(HostError::NotConfigured)
    }

    async fn shutdown(&self) {}
}
