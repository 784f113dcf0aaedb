use super::error::HostError;
use super::interface::{ContentBlock, ToolHostInterface, ToolPayload};
use crate::config::HostConfig;
use crate::domain::types::{ToolParam, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

const PROTOCOL_VERSION: &str = "2025-06-18";

/// Stdio JSON-RPC connection to a single tool host process.
#[derive(Clone)]
pub struct HostProcess {
    inner: Arc<HostProcessInner>,
}

struct HostProcessInner {
    config: HostConfig,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, oneshot::Sender<Result<Value, HostError>>>>,
    id_counter: AtomicU64,
}

impl HostProcess {
    pub fn new(config: HostConfig) -> Self {
        Self {
            inner: Arc::new(HostProcessInner {
                config,
                child: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                pending: AsyncMutex::new(HashMap::new()),
                id_counter: AtomicU64::new(1),
            }),
        }
    }

    /// Spawn the host process and run the initialize handshake if it is not
    /// already running.
    pub async fn ensure_running(&self) -> Result<(), HostError> {
        self.inner.ensure_running().await
    }
}

#[async_trait]
impl ToolHostInterface for HostProcess {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, HostError> {
        self.ensure_running().await?;
        let result = self.inner.send_request("tools/list", json!({})).await?;
        Ok(parse_tool_listing(&result))
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolPayload, HostError> {
        self.ensure_running().await?;
        let params = json!({
            "name": name,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        let result = self.inner.send_request("tools/call", params).await?;
        Ok(parse_tool_payload(&result))
    }

    async fn shutdown(&self) {
        self.inner.reset().await;
    }
}

impl HostProcessInner {
    async fn ensure_running(self: &Arc<Self>) -> Result<(), HostError> {
        {
            let child = self.child.lock().await;
            if child.is_some() {
                return Ok(());
            }
        }

        let mut command = Command::new(&self.config.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.config.workdir {
            command.current_dir(dir);
        }
        if !self.config.args.is_empty() {
            command.args(&self.config.args);
        }
        for (key, value) in &self.config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| HostError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport_error("failed to capture host stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport_error("failed to capture host stdout"))?;

        {
            let mut writer = self.writer.lock().await;
            *writer = Some(BufWriter::new(stdin));
        }
        {
            let mut slot = self.child.lock().await;
            *slot = Some(child);
        }

        let reader_self = Arc::clone(self);
        tokio::spawn(async move {
            reader_self.reader_loop(stdout).await;
        });

        match self.initialize_sequence().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.reset().await;
                Err(err)
            }
        }
    }

    async fn initialize_sequence(&self) -> Result<(), HostError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.send_request("initialize", params).await?;
        self.send_notification("notifications/initialized", json!({}))
            .await?;
        Ok(())
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(item) = lines.next_line().await {
            match item {
                Some(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => self.route_inbound(value).await,
                        Err(source) => {
                            warn!(line = raw, %source, "received invalid JSON from tool host");
                        }
                    }
                }
                None => break,
            }
        }

        self.reset().await;
    }

    async fn route_inbound(&self, value: Value) {
        let Some(id) = value.get("id").and_then(response_key) else {
            if let Some(method) = value.get("method").and_then(Value::as_str) {
                debug!(method, "ignoring notification from tool host");
            }
            return;
        };

        let responder = {
            let mut pending = self.pending.lock().await;
            pending.remove(&id)
        };

        let Some(sender) = responder else {
            debug!(response_id = id, "received response for unknown request");
            return;
        };

        if let Some(error) = value.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            let _ = sender.send(Err(HostError::Rpc { code, message }));
        } else {
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            let _ = sender.send(Ok(result));
        }
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, HostError> {
        let id = format!("req-{}", self.id_counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(err) = self.write_message(&payload).await {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(HostError::Terminated),
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), HostError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.write_message(&payload).await
    }

    async fn write_message(&self, message: &Value) -> Result<(), HostError> {
        let encoded =
            serde_json::to_string(message).map_err(|source| HostError::InvalidJson { source })?;

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| transport_error("writer not initialised"))?;
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| transport_error(source.to_string()))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|source| transport_error(source.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|source| transport_error(source.to_string()))?;
        Ok(())
    }

    async fn reset(&self) {
        {
            let mut writer = self.writer.lock().await;
            *writer = None;
        }

        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            if let Err(err) = child.kill().await {
                debug!(%err, "failed to kill tool host process (may have already exited)");
            }
            let _ = child.wait().await;
        }
        drop(slot);

        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(HostError::Terminated));
        }
    }
}

fn transport_error(message: impl Into<String>) -> HostError {
    HostError::Transport {
        message: message.into(),
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}

fn parse_tool_listing(result: &Value) -> Vec<ToolSpec> {
    let Some(tools) = result.get("tools").and_then(Value::as_array) else {
        return Vec::new();
    };

    tools
        .iter()
        .filter_map(|tool| {
            let name = tool.get("name").and_then(Value::as_str)?;
            let description = tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(ToolSpec {
                name: name.to_string(),
                description: description.to_string(),
                parameters: parse_parameters(tool.get("inputSchema")),
            })
        })
        .collect()
}

fn parse_parameters(schema: Option<&Value>) -> Vec<ToolParam> {
    let Some(properties) = schema
        .and_then(|value| value.get("properties"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, shape)| ToolParam {
            name: name.clone(),
            description: shape
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            kind: shape
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("string")
                .to_string(),
        })
        .collect()
}

fn parse_tool_payload(result: &Value) -> ToolPayload {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| {
                    let kind = block
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("text")
                        .to_string();
                    let text = block.get("text").and_then(Value::as_str)?;
                    Some(ContentBlock {
                        kind,
                        text: text.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ToolPayload { content, is_error }
}
