use crate::domain::types::{ToolCallRequest, ToolCallResult, ToolSpec, Turn};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value, json};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub system: String,
    /// Sanitized transcript snapshot, oldest first.
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSpec>,
}

/// What one completion round produced: free-text segments in output order
/// plus zero or more tool invocation requests.
#[derive(Debug, Clone, Default)]
pub struct ModelCompletion {
    pub text_segments: Vec<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model provider rate limited the request")]
    RateLimited,
    #[error("model call timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
    #[error("model provider returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the model service. Check that it is running and accessible."
                        .to_string()
                } else if let Some(status) = err.status() {
                    format!(
                        "The model service answered with status {}. Try again later.",
                        status.as_u16()
                    )
                } else {
                    "A network error occurred while contacting the model service.".to_string()
                }
            }
            ModelError::RateLimited => {
                "The model service is rate limiting requests. Wait a moment and try again."
                    .to_string()
            }
            ModelError::Timeout { seconds } => {
                format!("The model took longer than {seconds} seconds to answer. Try again.")
            }
            ModelError::InvalidResponse(_) => {
                "The model service returned a response that could not be processed.".to_string()
            }
        }
    }
}

/// External language-model completion service.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelCompletion, ModelError>;
}

/// Ollama `/api/chat` client with native tool calling.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }
}

#[async_trait]
impl ModelProvider for OllamaClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelCompletion, ModelError> {
        let url = self.endpoint("/api/chat");
        let payload = ChatPayload::from_request(&request);
        info!(
            model = request.model.as_str(),
            url = %url,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Sending completion request to model provider"
        );

        let response = self.http.post(url).json(&payload).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        let body: ChatResponse = response.error_for_status()?.json().await?;
        debug!("Received completion from model provider");

        let message = body
            .message
            .ok_or_else(|| ModelError::InvalidResponse("missing message field".into()))?;
        Ok(message.into_completion())
    }
}

#[derive(Debug, Serialize)]
struct ChatPayload {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<Value>,
}

impl ChatPayload {
    fn from_request(request: &ModelRequest) -> Self {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if !request.system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: request.system.clone(),
                tool_calls: Vec::new(),
            });
        }
        for turn in &request.turns {
            append_turn(&mut messages, turn);
        }

        Self {
            model: request.model.clone(),
            messages,
            stream: false,
            tools: request.tools.iter().map(tool_schema).collect(),
        }
    }
}

fn append_turn(messages: &mut Vec<WireMessage>, turn: &Turn) {
    match turn {
        Turn::User { text } => messages.push(WireMessage {
            role: "user",
            content: text.clone(),
            tool_calls: Vec::new(),
        }),
        Turn::Assistant { text, tool_calls } => messages.push(WireMessage {
            role: "assistant",
            content: text.clone().unwrap_or_default(),
            tool_calls: tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.call_id,
                        "function": {
                            "name": call.tool_name,
                            "arguments": call.arguments,
                        }
                    })
                })
                .collect(),
        }),
        Turn::ToolResults { results } => {
            // One wire message per result keeps per-call attribution intact.
            for ToolCallResult { call_id, text } in results {
                messages.push(WireMessage {
                    role: "tool",
                    content: format!("[{call_id}] {text}"),
                    tool_calls: Vec::new(),
                });
            }
        }
    }
}

/// JSON-schema function declaration for one tool, parameters in directory
/// order.
fn tool_schema(spec: &ToolSpec) -> Value {
    let mut properties = JsonMap::new();
    for param in &spec.parameters {
        properties.insert(
            param.name.clone(),
            json!({
                "type": param.kind,
                "description": param.description,
            }),
        );
    }

    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": {
                "type": "object",
                "properties": properties,
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl ResponseMessage {
    fn into_completion(self) -> ModelCompletion {
        let text_segments = if self.content.trim().is_empty() {
            Vec::new()
        } else {
            vec![self.content]
        };

        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                // Ollama omits call ids; synthesize one so results can be
                // matched back to their request within the transcript.
                call_id: call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call-{}", Uuid::new_v4())),
                tool_name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        ModelCompletion {
            text_segments,
            tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ToolParam;

    #[test]
    fn endpoint_joins_paths_correctly() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(
            client.endpoint("/api/chat"),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn payload_maps_turn_roles() {
        let request = ModelRequest {
            model: "llama3".into(),
            system: "stay concise".into(),
            turns: vec![
                Turn::user("hi"),
                Turn::assistant(
                    None,
                    vec![ToolCallRequest {
                        call_id: "1".into(),
                        tool_name: "clock".into(),
                        arguments: json!({}),
                    }],
                ),
                Turn::ToolResults {
                    results: vec![ToolCallResult {
                        call_id: "1".into(),
                        text: "12:00".into(),
                    }],
                },
            ],
            tools: Vec::new(),
        };

        let payload = ChatPayload::from_request(&request);
        let roles: Vec<_> = payload.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(payload.messages[2].tool_calls.len(), 1);
        assert!(payload.messages[3].content.contains("12:00"));
    }

    #[test]
    fn tool_schema_lists_parameters_in_order() {
        let spec = ToolSpec {
            name: "say_hello".into(),
            description: "Greets.".into(),
            parameters: vec![
                ToolParam {
                    name: "name".into(),
                    description: "Who".into(),
                    kind: "string".into(),
                },
                ToolParam {
                    name: "loud".into(),
                    description: String::new(),
                    kind: "boolean".into(),
                },
            ],
        };

        let schema = tool_schema(&spec);
        let properties = schema["function"]["parameters"]["properties"]
            .as_object()
            .expect("properties object");
        let names: Vec<_> = properties.keys().cloned().collect();
        assert_eq!(names, vec!["name", "loud"]);
    }

    #[test]
    fn response_without_ids_gets_synthesized_call_ids() {
        let message = ResponseMessage {
            content: String::new(),
            tool_calls: vec![
                ResponseToolCall {
                    id: None,
                    function: ResponseFunction {
                        name: "clock".into(),
                        arguments: json!({}),
                    },
                },
                ResponseToolCall {
                    id: Some(String::new()),
                    function: ResponseFunction {
                        name: "clock".into(),
                        arguments: json!({}),
                    },
                },
            ],
        };

        let completion = message.into_completion();
        assert!(completion.text_segments.is_empty());
        assert_eq!(completion.tool_calls.len(), 2);
        assert!(!completion.tool_calls[0].call_id.is_empty());
        assert_ne!(
            completion.tool_calls[0].call_id,
            completion.tool_calls[1].call_id
        );
    }

    #[test]
    fn blank_content_produces_no_text_segment() {
        let message = ResponseMessage {
            content: "  \n".into(),
            tool_calls: Vec::new(),
        };
        let completion = message.into_completion();
        assert!(completion.text_segments.is_empty());
        assert!(completion.tool_calls.is_empty());
    }
}
