use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared schema of one tool offered by the host. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// Parameters in the order the host declared them. The order matters:
    /// prompt rendering and schema export must be deterministic.
    #[serde(default)]
    pub parameters: Vec<ToolParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    /// Expected kind as declared by the host ("string", "number", ...).
    pub kind: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id, unique within the transcript.
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// Outcome of one tool invocation, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Matches the `call_id` of a pending [`ToolCallRequest`].
    pub call_id: String,
    /// Never empty; the bridge substitutes a sentinel when the tool
    /// produced nothing.
    pub text: String,
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        text: Option<String>,
        #[serde(default)]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResults {
        results: Vec<ToolCallResult>,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn assistant(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Turn::Assistant { text, tool_calls }
    }

    /// A turn carrying nothing the model or the user could react to.
    pub fn is_empty(&self) -> bool {
        match self {
            Turn::User { text } => text.trim().is_empty(),
            Turn::Assistant { text, tool_calls } => {
                tool_calls.is_empty()
                    && text
                        .as_deref()
                        .map(|value| value.trim().is_empty())
                        .unwrap_or(true)
            }
            Turn::ToolResults { results } => results.is_empty(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Turn::Assistant { .. })
    }

    /// Tool calls issued by an assistant turn, empty for other variants.
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Turn::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}
