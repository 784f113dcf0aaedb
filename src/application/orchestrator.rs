use super::bridge::ToolBridge;
use super::directory::CapabilityDirectory;
use super::prompt;
use super::tooling::{HostError, ToolHostInterface};
use super::transcript::{Transcript, TranscriptError};
use crate::domain::types::{ToolCallResult, Turn};
use crate::infrastructure::model::{ModelCompletion, ModelError, ModelProvider, ModelRequest};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;


#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

impl OrchestratorError {
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::Host(err) => err.user_message(),
            OrchestratorError::Model(err) => err.user_message(),
            OrchestratorError::Transcript(err) => {
                format!("Internal transcript defect: {err}")
            }
        }
    }
}

/// Everything one conversation owns: the capability directory fetched at
/// start, the prompt rendered from it, and the transcript. Torn down with
/// the session; nothing is persisted.
pub struct Session {
    pub session_id: String,
    directory: CapabilityDirectory,
    system_prompt: String,
    transcript: Transcript,
}

impl Session {
    /// Read-only copy of the raw transcript.
    pub fn history(&self) -> Vec<Turn> {
        self.transcript.history()
    }

    pub fn clear_history(&mut self) {
        self.transcript.clear();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn directory(&self) -> &CapabilityDirectory {
        &self.directory
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub model: String,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
}

/// Drives the bounded negotiation between the model and the tool host for
/// one user utterance at a time. Strictly sequential: one model call, then
/// the round's tool calls in request order, then the next model call.
pub struct Orchestrator<P: ModelProvider> {
    provider: P,
    host: Arc<dyn ToolHostInterface>,
    bridge: ToolBridge,
    options: OrchestratorOptions,
}

impl<P: ModelProvider> Orchestrator<P> {
    pub fn new(
        provider: P,
        host: Arc<dyn ToolHostInterface>,
        options: OrchestratorOptions,
    ) -> Self {
        let bridge = ToolBridge::new(host.clone(), options.tool_timeout);
        Self {
            provider,
            host,
            bridge,
            options,
        }
    }

    /// Fetch the capability directory (exactly once per session) and render
    /// the system prompt from it.
    pub async fn start_session(&self) -> Result<Session, OrchestratorError> {
        let directory = CapabilityDirectory::fetch(self.host.as_ref()).await?;
        let system_prompt = prompt::render(directory.specs());
        let session_id = Uuid::new_v4().to_string();
        info!(
            session_id = session_id.as_str(),
            tools = directory.specs().len(),
            "Session started"
        );
        Ok(Session {
            session_id,
            directory,
            system_prompt,
            transcript: Transcript::new(),
        })
    }

    /// Resolve one user utterance, interleaving model calls and tool
    /// dispatch for at most `max_rounds` rounds. Tool failures become result
    /// text; a failed model call terminates the run with the transcript
    /// rolled back to its pre-call state.
    pub async fn run(
        &self,
        session: &mut Session,
        user_text: &str,
        max_rounds: usize,
    ) -> Result<String, OrchestratorError> {
        session.transcript.append(Turn::user(user_text))?;

        let mut round = 0;
        let mut last_text = String::new();

        while round < max_rounds {
            let mark = session.transcript.len();
            let completion = match self.complete_round(session).await {
                Ok(completion) => completion,
                Err(err) => {
                    // No partial append survives a failed round.
                    session.transcript.truncate(mark);
                    warn!(round, %err, "model call failed; terminating run");
                    return Err(err.into());
                }
            };

            let text = concat_segments(&completion.text_segments);
            if completion.tool_calls.is_empty() && text.is_none() {
                session.transcript.truncate(mark);
                return Err(ModelError::InvalidResponse(
                    "completion carried neither text nor tool calls".into(),
                )
                .into());
            }
            if let Some(text) = &text {
                last_text = text.clone();
            }

            let tool_calls = completion.tool_calls;
            session
                .transcript
                .append(Turn::assistant(text, tool_calls.clone()))?;

            if tool_calls.is_empty() {
                debug!(round, "negotiation converged");
                return Ok(last_text);
            }

            // Serialized on purpose: later calls in the round may depend on
            // earlier calls' side effects inside the host.
            let mut results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                info!(
                    session_id = session.session_id.as_str(),
                    tool = call.tool_name.as_str(),
                    call_id = call.call_id.as_str(),
                    "Dispatching tool call"
                );
                let text = self
                    .bridge
                    .invoke(&session.directory, &call.tool_name, call.arguments.clone())
                    .await;
                results.push(ToolCallResult {
                    call_id: call.call_id.clone(),
                    text,
                });
            }
            session.transcript.append(Turn::ToolResults { results })?;
            round += 1;
        }

        // Round budget exhausted while the model still wanted tools.
        warn!(
            session_id = session.session_id.as_str(),
            max_rounds, "round budget exhausted with tool calls pending"
        );
        if last_text.is_empty() {
            Ok(synthesize_fallback(&session.transcript.history()))
        } else {
            Ok(last_text)
        }
    }

    async fn complete_round(&self, session: &Session) -> Result<ModelCompletion, ModelError> {
        let request = ModelRequest {
            model: self.options.model.clone(),
            system: session.system_prompt.clone(),
            turns: session.transcript.snapshot(),
            tools: session.directory.specs().to_vec(),
        };

        match tokio::time::timeout(self.options.model_timeout, self.provider.complete(request))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ModelError::Timeout {
                seconds: self.options.model_timeout.as_secs(),
            }),
        }
    }

    /// Release the tool-host connection.
    pub async fn shutdown(&self) {
        self.bridge.shutdown().await;
    }
}

fn concat_segments(segments: &[String]) -> Option<String> {
    let joined = segments
        .iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() { None } else { Some(joined) }
}

/// The caller never receives an empty answer after tool use: when the round
/// budget runs out before the model produced any text, summarize the most
/// recent tool results instead.
fn synthesize_fallback(history: &[Turn]) -> String {
    let recent = history.iter().rev().find_map(|turn| match turn {
        Turn::ToolResults { results } if !results.is_empty() => Some(results),
        _ => None,
    });

    match recent {
        Some(results) => {
            let summary = results
                .iter()
                .map(|result| result.text.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            format!(
                "I ran out of tool rounds before reaching a final answer. The most recent tool results were: {summary}"
            )
        }
        None => "I ran out of tool rounds before reaching a final answer.".to_string(),
    }
}
