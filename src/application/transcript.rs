use crate::domain::types::{ToolCallResult, Turn};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// Invariant violations caught at append time. These indicate a
/// construction bug upstream, not a runtime condition to recover from.
#[derive(Debug, Error, PartialEq)]
pub enum TranscriptError {
    #[error("malformed turn: {0}")]
    MalformedTurn(String),
}

/// Ordered log of conversation turns. Appends are validated eagerly so the
/// raw history is always well-formed; `snapshot` additionally applies the
/// defensive normalization a strict model-facing protocol would expect.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a turn, rejecting ones that violate the data-model invariants:
    /// empty content, a results turn without a preceding tool-calling
    /// assistant turn, or a result set whose call ids do not match the
    /// pending requests 1:1.
    pub fn append(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        if turn.is_empty() {
            return Err(TranscriptError::MalformedTurn(
                "turn carries neither text nor tool content".into(),
            ));
        }

        if let Turn::ToolResults { results } = &turn {
            self.check_results_match_pending(results)?;
        }

        self.turns.push(turn);
        Ok(())
    }

    fn check_results_match_pending(
        &self,
        results: &[ToolCallResult],
    ) -> Result<(), TranscriptError> {
        let pending = match self.turns.last() {
            Some(turn @ Turn::Assistant { .. }) if !turn.tool_calls().is_empty() => {
                turn.tool_calls()
            }
            _ => {
                return Err(TranscriptError::MalformedTurn(
                    "tool results must follow an assistant turn that issued tool calls".into(),
                ));
            }
        };

        let expected: HashSet<&str> = pending.iter().map(|call| call.call_id.as_str()).collect();
        let actual: HashSet<&str> = results.iter().map(|result| result.call_id.as_str()).collect();
        if expected != actual || results.len() != pending.len() {
            return Err(TranscriptError::MalformedTurn(
                "tool result ids do not match the pending tool calls".into(),
            ));
        }

        for result in results {
            if result.text.is_empty() {
                return Err(TranscriptError::MalformedTurn(
                    "tool result text must not be empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// The sanitized view sent to the model: empty turns dropped and
    /// consecutive tool-call-free assistant turns collapsed into one.
    /// `append` validation makes both cases unreachable in this crate; the
    /// normalization is kept so correctness does not hinge on every caller
    /// being well-behaved.
    pub fn snapshot(&self) -> Vec<Turn> {
        let mut view: Vec<Turn> = Vec::with_capacity(self.turns.len());
        for turn in &self.turns {
            if turn.is_empty() {
                warn!("dropping empty turn from model snapshot");
                continue;
            }

            let collapsible = turn.is_assistant()
                && turn.tool_calls().is_empty()
                && view
                    .last()
                    .map(|prev| prev.is_assistant() && prev.tool_calls().is_empty())
                    .unwrap_or(false);
            if collapsible {
                warn!("collapsing consecutive assistant turns in model snapshot");
                if let (
                    Some(Turn::Assistant {
                        text: Some(prev), ..
                    }),
                    Turn::Assistant {
                        text: Some(next), ..
                    },
                ) = (view.last_mut(), turn)
                {
                    prev.push('\n');
                    prev.push_str(next);
                }
                continue;
            }

            view.push(turn.clone());
        }
        view
    }

    /// Raw, unsanitized copy for external inspection. Never mutated by
    /// `snapshot`.
    pub fn history(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Roll back to a previously recorded length. Used to undo the turns of
    /// a round whose model call failed, so no partial append survives.
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }
}
