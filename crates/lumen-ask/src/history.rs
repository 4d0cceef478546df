//! Conversation history rendering for prompt injection

use serde::{Deserialize, Serialize};

/// Placeholder injected when no history is available
pub const NO_HISTORY_PLACEHOLDER: &str = "No conversation history available.";

/// Only the most recent turns are rendered
const MAX_TURNS: usize = 5;

/// One prior question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub response: String,
}

/// Conversation history, tagged by the caller.
///
/// Callers that hold already-formatted transcript lines (one speaker turn
/// per line) pass `RawTranscript`; callers that collected question/answer
/// pairs pass `Turns`. The variant is chosen by the caller, never sniffed
/// here; [`HistoryInput::from_legacy`] exists only for migration callers
/// still holding untagged values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryInput {
    RawTranscript(Vec<String>),
    Turns(Vec<ConversationTurn>),
}

impl HistoryInput {
    /// Whether there is any history at all
    pub fn is_empty(&self) -> bool {
        match self {
            Self::RawTranscript(lines) => lines.is_empty(),
            Self::Turns(turns) => turns.is_empty(),
        }
    }

    /// Interpret untagged legacy values with the historical sniff: a string
    /// first element containing a colon means transcript lines, anything
    /// else is read as question/response pairs.
    pub fn from_legacy(raw: Vec<serde_json::Value>) -> Self {
        match raw.first() {
            Some(serde_json::Value::String(first)) if first.contains(':') => Self::RawTranscript(
                raw.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => Self::Turns(
                raw.iter()
                    .map(|v| ConversationTurn {
                        question: v
                            .get("question")
                            .and_then(|q| q.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        response: v
                            .get("response")
                            .and_then(|r| r.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect(),
            ),
        }
    }

    /// Render the history into the single context string injected into the
    /// system prompt.
    pub fn format(&self) -> String {
        if self.is_empty() {
            return NO_HISTORY_PLACEHOLDER.to_string();
        }

        match self {
            Self::RawTranscript(lines) => lines.join("\n"),
            Self::Turns(turns) => {
                let start = turns.len().saturating_sub(MAX_TURNS);
                let rendered = turns[start..]
                    .iter()
                    .map(|turn| {
                        format!(
                            "Previous Question: {}\nPrevious Response: {}",
                            turn.question, turn.response
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");

                format!(
                    "Conversation Context:\n{}\n\nPlease continue the conversation based on this context.",
                    rendered
                )
            }
        }
    }
}

/// Render an optional history, falling back to the placeholder.
pub fn format_opt(history: Option<&HistoryInput>) -> String {
    history
        .map(HistoryInput::format)
        .unwrap_or_else(|| NO_HISTORY_PLACEHOLDER.to_string())
}
