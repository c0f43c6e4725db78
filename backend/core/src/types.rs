use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a multi-turn form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    #[default]
    Incomplete,
    Complete,
    WaitConfirm,
    Closed,
}

impl fmt::Display for FormState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
            Self::WaitConfirm => "wait_confirm",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Ai,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "Human"),
            Self::Ai => write!(f, "AI"),
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub who: Speaker,
    pub text: String,
    pub when: chrono::DateTime<chrono::Utc>,
}

impl ChatTurn {
    pub fn human(text: impl Into<String>) -> Self {
        Self { who: Speaker::Human, text: text.into(), when: chrono::Utc::now() }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self { who: Speaker::Ai, text: text.into(), when: chrono::Utc::now() }
    }
}

/// Which memory collection a recall result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Episodic,
    Declarative,
    Procedural,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 3] = [Self::Episodic, Self::Declarative, Self::Procedural];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Declarative => "declarative",
            Self::Procedural => "procedural",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked recall hit stored in working memory.
///
/// For procedural memories `metadata` carries `name` (the procedure) and
/// `kind` (`tool` or `form`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledMemory {
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RecalledMemory {
    pub fn new(content: impl Into<String>, score: f32, metadata: serde_json::Value) -> Self {
        Self { content: content.into(), score, metadata }
    }

    /// Procedure name for procedural hits, if present.
    pub fn procedure_name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(|v| v.as_str())
    }
}

/// Messages pushed to the client while a turn is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A streamed model token.
    Token(String),
    /// Out-of-band notification (e.g. emitted by a tool).
    Notification(String),
}
