//! What tools and forms have in common.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureKind {
    Tool,
    Form,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Form => write!(f, "form"),
        }
    }
}

/// A named capability the agent can pick during a turn.
pub trait Procedure: Send + Sync {
    /// Canonical name, unique among the active procedures.
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Sample utterances that should lead to this procedure.
    fn start_examples(&self) -> &[String];
    fn kind(&self) -> ProcedureKind;
    /// Plugin that contributed it.
    fn plugin_id(&self) -> &str;
}

/// Canonical procedure name: trimmed, lowercase, whitespace runs become `_`.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}
