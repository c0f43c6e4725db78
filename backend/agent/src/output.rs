//! What one decision produces.

use serde::{Deserialize, Serialize};

/// A procedure invocation made while answering: `(procedure, input, observation)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStep {
    pub procedure: String,
    pub input: Option<String>,
    pub observation: String,
}

impl IntermediateStep {
    pub fn new(
        procedure: impl Into<String>,
        input: Option<String>,
        observation: impl Into<String>,
    ) -> Self {
        Self {
            procedure: procedure.into(),
            input,
            observation: observation.into(),
        }
    }
}

/// Reply of the agent for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub output: String,
    /// The reply goes to the user as is; no conversational chain runs after it.
    #[serde(default)]
    pub return_direct: bool,
    #[serde(default)]
    pub intermediate_steps: Vec<IntermediateStep>,
}

impl AgentOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn direct(output: impl Into<String>, steps: Vec<IntermediateStep>) -> Self {
        Self {
            output: output.into(),
            return_direct: true,
            intermediate_steps: steps,
        }
    }
}
