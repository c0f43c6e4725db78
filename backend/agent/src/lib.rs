//! Hearth Agent
//!
//! The per-turn decision flow: active forms, instant tool triggers, procedure
//! selection and the conversational fallback, plus the runtime that wires
//! plugins, memory and the agent together.

pub mod context;
pub mod fallback;
pub mod orchestrator;
pub mod output;
pub mod prompts;
pub mod runtime;
pub mod selection;

#[cfg(test)]
mod testing;

pub use context::AgentContext;
pub use orchestrator::{AgentConfig, AgentOrchestrator};
pub use output::{AgentOutput, IntermediateStep};
pub use runtime::{Hearth, HearthOptions, UserMessage, init_logging, status};
pub use selection::{Action, SelectionChain, parse_action};
