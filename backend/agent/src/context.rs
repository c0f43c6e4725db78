//! The context object handed to `before_agent_starts` and rendered into the
//! conversational prompt.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use hearth_core::{MemoryKind, RecalledMemory, WorkingMemory};

use crate::output::IntermediateStep;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub input: String,
    pub chat_history: String,
    pub episodic_memory: String,
    pub declarative_memory: String,
    #[serde(default)]
    pub tools_output: String,
}

impl AgentContext {
    pub fn build(session: &WorkingMemory, history_turns: usize) -> Self {
        Self {
            input: session.user_text().to_string(),
            chat_history: session.stringify_history(history_turns),
            episodic_memory: format_episodic(session.memories(MemoryKind::Episodic)),
            declarative_memory: format_declarative(session.memories(MemoryKind::Declarative)),
            tools_output: String::new(),
        }
    }

    /// Substitute `{input}`, `{chat_history}`, `{episodic_memory}`,
    /// `{declarative_memory}` and `{tools_output}` in `template`.
    pub fn render(&self, template: &str) -> String {
        [
            ("{input}", self.input.as_str()),
            ("{chat_history}", self.chat_history.as_str()),
            ("{episodic_memory}", self.episodic_memory.as_str()),
            ("{declarative_memory}", self.declarative_memory.as_str()),
            ("{tools_output}", self.tools_output.as_str()),
        ]
        .iter()
        .fold(template.to_string(), |acc, (key, value)| acc.replace(key, value))
    }
}

fn age(memory: &RecalledMemory) -> Option<String> {
    let when = memory.metadata.get("when")?.as_i64()?;
    let when = Utc.timestamp_opt(when, 0).single()?;
    let minutes = (Utc::now() - when).num_minutes().max(0);
    Some(match minutes {
        0 => "just now".to_string(),
        m if m < 60 => format!("{m} minutes ago"),
        m if m < 60 * 24 => format!("{} hours ago", m / 60),
        m => format!("{} days ago", m / (60 * 24)),
    })
}

pub fn format_episodic(memories: &[RecalledMemory]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let lines: String = memories
        .iter()
        .map(|m| match age(m) {
            Some(age) => format!("\n - {} ({age})", m.content),
            None => format!("\n - {}", m.content),
        })
        .collect();
    format!("## Context of things the Human said in the past: {lines}")
}

pub fn format_declarative(memories: &[RecalledMemory]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let lines: String = memories
        .iter()
        .map(|m| match m.metadata.get("source").and_then(|s| s.as_str()) {
            Some(source) => format!("\n - {} (extracted from {source})", m.content),
            None => format!("\n - {}", m.content),
        })
        .collect();
    format!("## Context of documents containing relevant information: {lines}")
}

pub fn format_tools_output(steps: &[IntermediateStep]) -> String {
    if steps.is_empty() {
        return String::new();
    }
    let lines: String = steps
        .iter()
        .filter(|s| !s.observation.is_empty())
        .map(|s| format!("\n - {}: {}", s.procedure, s.observation))
        .collect();
    if lines.is_empty() {
        return String::new();
    }
    format!("## Context of executed system tools: {lines}")
}
