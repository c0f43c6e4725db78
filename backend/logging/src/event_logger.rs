//! Agent Event Logger
//!
//! Structured runtime events (procedure calls, form transitions, plugin lifecycle,
//! errors) routed through `tracing` on the `agent_events` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    ProcedureCall {
        procedure: String,
        input: String,
        observation: String,
    },
    FormTransition {
        form: String,
        from: String,
        to: String,
    },
    PluginLifecycle {
        plugin: String,
        event: String,
    },
    Message {
        role: String,
        content: String,
    },
    Error {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: AgentEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Redact free-text fields and emit the event.
    pub fn log_event(session_id: &str, mut event: AgentEvent) {
        match &mut event {
            AgentEvent::ProcedureCall { input, observation, .. } => {
                *input = redact_sensitive_data(input);
                *observation = redact_sensitive_data(observation);
            }
            AgentEvent::Message { content, .. } => {
                *content = redact_sensitive_data(content);
            }
            AgentEvent::Error { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            AgentEvent::FormTransition { .. } | AgentEvent::PluginLifecycle { .. } => {}
        }

        let entry = EventLogEntry {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event,
        };

        info!(target: "agent_events", event = ?entry, "Agent trace event");
    }
}
