//! Plugin lifecycle events: installed, removed, enabled, disabled.
//!
//! `installed` and `removed` carry the plugin manifest, `enabled` and `disabled`
//! carry its current settings. Handler failures are logged and never abort the
//! operation that fired them.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use hearth_logging::{AgentEvent, EventLogger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Installed,
    Removed,
    Enabled,
    Disabled,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::Removed => "removed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn handle(&self, plugin_id: &str, payload: &Value) -> Result<()>;
}

/// Handler for events declared in plugin files: logs a fixed message.
pub struct LogMessage {
    pub message: String,
}

#[async_trait]
impl LifecycleHandler for LogMessage {
    async fn handle(&self, plugin_id: &str, _payload: &Value) -> Result<()> {
        info!(plugin = %plugin_id, "[Plugins] {}", self.message);
        Ok(())
    }
}

/// A handler bound to the event it listens for.
#[derive(Clone)]
pub struct LifecycleRegistration {
    pub event: LifecycleEvent,
    pub handler: Arc<dyn LifecycleHandler>,
}

/// Run every handler registered for `event`, in declaration order.
pub async fn fire(
    registrations: &[LifecycleRegistration],
    event: LifecycleEvent,
    plugin_id: &str,
    payload: &Value,
) {
    debug!(plugin = %plugin_id, %event, "[Plugins] firing lifecycle event");
    EventLogger::log_event(
        "system",
        AgentEvent::PluginLifecycle {
            plugin: plugin_id.to_string(),
            event: event.to_string(),
        },
    );
    for reg in registrations.iter().filter(|r| r.event == event) {
        if let Err(e) = reg.handler.handle(plugin_id, payload).await {
            warn!(plugin = %plugin_id, %event, error = %e, "[Plugins] lifecycle handler failed");
        }
    }
}
