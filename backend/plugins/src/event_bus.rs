//! Registry event bus.
//!
//! Broadcasts what the plugin registry did, for listeners such as admin
//! endpoints or tests. Slow subscribers lag and lose events; the registry never
//! waits on them.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    Installed { plugin_id: String },
    Removed { plugin_id: String },
    Toggled { plugin_id: String, active: bool },
    Reloaded { plugin_id: String },
    Synchronized { generation: u64 },
}

pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { sender: tx }
    }

    pub fn publish(&self, event: RegistryEvent) {
        debug!(?event, "[Plugins] registry event");
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
