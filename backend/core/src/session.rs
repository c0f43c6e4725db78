//! Per-user working memory.
//!
//! One `WorkingMemory` exists per user id. A turn holds it exclusively (`&mut`)
//! from the moment the message is read until the reply is sent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

use crate::traits::FormSession;
use crate::types::{ChatTurn, MemoryKind, OutboundEvent, RecalledMemory, Speaker};

pub type OutboundSender = mpsc::UnboundedSender<OutboundEvent>;

#[derive(Debug)]
pub struct WorkingMemory {
    pub user_id: String,
    pub history: Vec<ChatTurn>,
    /// Text of the message being answered in the current turn.
    pub user_message: Option<String>,
    /// The form this conversation is filling in, if any.
    pub active_form: Option<Box<dyn FormSession>>,
    /// Query used for the last recall (after the `recall_query` hook).
    pub recall_query: String,
    pub episodic_memories: Vec<RecalledMemory>,
    pub declarative_memories: Vec<RecalledMemory>,
    pub procedural_memories: Vec<RecalledMemory>,
    outbound: Option<OutboundSender>,
}

impl WorkingMemory {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            history: Vec::new(),
            user_message: None,
            active_form: None,
            recall_query: String::new(),
            episodic_memories: Vec::new(),
            declarative_memories: Vec::new(),
            procedural_memories: Vec::new(),
            outbound: None,
        }
    }

    pub fn with_outbound(mut self, sender: OutboundSender) -> Self {
        self.outbound = Some(sender);
        self
    }

    pub fn set_outbound(&mut self, sender: Option<OutboundSender>) {
        self.outbound = sender;
    }

    pub fn outbound(&self) -> Option<OutboundSender> {
        self.outbound.clone()
    }

    /// Text of the current user message, or "" outside a turn.
    pub fn user_text(&self) -> &str {
        self.user_message.as_deref().unwrap_or_default()
    }

    pub fn push_human(&mut self, text: impl Into<String>) {
        self.history.push(ChatTurn::human(text));
    }

    pub fn push_ai(&mut self, text: impl Into<String>) {
        self.history.push(ChatTurn::ai(text));
    }

    /// The last `turns` messages, oldest first.
    pub fn recent_history(&self, turns: usize) -> &[ChatTurn] {
        let start = self.history.len().saturating_sub(turns);
        &self.history[start..]
    }

    /// Render the last `turns` messages as `\n - Human: text` lines for prompts.
    pub fn stringify_history(&self, turns: usize) -> String {
        self.recent_history(turns)
            .iter()
            .map(|t| format!("\n - {}: {}", t.who, t.text))
            .collect()
    }

    /// Last human message recorded in history.
    pub fn last_human(&self) -> Option<&ChatTurn> {
        self.history.iter().rev().find(|t| t.who == Speaker::Human)
    }

    pub fn memories(&self, kind: MemoryKind) -> &[RecalledMemory] {
        match kind {
            MemoryKind::Episodic => &self.episodic_memories,
            MemoryKind::Declarative => &self.declarative_memories,
            MemoryKind::Procedural => &self.procedural_memories,
        }
    }

    pub fn set_memories(&mut self, kind: MemoryKind, hits: Vec<RecalledMemory>) {
        match kind {
            MemoryKind::Episodic => self.episodic_memories = hits,
            MemoryKind::Declarative => self.declarative_memories = hits,
            MemoryKind::Procedural => self.procedural_memories = hits,
        }
    }

    /// Forward a streamed token to the client. Returns false if nobody listens.
    pub fn send_token(&self, token: impl Into<String>) -> bool {
        self.send(OutboundEvent::Token(token.into()))
    }

    pub fn send_notification(&self, text: impl Into<String>) -> bool {
        self.send(OutboundEvent::Notification(text.into()))
    }

    fn send(&self, event: OutboundEvent) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Forget history, memories and any active form.
    pub fn clear(&mut self) {
        self.history.clear();
        self.user_message = None;
        self.active_form = None;
        self.recall_query.clear();
        for kind in MemoryKind::ALL {
            self.set_memories(kind, Vec::new());
        }
    }
}

pub type SharedSession = Arc<Mutex<WorkingMemory>>;

/// Sessions keyed by user id. Created on first contact, kept for the process lifetime.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session for `user_id`, creating it on first contact.
    pub async fn get_or_create(&self, user_id: &str) -> SharedSession {
        if let Some(existing) = self.sessions.read().await.get(user_id) {
            return existing.clone();
        }
        let mut w = self.sessions.write().await;
        w.entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user = %user_id, "[Hearth] new session");
                Arc::new(Mutex::new(WorkingMemory::new(user_id)))
            })
            .clone()
    }

    pub async fn get(&self, user_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Drop a session entirely. Returns whether it existed.
    pub async fn remove(&self, user_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(user_id).is_some();
        if removed {
            debug!(user = %user_id, "[Hearth] session cleared");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
