/// Hook slots and registrations.
///
/// A slot is a named extension point. Every slot's chain is a reducer over a single
/// `serde_json::Value`: the caller packs its initial arguments into the seed value,
/// the session (when the slot has one) is lent to every hook in the chain.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::registry::Hook;

// ---------------------------------------------------------------------------
// Hook slots
// ---------------------------------------------------------------------------

/// The extension points plugins may intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSlot {
    /// Runtime handle info before plugins are discovered. Side-effect only.
    BeforeBootstrap,
    /// Runtime handle info once bootstrap completed. Side-effect only.
    AfterBootstrap,
    /// Candidate embedder names → filtered list.
    AllowedEmbedders,
    /// Candidate LLM names → filtered list.
    AllowedLlms,
    /// Selection-chain instructions text.
    AgentPromptInstructions,
    /// Candidate procedure names offered to the selection chain.
    AllowedTools,
    /// Agent context object, before the decision loop runs.
    BeforeAgentStarts,
    /// `null` or a ready reply that skips the rest of the loop.
    AgentFastReply,
    /// System prompt prefix of the conversational chain.
    AgentPromptPrefix,
    /// System prompt suffix of the conversational chain.
    AgentPromptSuffix,
    /// Reply produced by the procedure selection chain.
    AfterProceduresChain,
    /// Reply produced by the conversational chain.
    AfterMemoryChain,
    /// `null` or a trigger pattern such as `@{name}`.
    InstantToolTrigger,
    /// Text used to query memory.
    RecallQuery,
    /// Incoming user message.
    BeforeReadMessage,
    /// Outgoing reply.
    BeforeSendMessage,
    /// Document about to be stored in episodic memory.
    BeforeStoreEpisodicMemory,
    /// Per-collection recall configuration.
    BeforeRecallMemories,
    /// Fired after recall; the value is ignored.
    AfterRecallMemories,
    /// Memory collection map.
    MemoryCollections,
    FileParsers,
    WebParsers,
    TextSplitter,
    BeforeStoreDocuments,
    AfterStoreDocuments,
    BeforeInsertInMemory,
    AfterInsertInMemory,
    BeforeSplitDocs,
    AfterSplitDocs,
}

impl HookSlot {
    pub const ALL: [HookSlot; 29] = [
        Self::BeforeBootstrap,
        Self::AfterBootstrap,
        Self::AllowedEmbedders,
        Self::AllowedLlms,
        Self::AgentPromptInstructions,
        Self::AllowedTools,
        Self::BeforeAgentStarts,
        Self::AgentFastReply,
        Self::AgentPromptPrefix,
        Self::AgentPromptSuffix,
        Self::AfterProceduresChain,
        Self::AfterMemoryChain,
        Self::InstantToolTrigger,
        Self::RecallQuery,
        Self::BeforeReadMessage,
        Self::BeforeSendMessage,
        Self::BeforeStoreEpisodicMemory,
        Self::BeforeRecallMemories,
        Self::AfterRecallMemories,
        Self::MemoryCollections,
        Self::FileParsers,
        Self::WebParsers,
        Self::TextSplitter,
        Self::BeforeStoreDocuments,
        Self::AfterStoreDocuments,
        Self::BeforeInsertInMemory,
        Self::AfterInsertInMemory,
        Self::BeforeSplitDocs,
        Self::AfterSplitDocs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeBootstrap => "before_bootstrap",
            Self::AfterBootstrap => "after_bootstrap",
            Self::AllowedEmbedders => "allowed_embedders",
            Self::AllowedLlms => "allowed_llms",
            Self::AgentPromptInstructions => "agent_prompt_instructions",
            Self::AllowedTools => "allowed_tools",
            Self::BeforeAgentStarts => "before_agent_starts",
            Self::AgentFastReply => "agent_fast_reply",
            Self::AgentPromptPrefix => "agent_prompt_prefix",
            Self::AgentPromptSuffix => "agent_prompt_suffix",
            Self::AfterProceduresChain => "after_procedures_chain",
            Self::AfterMemoryChain => "after_memory_chain",
            Self::InstantToolTrigger => "instant_tool_trigger",
            Self::RecallQuery => "recall_query",
            Self::BeforeReadMessage => "before_read_message",
            Self::BeforeSendMessage => "before_send_message",
            Self::BeforeStoreEpisodicMemory => "before_store_episodic_memory",
            Self::BeforeRecallMemories => "before_recall_memories",
            Self::AfterRecallMemories => "after_recall_memories",
            Self::MemoryCollections => "memory_collections",
            Self::FileParsers => "file_parsers",
            Self::WebParsers => "web_parsers",
            Self::TextSplitter => "text_splitter",
            Self::BeforeStoreDocuments => "before_store_documents",
            Self::AfterStoreDocuments => "after_store_documents",
            Self::BeforeInsertInMemory => "before_insert_in_memory",
            Self::AfterInsertInMemory => "after_insert_in_memory",
            Self::BeforeSplitDocs => "before_split_docs",
            Self::AfterSplitDocs => "after_split_docs",
        }
    }
}

impl fmt::Display for HookSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSlot(pub String);

impl fmt::Display for UnknownSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown hook slot '{}'", self.0)
    }
}

impl std::error::Error for UnknownSlot {}

impl FromStr for HookSlot {
    type Err = UnknownSlot;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookSlot::ALL
            .iter()
            .copied()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| UnknownSlot(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Registrations
// ---------------------------------------------------------------------------

/// One hook implementation contributed by a plugin.
#[derive(Clone)]
pub struct HookRegistration {
    pub slot: HookSlot,
    /// Higher runs first. Ties keep registration order.
    pub priority: i32,
    pub plugin_id: String,
    pub hook: Arc<dyn Hook>,
}

impl HookRegistration {
    pub fn new(
        slot: HookSlot,
        priority: i32,
        plugin_id: impl Into<String>,
        hook: Arc<dyn Hook>,
    ) -> Self {
        Self { slot, priority, plugin_id: plugin_id.into(), hook }
    }
}

impl fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistration")
            .field("slot", &self.slot)
            .field("priority", &self.priority)
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}
