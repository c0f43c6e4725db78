//! Memory recall and storage through the hook pipeline.
//!
//! Recall for one turn:
//! `recall_query` → embed → `before_recall_memories` (per-collection configs)
//! → query episodic / declarative / procedural → `after_recall_memories`.
//! The hits land in the session's working memory.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use hearth_core::{Embedder, HearthResult, MemoryKind, WorkingMemory};
use hearth_hooks::{HookPipeline, HookSlot};

use crate::store::{InMemoryVectorStore, MemoryStore};
use crate::types::{MemoryQuery, VectorEntry};

/// How many hits to take from one collection and how close they must be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    pub k: usize,
    pub threshold: f32,
    /// Metadata equality filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl RecallConfig {
    pub fn new(k: usize, threshold: f32) -> Self {
        Self { k, threshold, filter: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallConfigs {
    pub episodic: RecallConfig,
    pub declarative: RecallConfig,
    pub procedural: RecallConfig,
}

impl Default for RecallConfigs {
    fn default() -> Self {
        Self {
            episodic: RecallConfig::new(3, 0.7),
            declarative: RecallConfig::new(3, 0.7),
            procedural: RecallConfig::new(3, 0.7),
        }
    }
}

impl RecallConfigs {
    pub fn get(&self, kind: MemoryKind) -> &RecallConfig {
        match kind {
            MemoryKind::Episodic => &self.episodic,
            MemoryKind::Declarative => &self.declarative,
            MemoryKind::Procedural => &self.procedural,
        }
    }
}

/// A piece of text headed for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Value) -> Self {
        Self { content: content.into(), metadata }
    }
}

/// The three collections, one store each.
#[derive(Clone)]
pub struct MemoryCollections {
    pub episodic: Arc<dyn MemoryStore>,
    pub declarative: Arc<dyn MemoryStore>,
    pub procedural: Arc<dyn MemoryStore>,
}

impl MemoryCollections {
    pub fn in_memory() -> Self {
        Self {
            episodic: Arc::new(InMemoryVectorStore::new()),
            declarative: Arc::new(InMemoryVectorStore::new()),
            procedural: Arc::new(InMemoryVectorStore::new()),
        }
    }

    pub fn get(&self, kind: MemoryKind) -> &Arc<dyn MemoryStore> {
        match kind {
            MemoryKind::Episodic => &self.episodic,
            MemoryKind::Declarative => &self.declarative,
            MemoryKind::Procedural => &self.procedural,
        }
    }

    /// Collection name → entry count.
    pub async fn describe(&self) -> Value {
        let mut map = serde_json::Map::new();
        for kind in MemoryKind::ALL {
            map.insert(kind.to_string(), json!({ "entries": self.get(kind).len().await }));
        }
        Value::Object(map)
    }
}

pub struct MemoryRecall {
    embedder: Arc<dyn Embedder>,
    collections: MemoryCollections,
    defaults: RecallConfigs,
}

impl MemoryRecall {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        collections: MemoryCollections,
        defaults: RecallConfigs,
    ) -> Self {
        Self { embedder, collections, defaults }
    }

    pub fn collections(&self) -> &MemoryCollections {
        &self.collections
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Fill the session's three memory sets for the current user message.
    pub async fn recall(
        &self,
        hooks: &HookPipeline,
        session: &mut WorkingMemory,
    ) -> HearthResult<()> {
        let seed = session.user_text().to_string();
        let query: String = hooks
            .execute_as(HookSlot::RecallQuery, seed, Some(&mut *session))
            .await?;
        session.recall_query = query.clone();

        let vector = self.embedder.embed(&query).await?;

        let mut configs = self.defaults.clone();
        configs.episodic.filter = Some(json!({ "source": session.user_id }));
        let configs: RecallConfigs = hooks
            .execute_as(HookSlot::BeforeRecallMemories, configs, Some(&mut *session))
            .await?;

        for kind in MemoryKind::ALL {
            let config = configs.get(kind);
            let hits = self
                .collections
                .get(kind)
                .search(MemoryQuery {
                    vector: vector.clone(),
                    min_score: config.threshold,
                    limit: config.k,
                    filter: config.filter.clone(),
                })
                .await?;
            debug!(collection = %kind, hits = hits.len(), "[Memory] recalled");
            session.set_memories(kind, hits.into_iter().map(Into::into).collect());
        }

        hooks
            .execute(HookSlot::AfterRecallMemories, Value::Null, Some(session))
            .await?;
        Ok(())
    }

    /// Store `text` said by the session's user in episodic memory.
    pub async fn store_episodic(
        &self,
        hooks: &HookPipeline,
        session: &mut WorkingMemory,
        text: &str,
    ) -> HearthResult<()> {
        let doc = Document::new(
            text,
            json!({ "source": session.user_id, "when": chrono::Utc::now().timestamp() }),
        );
        let doc: Document = hooks
            .execute_as(HookSlot::BeforeStoreEpisodicMemory, doc, Some(session))
            .await?;
        if doc.content.trim().is_empty() {
            return Ok(());
        }
        let vector = self.embedder.embed(&doc.content).await?;
        self.collections
            .episodic
            .upsert(VectorEntry::new(doc.content, vector, doc.metadata))
            .await?;
        Ok(())
    }

    /// Embed and store documents in declarative memory. Returns how many were
    /// stored.
    pub async fn store_documents(
        &self,
        hooks: &HookPipeline,
        docs: Vec<Document>,
        mut session: Option<&mut WorkingMemory>,
    ) -> HearthResult<usize> {
        let docs: Vec<Document> = hooks
            .execute_as(HookSlot::BeforeStoreDocuments, docs, session.as_deref_mut())
            .await?;

        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc: Document = hooks
                .execute_as(HookSlot::BeforeInsertInMemory, doc, session.as_deref_mut())
                .await?;
            if doc.content.trim().is_empty() {
                continue;
            }
            let vector = self.embedder.embed(&doc.content).await?;
            self.collections
                .declarative
                .upsert(VectorEntry::new(doc.content.clone(), vector, doc.metadata.clone()))
                .await?;
            let doc: Document = hooks
                .execute_as(HookSlot::AfterInsertInMemory, doc, session.as_deref_mut())
                .await?;
            stored.push(doc);
        }

        let stored: Vec<Document> = hooks
            .execute_as(HookSlot::AfterStoreDocuments, stored, session.as_deref_mut())
            .await?;
        Ok(stored.len())
    }
}
