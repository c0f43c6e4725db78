use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use hearth_core::RecalledMemory;

/// A stored memory entry with embedding vector and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: Uuid,
    /// The text content of the memory
    pub content: String,
    pub vector: Vec<f32>,
    /// Metadata key-value pairs
    pub metadata: Value,
    /// Unix timestamp (seconds) when this entry was created
    pub created_at: i64,
}

impl VectorEntry {
    pub fn new(content: impl Into<String>, vector: Vec<f32>, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            vector,
            metadata,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// A query for retrieving relevant memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The embedding vector of the query
    pub vector: Vec<f32>,
    /// Minimum similarity score (0.0 to 1.0)
    pub min_score: f32,
    /// Max number of results to return
    pub limit: usize,
    /// Metadata equality filter: every key must match the entry's metadata.
    pub filter: Option<Value>,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            vector: vec![],
            min_score: 0.0,
            limit: 10,
            filter: None,
        }
    }
}

/// Result of a memory search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub entry: VectorEntry,
    pub score: f32,
}

impl From<SearchResult> for RecalledMemory {
    fn from(hit: SearchResult) -> Self {
        RecalledMemory::new(hit.entry.content, hit.score, hit.entry.metadata)
    }
}
