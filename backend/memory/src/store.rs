use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{MemoryQuery, SearchResult, VectorEntry};

/// Abstract interface for vector storage.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or update an entry.
    async fn upsert(&self, entry: VectorEntry) -> Result<()>;

    /// Search for similar entries.
    async fn search(&self, query: MemoryQuery) -> Result<Vec<SearchResult>>;

    /// Delete an entry by ID.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Swap the whole content for `entries` in one step.
    async fn replace_all(&self, entries: Vec<VectorEntry>) -> Result<()>;

    async fn len(&self) -> usize;
}

/// In-memory vector store using brute-force cosine similarity.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<HashMap<Uuid, VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(v1: &[f32], v2: &[f32]) -> f32 {
        if v1.len() != v2.len() {
            return 0.0;
        }

        let dot_product: f32 = v1.iter().zip(v2.iter()).map(|(a, b)| a * b).sum();
        let norm_a: f32 = v1.iter().map(|a| a * a).sum::<f32>().sqrt();
        let norm_b: f32 = v2.iter().map(|b| b * b).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

fn matches_filter(metadata: &Value, filter: Option<&Value>) -> bool {
    let Some(Value::Object(filter)) = filter else {
        return true;
    };
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}

#[async_trait]
impl MemoryStore for InMemoryVectorStore {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        self.entries.write().await.insert(entry.id, entry);
        Ok(())
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<SearchResult>> {
        let entries = self.entries.read().await;
        let mut results: Vec<SearchResult> = entries
            .values()
            .filter(|entry| matches_filter(&entry.metadata, query.filter.as_ref()))
            .map(|entry| SearchResult {
                score: Self::cosine_similarity(&query.vector, &entry.vector),
                entry: entry.clone(),
            })
            .filter(|r| r.score >= query.min_score)
            .collect();

        // Sort by score descending, older entries first on ties
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.entry.created_at.cmp(&b.entry.created_at))
        });
        results.truncate(query.limit);

        Ok(results)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.entries.write().await.remove(&id);
        Ok(())
    }

    async fn replace_all(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let fresh: HashMap<Uuid, VectorEntry> = entries.into_iter().map(|e| (e.id, e)).collect();
        *self.entries.write().await = fresh;
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
