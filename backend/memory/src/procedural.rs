//! Procedural memory: the trigger texts of the active procedures, embedded.
//!
//! Registered as a registry sync observer. After every synchronization the
//! collection is rebuilt from the new procedure set. Vectors of texts seen in
//! earlier rounds are reused, so a toggle only embeds what is new.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use hearth_core::Embedder;
use hearth_plugins::{RuntimeSnapshot, SyncObserver};
use hearth_procedures::ProcedureTrigger;

use crate::store::MemoryStore;
use crate::types::VectorEntry;

pub struct ProcedureIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MemoryStore>,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl ProcedureIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            embedder,
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Rebuild the collection from `triggers`. Returns the number of entries.
    pub async fn reindex(&self, triggers: &[ProcedureTrigger]) -> Result<usize> {
        let mut cache = self.cache.lock().await;

        let missing: Vec<String> = triggers
            .iter()
            .map(|t| t.text.clone())
            .filter(|text| !cache.contains_key(text))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            let vectors = self.embedder.embed_batch(&missing).await?;
            cache.extend(missing.into_iter().zip(vectors));
        }

        let mut entries = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let Some(vector) = cache.get(&trigger.text) else {
                continue;
            };
            entries.push(VectorEntry::new(
                trigger.text.clone(),
                vector.clone(),
                json!({
                    "name": trigger.name,
                    "kind": trigger.kind,
                    "source": trigger.source.as_str(),
                }),
            ));
        }
        // forget texts of procedures that are gone
        cache.retain(|text, _| triggers.iter().any(|t| &t.text == text));

        let count = entries.len();
        self.store.replace_all(entries).await?;
        Ok(count)
    }
}

#[async_trait]
impl SyncObserver for ProcedureIndex {
    async fn on_synchronize(&self, snapshot: Arc<RuntimeSnapshot>) -> Result<()> {
        let triggers = snapshot.procedures.triggers();
        let count = self.reindex(&triggers).await?;
        debug!(generation = snapshot.generation, "[Memory] procedural index rebuilt");
        info!(
            triggers = count,
            procedures = snapshot.procedures.len(),
            "[Memory] procedures embedded"
        );
        Ok(())
    }
}
