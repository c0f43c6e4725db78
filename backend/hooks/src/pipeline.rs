/// Hook pipeline executor.
///
/// A `HookPipeline` is an immutable snapshot: the chains of every slot, already sorted,
/// built from the registrations of the currently active plugins. The plugin registry
/// builds a new pipeline on every synchronization and swaps the `Arc`; an execution
/// that started on an older pipeline finishes on it.
///
/// Execution is a left-to-right fold. The first hook receives the seed value, every
/// following hook receives the previous hook's return value. Hooks run one at a time;
/// each may suspend and the next one starts only after it completed.
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use hearth_core::{HearthError, HearthResult, WorkingMemory};

use crate::types::{HookRegistration, HookSlot};

#[derive(Debug, Default)]
pub struct HookPipeline {
    chains: HashMap<HookSlot, Vec<HookRegistration>>,
    generation: u64,
}

impl HookPipeline {
    /// A pipeline with no hooks. Every execution fails with `HookSlotEmpty`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group registrations by slot and order each chain by priority, highest first.
    /// The sort is stable, so equal priorities keep the order they were given in.
    pub fn build(
        generation: u64,
        registrations: impl IntoIterator<Item = HookRegistration>,
    ) -> Self {
        let mut chains: HashMap<HookSlot, Vec<HookRegistration>> = HashMap::new();
        for reg in registrations {
            chains.entry(reg.slot).or_default().push(reg);
        }
        for chain in chains.values_mut() {
            chain.sort_by_key(|reg| std::cmp::Reverse(reg.priority));
        }
        Self { chains, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The ordered chain for `slot` (empty if nobody registered it).
    pub fn chain(&self, slot: HookSlot) -> &[HookRegistration] {
        self.chains.get(&slot).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, slot: HookSlot) -> bool {
        !self.chain(slot).is_empty()
    }

    /// Total number of registrations across all slots.
    pub fn len(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Run the chain for `slot` over `seed` and return the final value.
    ///
    /// Fails with `HookSlotEmpty` if no active plugin implements the slot. A failing
    /// hook aborts the chain and its error is returned to the caller.
    pub async fn execute(
        &self,
        slot: HookSlot,
        seed: Value,
        mut session: Option<&mut WorkingMemory>,
    ) -> HearthResult<Value> {
        let chain = self.chain(slot);
        if chain.is_empty() {
            return Err(HearthError::HookSlotEmpty(slot.to_string()));
        }

        let started = Instant::now();
        let mut value = seed;
        for reg in chain {
            value = reg
                .hook
                .call(value, session.as_deref_mut())
                .await
                .map_err(|source| HearthError::Hook {
                    slot: slot.to_string(),
                    plugin: reg.plugin_id.clone(),
                    source,
                })?;
        }

        debug!(
            slot = %slot,
            hooks = chain.len(),
            generation = self.generation,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "[Hooks] chain executed"
        );
        Ok(value)
    }

    /// Typed wrapper around [`execute`](Self::execute): the seed is encoded to JSON and
    /// the result decoded back into `T`.
    pub async fn execute_as<T>(
        &self,
        slot: HookSlot,
        seed: T,
        session: Option<&mut WorkingMemory>,
    ) -> HearthResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let seed = serde_json::to_value(seed).map_err(anyhow::Error::from)?;
        let out = self.execute(slot, seed, session).await?;
        serde_json::from_value(out).map_err(|e| HearthError::Hook {
            slot: slot.to_string(),
            plugin: "<chain>".into(),
            source: anyhow::anyhow!("hook chain produced an unexpected value: {e}"),
        })
    }
}
