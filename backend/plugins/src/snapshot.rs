//! Runtime snapshots.
//!
//! What one turn of the agent sees: the hook pipeline and the procedure set built
//! by the same synchronization. Both are immutable; a synchronization publishes a
//! new snapshot by swapping an `Arc`, so readers never observe a half-built state
//! and a turn keeps the snapshot it started with.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use hearth_hooks::HookPipeline;
use hearth_procedures::ProcedureSet;

#[derive(Debug, Default)]
pub struct RuntimeSnapshot {
    pub generation: u64,
    pub hooks: Arc<HookPipeline>,
    pub procedures: Arc<ProcedureSet>,
}

impl RuntimeSnapshot {
    pub fn new(generation: u64, hooks: HookPipeline, procedures: ProcedureSet) -> Self {
        Self {
            generation,
            hooks: Arc::new(hooks),
            procedures: Arc::new(procedures),
        }
    }
}

/// Anything that can hand out the current snapshot.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Arc<RuntimeSnapshot>;
}

/// A snapshot that never changes.
pub struct StaticSnapshot(pub Arc<RuntimeSnapshot>);

impl SnapshotSource for StaticSnapshot {
    fn snapshot(&self) -> Arc<RuntimeSnapshot> {
        Arc::clone(&self.0)
    }
}

/// Called once after every synchronization, with the state it published.
#[async_trait]
pub trait SyncObserver: Send + Sync {
    async fn on_synchronize(&self, snapshot: Arc<RuntimeSnapshot>) -> Result<()>;
}
