/// Plugin registry: installed plugins, the active set, and the runtime snapshot
/// built from them.
///
/// Every mutation (install, remove, toggle, reload) ends with a synchronization
/// that rebuilds the hook pipeline and procedure set from the active plugins and
/// publishes them as one new snapshot. Load failures never escape the registry:
/// a plugin that fails to load is simply absent.
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info, warn};

use hearth_core::{HearthError, HearthResult};
use hearth_hooks::HookPipeline;
use hearth_procedures::ProcedureSet;

use crate::active_set::ActiveSet;
use crate::base::BASE_PLUGIN_ID;
use crate::event_bus::{EventBus, RegistryEvent};
use crate::installer::PluginInstaller;
use crate::lifecycle::{LifecycleEvent, fire};
use crate::loader::{Plugin, PluginLoader};
use crate::settings::{save_settings, validate_settings};
use crate::snapshot::{RuntimeSnapshot, SnapshotSource, SyncObserver};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Directory holding one sub-directory per plugin.
    pub root: PathBuf,
    /// Where the active set is persisted. `None` keeps it in memory.
    pub active_set_path: Option<PathBuf>,
}

/// Listing entry for one installed plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub active: bool,
    pub reloading: bool,
    pub hooks: usize,
    pub tools: usize,
    pub forms: usize,
}

struct RegistryState {
    /// Installed plugins in discovery order; the base plugin comes first.
    plugins: Vec<Plugin>,
    active: ActiveSet,
}

impl RegistryState {
    fn position(&self, id: &str) -> Option<usize> {
        self.plugins.iter().position(|p| p.id == id)
    }

    fn is_active(&self, id: &str) -> bool {
        id == BASE_PLUGIN_ID || self.active.contains(id)
    }
}

/// Marks a plugin as reloading for as long as it lives.
struct ReloadGuard<'a> {
    reloading: &'a StdMutex<HashSet<String>>,
    id: String,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.reloading
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

pub struct PluginRegistry {
    root: PathBuf,
    loader: PluginLoader,
    installer: PluginInstaller,
    state: RwLock<RegistryState>,
    reloading: StdMutex<HashSet<String>>,
    snapshot: StdRwLock<Arc<RuntimeSnapshot>>,
    /// Serializes synchronizations; holds the last generation number.
    sync_lock: Mutex<u64>,
    observers: StdRwLock<Vec<Arc<dyn SyncObserver>>>,
    events: EventBus,
}

impl PluginRegistry {
    pub fn new(options: RegistryOptions, loader: PluginLoader) -> Self {
        let active = match &options.active_set_path {
            Some(path) => ActiveSet::load(path),
            None => ActiveSet::in_memory(),
        };
        Self {
            installer: PluginInstaller::new(&options.root),
            root: options.root,
            loader,
            state: RwLock::new(RegistryState { plugins: Vec::new(), active }),
            reloading: StdMutex::new(HashSet::new()),
            snapshot: StdRwLock::new(Arc::new(RuntimeSnapshot::default())),
            sync_lock: Mutex::new(0),
            observers: StdRwLock::new(Vec::new()),
            events: EventBus::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register a callback run once after every synchronization.
    pub fn add_observer(&self, observer: Arc<dyn SyncObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    // -----------------------------------------------------------------------
    // Discovery and installation
    // -----------------------------------------------------------------------

    /// Install the base plugin and every plugin directory under the root, in
    /// sorted order, then synchronize once. Returns the number of installed
    /// plugins.
    pub async fn find_plugins(&self) -> usize {
        self.ensure_base().await;

        if let Err(e) = std::fs::create_dir_all(&self.root) {
            warn!(root = %self.root.display(), error = %e, "[Plugins] cannot create plugins root");
        }
        let ids = match self.installer.list_installed() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(root = %self.root.display(), "[Plugins] cannot list plugins: {e:#}");
                Vec::new()
            }
        };
        for id in ids {
            self.install_plugin(&self.root.join(id)).await;
        }

        self.synchronize().await;
        let count = self.state.read().await.plugins.len();
        info!(count, "[Plugins] discovery finished");
        count
    }

    async fn ensure_base(&self) {
        let mut state = self.state.write().await;
        if state.position(BASE_PLUGIN_ID).is_none() {
            state.plugins.insert(0, self.loader.load_base());
            self.events.publish(RegistryEvent::Installed { plugin_id: BASE_PLUGIN_ID.into() });
        }
    }

    /// Load and register the plugin in `path`, without synchronizing.
    ///
    /// Idempotent by id: an installed plugin is returned as is. A plugin that
    /// fails to load is logged and `None` is returned. If the id is in the
    /// active set the plugin is activated.
    pub async fn install_plugin(&self, path: &Path) -> Option<PluginSummary> {
        let id = path.file_name()?.to_string_lossy().to_string();
        if let Some(existing) = self.summary(&id).await {
            return Some(existing);
        }
        match self.loader.load(path).await {
            Ok(plugin) => Some(self.insert_loaded(plugin).await),
            Err(e) => {
                warn!(plugin = %id, "[Plugins] failed to load: {e}");
                None
            }
        }
    }

    async fn insert_loaded(&self, plugin: Plugin) -> PluginSummary {
        let id = plugin.id.clone();
        let events = plugin.declarations.events.clone();
        let manifest = plugin.manifest_value();
        let settings = plugin.settings_value();

        let active = {
            let mut state = self.state.write().await;
            if state.position(&id).is_none() {
                state.plugins.push(plugin);
                Some(state.is_active(&id))
            } else {
                None
            }
        };
        let Some(active) = active else {
            // lost a race against a concurrent install of the same id
            return self.summary_or_default(&id).await;
        };

        fire(&events, LifecycleEvent::Installed, &id, &manifest).await;
        self.events.publish(RegistryEvent::Installed { plugin_id: id.clone() });
        if active {
            fire(&events, LifecycleEvent::Enabled, &id, &settings).await;
        }
        self.summary_or_default(&id).await
    }

    /// Copy the plugin directory `source` under the root, install it and
    /// synchronize.
    pub async fn install_from_dir(&self, source: &Path) -> HearthResult<PluginSummary> {
        let dest = self.installer.install_from_dir(source)?;
        let plugin = match self.loader.load(&dest).await {
            Ok(plugin) => plugin,
            Err(e) => {
                let id = dest
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                if let Err(cleanup) = self.installer.uninstall(&id) {
                    warn!(plugin = %id, "[Plugins] cleanup after failed upload: {cleanup:#}");
                }
                return Err(e);
            }
        };
        let summary = self.insert_loaded(plugin).await;
        self.synchronize().await;
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Removal, reload, toggling
    // -----------------------------------------------------------------------

    /// Remove a plugin: fire `removed`, delete its directory, drop it from the
    /// active set and the registry, synchronize. Unknown ids are a no-op
    /// (`Ok(false)`); the base plugin cannot be removed.
    pub async fn remove_plugin(&self, id: &str) -> HearthResult<bool> {
        if id == BASE_PLUGIN_ID {
            return Err(HearthError::ProtectedPlugin(id.into()));
        }
        let plugin = {
            let mut state = self.state.write().await;
            let Some(pos) = state.position(id) else {
                debug!(plugin = %id, "[Plugins] remove of unknown plugin ignored");
                return Ok(false);
            };
            let plugin = state.plugins.remove(pos);
            if state.active.remove(id) {
                if let Err(e) = state.active.save() {
                    warn!(plugin = %id, error = %e, "[Plugins] could not persist active set");
                }
            }
            plugin
        };

        let manifest = plugin.manifest_value();
        fire(&plugin.declarations.events, LifecycleEvent::Removed, id, &manifest).await;

        let owned_dir = plugin.path.as_deref().filter(|p| p.starts_with(&self.root) && p.exists());
        if let Some(path) = owned_dir {
            if let Err(e) = std::fs::remove_dir_all(path) {
                warn!(plugin = %id, error = %e, "[Plugins] could not delete plugin directory");
            }
        }

        info!(plugin = %id, "[Plugins] removed");
        self.events.publish(RegistryEvent::Removed { plugin_id: id.into() });
        self.synchronize().await;
        Ok(true)
    }

    fn begin_reload(&self, id: &str) -> Option<ReloadGuard<'_>> {
        let mut reloading = self.reloading.lock().unwrap_or_else(|e| e.into_inner());
        if !reloading.insert(id.to_string()) {
            return None;
        }
        Some(ReloadGuard { reloading: &self.reloading, id: id.to_string() })
    }

    pub fn is_reloading(&self, id: &str) -> bool {
        self.reloading
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    /// Reload a plugin from its directory and synchronize.
    ///
    /// Returns false without doing anything for unknown ids, for the base plugin,
    /// and while the same plugin is already reloading. A plugin that fails to
    /// reload is dropped from the registry.
    pub async fn reload_plugin(&self, id: &str) -> bool {
        let path = {
            let state = self.state.read().await;
            state.position(id).and_then(|pos| state.plugins[pos].path.clone())
        };
        let Some(path) = path else {
            return false;
        };
        let Some(_guard) = self.begin_reload(id) else {
            debug!(plugin = %id, "[Plugins] already reloading; request dropped");
            return false;
        };

        let reloaded = self.loader.load(&path).await;
        {
            let mut state = self.state.write().await;
            match (reloaded, state.position(id)) {
                (Ok(plugin), Some(pos)) => state.plugins[pos] = plugin,
                (Ok(_), None) => debug!(plugin = %id, "[Plugins] removed during reload"),
                (Err(e), pos) => {
                    warn!(plugin = %id, "[Plugins] reload failed, plugin unloaded: {e}");
                    if let Some(pos) = pos {
                        state.plugins.remove(pos);
                    }
                }
            }
        }

        info!(plugin = %id, "[Plugins] reloaded");
        self.events.publish(RegistryEvent::Reloaded { plugin_id: id.into() });
        self.synchronize().await;
        true
    }

    /// Flip a plugin's membership in the active set and synchronize. Returns
    /// the new state.
    pub async fn toggle_plugin(&self, id: &str) -> HearthResult<bool> {
        self.toggle(id, true).await
    }

    /// Like [`toggle_plugin`](Self::toggle_plugin) but leaves synchronization to
    /// the caller, for batching several toggles.
    pub async fn toggle_plugin_deferred(&self, id: &str) -> HearthResult<bool> {
        self.toggle(id, false).await
    }

    async fn toggle(&self, id: &str, sync: bool) -> HearthResult<bool> {
        if id == BASE_PLUGIN_ID {
            return Err(HearthError::ProtectedPlugin(id.into()));
        }
        let (now_active, events, settings) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let pos = state.position(id).ok_or_else(|| HearthError::PluginNotFound(id.into()))?;
            let now_active = if state.active.contains(id) {
                state.active.remove(id);
                false
            } else {
                state.active.insert(id);
                true
            };
            if let Err(e) = state.active.save() {
                warn!(plugin = %id, error = %e, "[Plugins] could not persist active set");
            }
            let plugin = &state.plugins[pos];
            (now_active, plugin.declarations.events.clone(), plugin.settings_value())
        };

        let event = if now_active { LifecycleEvent::Enabled } else { LifecycleEvent::Disabled };
        fire(&events, event, id, &settings).await;
        info!(plugin = %id, active = now_active, "[Plugins] toggled");
        self.events.publish(RegistryEvent::Toggled { plugin_id: id.into(), active: now_active });

        if sync {
            self.synchronize().await;
        }
        Ok(now_active)
    }

    // -----------------------------------------------------------------------
    // Synchronization
    // -----------------------------------------------------------------------

    /// Rebuild the hook pipeline and procedure set from the active plugins,
    /// publish them as a new snapshot, then run the observers once.
    pub async fn synchronize(&self) -> Arc<RuntimeSnapshot> {
        let mut generation = self.sync_lock.lock().await;

        let (hooks, tools, forms) = {
            let state = self.state.read().await;
            let mut hooks = Vec::new();
            let mut tools = Vec::new();
            let mut forms = Vec::new();
            for plugin in state.plugins.iter().filter(|p| state.is_active(&p.id)) {
                hooks.extend(plugin.declarations.hooks.iter().cloned());
                tools.extend(plugin.declarations.tools.iter().cloned());
                forms.extend(plugin.declarations.forms.iter().cloned());
            }
            (hooks, tools, forms)
        };

        *generation += 1;
        let snapshot = Arc::new(RuntimeSnapshot::new(
            *generation,
            HookPipeline::build(*generation, hooks),
            ProcedureSet::build(tools, forms),
        ));
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&snapshot);

        info!(
            generation = *generation,
            hooks = snapshot.hooks.len(),
            procedures = snapshot.procedures.len(),
            "[Plugins] synchronized"
        );
        self.events.publish(RegistryEvent::Synchronized { generation: *generation });

        let observers: Vec<_> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            if let Err(e) = observer.on_synchronize(Arc::clone(&snapshot)).await {
                warn!("[Plugins] sync observer failed: {e:#}");
            }
        }
        snapshot
    }

    // -----------------------------------------------------------------------
    // Settings and queries
    // -----------------------------------------------------------------------

    /// Validate `value` against the plugin's settings schema, persist it to the
    /// plugin's `settings.json` and update the plugin in place.
    pub async fn set_plugin_settings(
        &self,
        id: &str,
        value: &Value,
    ) -> HearthResult<Map<String, Value>> {
        let mut state = self.state.write().await;
        let pos = state.position(id).ok_or_else(|| HearthError::PluginNotFound(id.into()))?;
        let plugin = &mut state.plugins[pos];
        let schema = &plugin.declarations.settings_schema;
        let settings = match &plugin.path {
            Some(dir) => save_settings(dir, schema, value)?,
            None => validate_settings(schema, value)?,
        };
        plugin.settings = settings.clone();
        info!(plugin = %id, "[Plugins] settings updated");
        Ok(settings)
    }

    pub async fn plugin_settings(&self, id: &str) -> Option<Map<String, Value>> {
        let state = self.state.read().await;
        state.position(id).map(|pos| state.plugins[pos].settings.clone())
    }

    pub async fn is_active(&self, id: &str) -> bool {
        let state = self.state.read().await;
        state.position(id).is_some() && state.is_active(id)
    }

    pub async fn plugin_ids(&self) -> Vec<String> {
        self.state.read().await.plugins.iter().map(|p| p.id.clone()).collect()
    }

    pub async fn summary(&self, id: &str) -> Option<PluginSummary> {
        let state = self.state.read().await;
        let plugin = &state.plugins[state.position(id)?];
        Some(self.summarize(plugin, state.is_active(id)))
    }

    async fn summary_or_default(&self, id: &str) -> PluginSummary {
        match self.summary(id).await {
            Some(summary) => summary,
            None => self.summarize(&self.loader.load_base(), false),
        }
    }

    pub async fn summaries(&self) -> Vec<PluginSummary> {
        let state = self.state.read().await;
        state
            .plugins
            .iter()
            .map(|p| self.summarize(p, state.is_active(&p.id)))
            .collect()
    }

    fn summarize(&self, plugin: &Plugin, active: bool) -> PluginSummary {
        PluginSummary {
            id: plugin.id.clone(),
            name: plugin.manifest.name.clone(),
            version: plugin.manifest.version.clone(),
            description: plugin.manifest.description.clone(),
            tags: plugin.manifest.tags.clone(),
            active,
            reloading: self.is_reloading(&plugin.id),
            hooks: plugin.declarations.hooks.len(),
            tools: plugin.declarations.tools.len(),
            forms: plugin.declarations.forms.len(),
        }
    }
}

impl SnapshotSource for PluginRegistry {
    fn snapshot(&self) -> Arc<RuntimeSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::NativeCatalog;
    use anyhow::Result;
    use async_trait::async_trait;
    use hearth_hooks::HookSlot;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn registry(root: &TempDir) -> PluginRegistry {
        PluginRegistry::new(
            RegistryOptions {
                root: root.path().join("plugins"),
                active_set_path: Some(root.path().join("active_plugins.json")),
            },
            PluginLoader::new(NativeCatalog::new()),
        )
    }

    fn add_pirate(root: &TempDir) {
        write(
            &root.path().join("plugins/pirate"),
            "speak.yaml",
            "hooks:\n  - slot: agent_prompt_prefix\n    priority: 1\n    prepend: 'Arr! '\
             \ntools:\n  - name: plunder\n    description: takes the treasure\
             \n    reply: 'took {input}'\n",
        );
    }

    #[tokio::test]
    async fn base_plugin_only_is_identity() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(&root);
        assert_eq!(reg.find_plugins().await, 1);
        let snap = reg.snapshot();
        let out = snap
            .hooks
            .execute(HookSlot::AllowedLlms, json!(["A", "B"]), None)
            .await
            .unwrap();
        assert_eq!(out, json!(["A", "B"]));
        assert!(snap.procedures.is_empty());
    }

    #[tokio::test]
    async fn installed_plugins_start_inactive_until_toggled() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        let reg = registry(&root);
        assert_eq!(reg.find_plugins().await, 2);
        assert!(!reg.is_active("pirate").await);
        assert!(reg.snapshot().procedures.tool("plunder").is_none());

        assert!(reg.toggle_plugin("pirate").await.unwrap());
        let snap = reg.snapshot();
        assert!(snap.procedures.tool("plunder").is_some());
        let prefix = snap
            .hooks
            .execute(HookSlot::AgentPromptPrefix, json!("You are helpful."), None)
            .await
            .unwrap();
        assert_eq!(prefix, json!("Arr! You are helpful."));
    }

    #[tokio::test]
    async fn toggle_off_then_on_restores_procedures() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        let reg = registry(&root);
        reg.find_plugins().await;
        reg.toggle_plugin("pirate").await.unwrap();
        let before = reg.snapshot().procedures.names();

        assert!(!reg.toggle_plugin("pirate").await.unwrap());
        assert!(reg.snapshot().procedures.is_empty());
        assert!(reg.toggle_plugin("pirate").await.unwrap());
        assert_eq!(reg.snapshot().procedures.names(), before);
    }

    #[tokio::test]
    async fn active_set_survives_restart() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        {
            let reg = registry(&root);
            reg.find_plugins().await;
            reg.toggle_plugin("pirate").await.unwrap();
        }
        let reg = registry(&root);
        reg.find_plugins().await;
        assert!(reg.is_active("pirate").await);
    }

    #[tokio::test]
    async fn base_plugin_is_protected() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(&root);
        reg.find_plugins().await;
        assert!(matches!(
            reg.toggle_plugin(BASE_PLUGIN_ID).await,
            Err(HearthError::ProtectedPlugin(_))
        ));
        assert!(matches!(
            reg.remove_plugin(BASE_PLUGIN_ID).await,
            Err(HearthError::ProtectedPlugin(_))
        ));
        assert!(matches!(reg.toggle_plugin("ghost").await, Err(HearthError::PluginNotFound(_))));
    }

    #[tokio::test]
    async fn removing_unknown_id_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(&root);
        reg.find_plugins().await;
        let generation = reg.snapshot().generation;
        assert!(!reg.remove_plugin("ghost").await.unwrap());
        assert_eq!(reg.snapshot().generation, generation);
        assert!(!reg.reload_plugin("ghost").await);
    }

    #[tokio::test]
    async fn remove_deletes_directory_and_membership() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        let reg = registry(&root);
        reg.find_plugins().await;
        reg.toggle_plugin("pirate").await.unwrap();

        assert!(reg.remove_plugin("pirate").await.unwrap());
        assert!(!root.path().join("plugins/pirate").exists());
        assert!(reg.summary("pirate").await.is_none());
        assert!(reg.snapshot().procedures.is_empty());
        let persisted = std::fs::read_to_string(root.path().join("active_plugins.json")).unwrap();
        assert!(!persisted.contains("pirate"));
    }

    #[tokio::test]
    async fn install_is_idempotent_and_failures_are_absent() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        write(&root.path().join("plugins/hollow"), "README.md", "no units here");
        let reg = registry(&root);
        assert_eq!(reg.find_plugins().await, 2);
        assert!(reg.summary("hollow").await.is_none());

        let again = reg.install_plugin(&root.path().join("plugins/pirate")).await.unwrap();
        assert_eq!(again.id, "pirate");
        assert_eq!(reg.plugin_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn reload_picks_up_changes() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        let reg = registry(&root);
        reg.find_plugins().await;
        reg.toggle_plugin("pirate").await.unwrap();

        write(
            &root.path().join("plugins/pirate"),
            "more.yaml",
            "tools:\n  - name: sail\n    reply: sailing\n",
        );
        assert!(reg.reload_plugin("pirate").await);
        assert!(reg.snapshot().procedures.tool("sail").is_some());
        assert!(!reg.is_reloading("pirate"));
    }

    #[tokio::test]
    async fn reload_while_reloading_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        let reg = registry(&root);
        reg.find_plugins().await;
        let generation = reg.snapshot().generation;

        let guard = reg.begin_reload("pirate").unwrap();
        assert!(reg.summary("pirate").await.unwrap().reloading);
        assert!(!reg.reload_plugin("pirate").await);
        assert_eq!(reg.snapshot().generation, generation);
        drop(guard);

        assert!(reg.reload_plugin("pirate").await);
        assert_eq!(reg.snapshot().generation, generation + 1);
    }

    #[tokio::test]
    async fn generations_increase_and_old_snapshots_stay_intact() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        let reg = registry(&root);
        reg.find_plugins().await;
        let old = reg.snapshot();
        reg.toggle_plugin("pirate").await.unwrap();
        let new = reg.snapshot();
        assert!(new.generation > old.generation);
        assert!(old.procedures.is_empty());
        assert_eq!(new.procedures.len(), 1);
    }

    struct CountingObserver(AtomicUsize);

    #[async_trait]
    impl SyncObserver for CountingObserver {
        async fn on_synchronize(&self, _snapshot: Arc<RuntimeSnapshot>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn observers_run_once_per_sync_and_deferred_toggles_batch() {
        let root = tempfile::tempdir().unwrap();
        add_pirate(&root);
        write(
            &root.path().join("plugins/parrot"),
            "p.yaml",
            "tools:\n  - name: squawk\n    reply: squawk\n",
        );
        let reg = registry(&root);
        let observer = Arc::new(CountingObserver(AtomicUsize::new(0)));
        reg.add_observer(observer.clone());
        let mut events = reg.subscribe();

        reg.find_plugins().await;
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);

        reg.toggle_plugin_deferred("pirate").await.unwrap();
        reg.toggle_plugin_deferred("parrot").await.unwrap();
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
        reg.synchronize().await;
        assert_eq!(observer.0.load(Ordering::SeqCst), 2);
        assert_eq!(reg.snapshot().procedures.len(), 2);

        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            seen.push(ev);
        }
        assert!(
            seen.contains(&RegistryEvent::Toggled { plugin_id: "parrot".into(), active: true })
        );
        assert_eq!(seen.last(), Some(&RegistryEvent::Synchronized { generation: 2 }));
    }

    #[tokio::test]
    async fn settings_are_validated_and_persisted() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("plugins/tuned"),
            "main.yaml",
            "settings:\n  volume: { kind: integer, default: 3 }\n",
        );
        let reg = registry(&root);
        reg.find_plugins().await;
        assert_eq!(reg.plugin_settings("tuned").await.unwrap()["volume"], 3);

        let saved = reg.set_plugin_settings("tuned", &json!({ "volume": "9" })).await.unwrap();
        assert_eq!(saved["volume"], 9);
        assert!(reg.set_plugin_settings("tuned", &json!({ "volume": "loud" })).await.is_err());
        assert!(matches!(
            reg.set_plugin_settings("ghost", &json!({})).await,
            Err(HearthError::PluginNotFound(_))
        ));
        let on_disk =
            std::fs::read_to_string(root.path().join("plugins/tuned/settings.json")).unwrap();
        assert!(on_disk.contains('9'));
    }

    #[tokio::test]
    async fn upload_installs_and_synchronizes() {
        let root = tempfile::tempdir().unwrap();
        let reg = registry(&root);
        reg.find_plugins().await;

        let upload = tempfile::tempdir().unwrap();
        let src = upload.path().join("parrot");
        write(&src, "p.yaml", "tools:\n  - name: squawk\n    reply: squawk\n");
        let summary = reg.install_from_dir(&src).await.unwrap();
        assert_eq!(summary.id, "parrot");
        assert_eq!(summary.tools, 1);
        assert!(root.path().join("plugins/parrot/p.yaml").exists());

        let empty = upload.path().join("empty");
        write(&empty, "README.md", "nothing");
        assert!(matches!(reg.install_from_dir(&empty).await, Err(HearthError::EmptyPlugin(_))));
        assert!(!root.path().join("plugins/empty").exists());
    }
}
