//! Plugin Loader
//!
//! Turns a plugin directory into a `Plugin`: manifest, dependency installation,
//! source units (each in its own registration context), declared settings schema
//! and the validated settings.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use hearth_core::{HearthError, HearthResult};

use crate::base::{BASE_PLUGIN_ID, CorePlugin};
use crate::installer::DependencyInstaller;
use crate::manifest::PluginManifest;
use crate::sdk::{Declarations, NativeCatalog, PluginModule, Registrar};
use crate::settings::load_settings;
use crate::unit::apply_unit;

/// A loaded plugin. Owns everything it declared; a reload replaces it wholesale.
#[derive(Clone)]
pub struct Plugin {
    pub id: String,
    /// Plugin directory. `None` for the compiled-in base plugin.
    pub path: Option<PathBuf>,
    pub manifest: PluginManifest,
    pub declarations: Declarations,
    pub settings: Map<String, Value>,
}

impl Plugin {
    pub fn settings_value(&self) -> Value {
        Value::Object(self.settings.clone())
    }

    pub fn manifest_value(&self) -> Value {
        serde_json::to_value(&self.manifest).unwrap_or(Value::Null)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("version", &self.manifest.version)
            .field("hooks", &self.declarations.hooks.len())
            .field("procedures", &self.declarations.procedure_count())
            .finish()
    }
}

/// True for files that are plugin source units.
pub fn is_unit_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// All source units under `dir`, recursively, in sorted order. Hidden entries are
/// skipped.
pub fn find_units(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut units = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else if is_unit_file(&path) {
                units.push(path);
            }
        }
    }
    units.sort();
    Ok(units)
}

#[derive(Clone)]
pub struct PluginLoader {
    catalog: Arc<NativeCatalog>,
    dependencies: Option<Arc<dyn DependencyInstaller>>,
}

impl PluginLoader {
    pub fn new(catalog: NativeCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            dependencies: None,
        }
    }

    pub fn with_dependency_installer(mut self, installer: Arc<dyn DependencyInstaller>) -> Self {
        self.dependencies = Some(installer);
        self
    }

    pub fn catalog(&self) -> &NativeCatalog {
        &self.catalog
    }

    /// The compiled-in base plugin.
    pub fn load_base(&self) -> Plugin {
        let mut registrar = Registrar::new(BASE_PLUGIN_ID, "<builtin>");
        if let Err(e) = CorePlugin.register(&mut registrar) {
            warn!("[Plugins] base plugin registration failed: {e:#}");
        }
        let mut manifest = PluginManifest::defaults(BASE_PLUGIN_ID);
        manifest.name = "Core".into();
        manifest.description =
            "Built-in plugin providing the default behavior of every hook".into();
        manifest.author_name = "Hearth".into();
        manifest.tags = vec!["core".into()];
        Plugin {
            id: BASE_PLUGIN_ID.into(),
            path: None,
            manifest,
            declarations: registrar.finish(),
            settings: Map::new(),
        }
    }

    /// Load the plugin in directory `path`.
    ///
    /// Fails with `InvalidPluginPath` if `path` is not a directory and with
    /// `EmptyPlugin` if none of its source units loads. Everything else (manifest,
    /// settings, individual units and items) degrades gracefully.
    pub async fn load(&self, path: &Path) -> HearthResult<Plugin> {
        if !path.is_dir() {
            return Err(HearthError::InvalidPluginPath(path.to_path_buf()));
        }
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| HearthError::InvalidPluginPath(path.to_path_buf()))?;

        let units = find_units(path)?;
        if units.is_empty() {
            return Err(HearthError::EmptyPlugin(id));
        }

        let manifest = PluginManifest::load(path, &id);
        self.install_dependencies(path, &id).await;

        let mut declarations = Declarations::default();
        let mut loaded = 0;
        for unit in &units {
            match self.load_unit(&id, unit) {
                Ok(declared) => {
                    declarations.merge(declared);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(plugin = %id, unit = %unit.display(), "[Plugins] skipped unit: {e:#}")
                }
            }
        }
        if loaded == 0 {
            return Err(HearthError::EmptyPlugin(id));
        }

        let settings = load_settings(path, &id, &declarations.settings_schema);

        info!(
            plugin = %id,
            version = %manifest.version,
            units = units.len(),
            hooks = declarations.hooks.len(),
            procedures = declarations.procedure_count(),
            "[Plugins] loaded"
        );
        Ok(Plugin {
            id,
            path: Some(path.to_path_buf()),
            manifest,
            declarations,
            settings,
        })
    }

    fn load_unit(&self, plugin_id: &str, unit: &Path) -> anyhow::Result<Declarations> {
        let raw = std::fs::read_to_string(unit)?;
        let mut registrar = Registrar::new(plugin_id, unit);
        let skipped = apply_unit(&raw, &mut registrar, &self.catalog)?;
        debug!(plugin = %plugin_id, unit = %unit.display(), skipped, "[Plugins] unit applied");
        Ok(registrar.finish())
    }

    /// Best effort: failures are logged and the load continues.
    async fn install_dependencies(&self, dir: &Path, id: &str) {
        let Some(installer) = &self.dependencies else {
            return;
        };
        let file = dir.join(installer.file_name());
        if !file.is_file() {
            return;
        }
        if let Err(e) = installer.install(dir, &file).await {
            warn!(plugin = %id, "[Plugins] dependency installation failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SETTINGS_FILE;
    use anyhow::Result;
    use async_trait::async_trait;
    use hearth_hooks::HookSlot;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn loads_units_recursively() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pirate");
        write(&dir, "a.yaml", "hooks:\n  - slot: agent_prompt_prefix\n    prepend: 'Arr! '\n");
        write(&dir, "nested/b.yml", "tools:\n  - name: shout\n    reply: '{input}!'\n");
        write(&dir, "notes.txt", "not a unit");
        write(&dir, "plugin.json", r#"{ "name": "Pirate", "version": "2.0.0" }"#);

        let plugin = PluginLoader::new(NativeCatalog::new()).load(&dir).await.unwrap();
        assert_eq!(plugin.id, "pirate");
        assert_eq!(plugin.manifest.name, "Pirate");
        assert_eq!(plugin.declarations.hooks.len(), 1);
        assert_eq!(plugin.declarations.hooks[0].slot, HookSlot::AgentPromptPrefix);
        assert_eq!(plugin.declarations.tools[0].plugin_id, "pirate");
        assert_eq!(plugin.declarations.units.len(), 2);
    }

    #[tokio::test]
    async fn missing_dir_is_invalid_path() {
        let root = tempfile::tempdir().unwrap();
        let err = PluginLoader::new(NativeCatalog::new())
            .load(&root.path().join("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, HearthError::InvalidPluginPath(_)));
    }

    #[tokio::test]
    async fn no_units_is_empty_plugin() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("hollow");
        write(&dir, "plugin.json", "{}");
        let err = PluginLoader::new(NativeCatalog::new()).load(&dir).await.unwrap_err();
        assert!(matches!(err, HearthError::EmptyPlugin(ref id) if id == "hollow"));
    }

    #[tokio::test]
    async fn broken_unit_does_not_sink_the_plugin() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("mixed");
        write(&dir, "bad.yaml", "tools: [");
        write(&dir, "good.yaml", "tools:\n  - name: ok\n    reply: fine\n");
        let plugin = PluginLoader::new(NativeCatalog::new()).load(&dir).await.unwrap();
        assert_eq!(plugin.declarations.tools.len(), 1);
    }

    #[tokio::test]
    async fn only_broken_units_is_empty_plugin() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("broken");
        write(&dir, "a.yaml", "tools: [ {{{ not yaml");
        let err = PluginLoader::new(NativeCatalog::new()).load(&dir).await.unwrap_err();
        assert!(matches!(err, HearthError::EmptyPlugin(ref id) if id == "broken"));
    }

    #[tokio::test]
    async fn settings_defaults_are_written() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("configurable");
        write(&dir, "main.yaml", "settings:\n  volume: { kind: integer, default: 3 }\n");
        let plugin = PluginLoader::new(NativeCatalog::new()).load(&dir).await.unwrap();
        assert_eq!(plugin.settings["volume"], 3);
        assert!(dir.join(SETTINGS_FILE).exists());
    }

    struct CountingInstaller(AtomicUsize);

    #[async_trait]
    impl DependencyInstaller for CountingInstaller {
        fn file_name(&self) -> &str {
            "deps.txt"
        }
        async fn install(&self, _dir: &Path, _file: &Path) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("offline")
        }
    }

    #[tokio::test]
    async fn dependency_failure_is_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("needy");
        write(&dir, "deps.txt", "something==1.0");
        write(&dir, "main.yaml", "tools:\n  - name: ok\n    reply: fine\n");
        let installer = Arc::new(CountingInstaller(AtomicUsize::new(0)));
        let loader =
            PluginLoader::new(NativeCatalog::new()).with_dependency_installer(installer.clone());
        assert!(loader.load(&dir).await.is_ok());
        assert_eq!(installer.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn base_plugin_is_builtin() {
        let base = PluginLoader::new(NativeCatalog::new()).load_base();
        assert_eq!(base.id, BASE_PLUGIN_ID);
        assert!(base.path.is_none());
        assert_eq!(base.declarations.hooks.len(), HookSlot::ALL.len());
    }
}
