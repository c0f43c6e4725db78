//! Plugin directory watcher.
//!
//! Watches the plugins root recursively and maps filesystem changes onto the
//! registry: a new plugin directory is installed, a vanished one removed, and a
//! changed one reloaded. Events are debounced per plugin id so an editor saving
//! several files produces one reload.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use hearth_core::HearthResult;

use crate::loader::is_unit_file;
use crate::manifest::MANIFEST_FILE;
use crate::registry::PluginRegistry;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Install,
    Remove,
    Reload,
    Ignore,
}

/// What to do with a plugin id after a change, given whether its directory
/// still exists and whether the registry knows it.
pub fn decide(exists: bool, known: bool) -> WatchAction {
    match (exists, known) {
        (true, false) => WatchAction::Install,
        (false, true) => WatchAction::Remove,
        (true, true) => WatchAction::Reload,
        (false, false) => WatchAction::Ignore,
    }
}

/// First path component of `path` below `root`: the plugin id.
pub fn plugin_id_for(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let first = rel.components().next()?;
    let id = first.as_os_str().to_str()?;
    (!id.starts_with('.')).then(|| id.to_string())
}

/// Changes that can alter what a plugin declares. Settings files and temp
/// files written by the registry itself are not.
fn is_relevant(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    if rel.components().count() == 1 {
        // the plugin directory itself
        return true;
    }
    let hidden = rel
        .components()
        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.starts_with('.')));
    if hidden {
        return false;
    }
    is_unit_file(path) || path.file_name().is_some_and(|n| n == MANIFEST_FILE) || path.is_dir()
}

/// Keeps the filesystem watch alive; dropping it stops watching.
pub struct PluginWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl PluginWatcher {
    pub fn stop(self) {
        self.task.abort();
    }
}

pub fn spawn_watcher(registry: Arc<PluginRegistry>) -> HearthResult<PluginWatcher> {
    spawn_watcher_with(registry, DEFAULT_DEBOUNCE)
}

pub fn spawn_watcher_with(
    registry: Arc<PluginRegistry>,
    debounce: Duration,
) -> HearthResult<PluginWatcher> {
    let root = registry.root().to_path_buf();
    std::fs::create_dir_all(&root)?;

    let (tx, rx) = mpsc::channel::<notify::Result<Event>>(256);
    let mut watcher = notify::recommended_watcher(move |res| {
        if let Err(e) = tx.blocking_send(res) {
            error!("[Watcher] failed to forward file event: {e}");
        }
    })
    .map_err(anyhow::Error::from)?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(anyhow::Error::from)?;
    info!(root = %root.display(), "[Watcher] watching plugins");

    let task = tokio::spawn(coordinate(registry, root, rx, debounce));
    Ok(PluginWatcher { _watcher: watcher, task })
}

fn collect(root: &Path, res: notify::Result<Event>, pending: &mut BTreeSet<String>) {
    match res {
        Ok(event) => {
            if event.kind.is_access() {
                return;
            }
            for path in event.paths.iter().filter(|p| is_relevant(root, p)) {
                if let Some(id) = plugin_id_for(root, path) {
                    pending.insert(id);
                }
            }
        }
        Err(e) => warn!("[Watcher] watch error: {e:?}"),
    }
}

async fn coordinate(
    registry: Arc<PluginRegistry>,
    root: PathBuf,
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    debounce: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = BTreeSet::new();
        collect(&root, first, &mut pending);

        // quiet period: keep draining until no event arrives for `debounce`
        while let Ok(Some(res)) = tokio::time::timeout(debounce, rx.recv()).await {
            collect(&root, res, &mut pending);
        }

        for id in pending {
            apply(&registry, &root, &id).await;
        }
    }
    debug!("[Watcher] event channel closed");
}

async fn apply(registry: &PluginRegistry, root: &Path, id: &str) {
    let dir = root.join(id);
    let known = registry.summary(id).await.is_some();
    match decide(dir.is_dir(), known) {
        WatchAction::Install => {
            if registry.install_plugin(&dir).await.is_some() {
                registry.synchronize().await;
            }
        }
        WatchAction::Remove => {
            if let Err(e) = registry.remove_plugin(id).await {
                warn!(plugin = %id, "[Watcher] remove failed: {e}");
            }
        }
        WatchAction::Reload => {
            registry.reload_plugin(id).await;
        }
        WatchAction::Ignore => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryOptions;
    use crate::sdk::NativeCatalog;
    use crate::loader::PluginLoader;
    use crate::snapshot::SnapshotSource;

    #[test]
    fn decisions() {
        assert_eq!(decide(true, false), WatchAction::Install);
        assert_eq!(decide(false, true), WatchAction::Remove);
        assert_eq!(decide(true, true), WatchAction::Reload);
        assert_eq!(decide(false, false), WatchAction::Ignore);
    }

    #[test]
    fn ids_come_from_first_component() {
        let root = Path::new("/srv/plugins");
        let deep = Path::new("/srv/plugins/pirate/deep/a.yaml");
        assert_eq!(plugin_id_for(root, deep).as_deref(), Some("pirate"));
        let top = Path::new("/srv/plugins/pirate");
        assert_eq!(plugin_id_for(root, top).as_deref(), Some("pirate"));
        assert_eq!(plugin_id_for(root, Path::new("/srv/plugins/.cache/x")), None);
        assert_eq!(plugin_id_for(root, Path::new("/elsewhere/a.yaml")), None);
        assert_eq!(plugin_id_for(root, root), None);
    }

    #[test]
    fn registry_writes_are_not_relevant() {
        let root = Path::new("/srv/plugins");
        assert!(is_relevant(root, Path::new("/srv/plugins/pirate")));
        assert!(is_relevant(root, Path::new("/srv/plugins/pirate/a.yaml")));
        assert!(is_relevant(root, Path::new("/srv/plugins/pirate/plugin.json")));
        assert!(!is_relevant(root, Path::new("/srv/plugins/pirate/settings.json")));
        assert!(!is_relevant(root, Path::new("/srv/plugins/pirate/settings.json.tmp")));
        assert!(!is_relevant(root, Path::new("/srv/plugins/pirate/.a.yaml.swp")));
    }

    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_directory_is_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Arc::new(PluginRegistry::new(
            RegistryOptions { root: tmp.path().join("plugins"), active_set_path: None },
            PluginLoader::new(NativeCatalog::new()),
        ));
        registry.find_plugins().await;
        let watcher = spawn_watcher_with(registry.clone(), Duration::from_millis(100)).unwrap();
        let generation = registry.snapshot().generation;

        let dir = tmp.path().join("plugins/parrot");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("p.yaml"), "tools:\n  - name: squawk\n    reply: squawk\n")
            .unwrap();

        let reg = registry.clone();
        assert!(wait_for(move || reg.snapshot().generation > generation).await);
        assert!(registry.summary("parrot").await.is_some());
        watcher.stop();
    }
}
