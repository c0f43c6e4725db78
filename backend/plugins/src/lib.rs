//! Plugin system for Hearth: loading plugin directories, the registry of
//! installed and active plugins, hot reload, and the runtime snapshots the
//! agent reads hooks and procedures from.

pub mod active_set;
pub mod base;
pub mod event_bus;
pub mod installer;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod sdk;
pub mod settings;
pub mod snapshot;
pub mod unit;
pub mod watcher;

pub use active_set::ActiveSet;
pub use base::{BASE_PLUGIN_ID, CorePlugin};
pub use event_bus::{EventBus, RegistryEvent};
pub use installer::{CommandInstaller, DependencyInstaller, PluginInstaller};
pub use lifecycle::{LifecycleEvent, LifecycleHandler, LifecycleRegistration, LogMessage};
pub use loader::{Plugin, PluginLoader};
pub use manifest::{MANIFEST_FILE, PluginManifest};
pub use registry::{PluginRegistry, PluginSummary, RegistryOptions};
pub use sdk::{Declarations, NativeCatalog, PluginModule, Registrar};
pub use settings::SETTINGS_FILE;
pub use snapshot::{RuntimeSnapshot, SnapshotSource, StaticSnapshot, SyncObserver};
pub use watcher::{PluginWatcher, WatchAction, spawn_watcher, spawn_watcher_with};
