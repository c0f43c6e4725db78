//! Plugin SDK
//!
//! The surface plugin code sees. A plugin contributes items through a `Registrar`:
//! a fresh accumulator per source unit, owned by the loader. Every item is stamped
//! with the registrar's plugin id, so ownership follows provenance rather than
//! anything the item claims about itself.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hearth_hooks::{Hook, HookRegistration, HookSlot};
use hearth_procedures::{FormDefinition, Schema, ToolDefinition};

use crate::lifecycle::{LifecycleEvent, LifecycleHandler, LifecycleRegistration};

/// Compiled-in plugin code. Linked into the binary and referenced by name from a
/// plugin's source units.
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, registrar: &mut Registrar) -> Result<()>;
}

/// Everything a plugin declared.
#[derive(Clone, Default)]
pub struct Declarations {
    pub hooks: Vec<HookRegistration>,
    pub tools: Vec<Arc<ToolDefinition>>,
    pub forms: Vec<Arc<FormDefinition>>,
    pub events: Vec<LifecycleRegistration>,
    pub settings_schema: Schema,
    /// Source units the items came from, in load order.
    pub units: Vec<PathBuf>,
}

impl Declarations {
    pub fn merge(&mut self, other: Declarations) {
        self.hooks.extend(other.hooks);
        self.tools.extend(other.tools);
        self.forms.extend(other.forms);
        self.events.extend(other.events);
        self.settings_schema.extend(other.settings_schema);
        self.units.extend(other.units);
    }

    pub fn procedure_count(&self) -> usize {
        self.tools.len() + self.forms.len()
    }
}

/// Registration context for one source unit.
pub struct Registrar {
    plugin_id: String,
    unit: PathBuf,
    declared: Declarations,
}

impl Registrar {
    pub fn new(plugin_id: impl Into<String>, unit: impl AsRef<Path>) -> Self {
        let unit = unit.as_ref().to_path_buf();
        Self {
            plugin_id: plugin_id.into(),
            declared: Declarations {
                units: vec![unit.clone()],
                ..Default::default()
            },
            unit,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn unit(&self) -> &Path {
        &self.unit
    }

    pub fn hook(&mut self, slot: HookSlot, priority: i32, hook: Arc<dyn Hook>) -> &mut Self {
        let reg = HookRegistration::new(slot, priority, self.plugin_id.clone(), hook);
        self.declared.hooks.push(reg);
        self
    }

    pub fn tool(&mut self, tool: ToolDefinition) -> &mut Self {
        let tool = tool.owned_by(self.plugin_id.clone());
        self.declared.tools.push(Arc::new(tool));
        self
    }

    pub fn form(&mut self, form: FormDefinition) -> &mut Self {
        let form = form.owned_by(self.plugin_id.clone());
        self.declared.forms.push(Arc::new(form));
        self
    }

    pub fn on(&mut self, event: LifecycleEvent, handler: Arc<dyn LifecycleHandler>) -> &mut Self {
        self.declared.events.push(LifecycleRegistration { event, handler });
        self
    }

    /// Declare settings fields. Repeated calls add fields.
    pub fn settings(&mut self, schema: Schema) -> &mut Self {
        self.declared.settings_schema.extend(schema);
        self
    }

    pub fn finish(self) -> Declarations {
        self.declared
    }
}

/// Compiled-in modules by name.
#[derive(Clone, Default)]
pub struct NativeCatalog {
    modules: HashMap<String, Arc<dyn PluginModule>>,
}

impl NativeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: Arc<dyn PluginModule>) -> Self {
        self.register(module);
        self
    }

    pub fn register(&mut self, module: Arc<dyn PluginModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PluginModule>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }
}
