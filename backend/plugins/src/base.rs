//! The built-in base plugin.
//!
//! Always installed and always active. It registers an identity hook on every slot
//! at priority 0, so executing any slot in a default deployment returns its input.

use anyhow::Result;
use std::sync::Arc;

use hearth_hooks::{HookSlot, IdentityHook};

use crate::sdk::{PluginModule, Registrar};

pub const BASE_PLUGIN_ID: &str = "core_plugin";

pub struct CorePlugin;

impl PluginModule for CorePlugin {
    fn name(&self) -> &str {
        BASE_PLUGIN_ID
    }

    fn register(&self, registrar: &mut Registrar) -> Result<()> {
        let identity = Arc::new(IdentityHook);
        for slot in HookSlot::ALL {
            registrar.hook(slot, 0, identity.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_covers_every_slot() {
        let mut r = Registrar::new(BASE_PLUGIN_ID, "<builtin>");
        CorePlugin.register(&mut r).unwrap();
        let declared = r.finish();
        assert_eq!(declared.hooks.len(), HookSlot::ALL.len());
        assert!(declared.hooks.iter().all(|h| h.priority == 0 && h.plugin_id == BASE_PLUGIN_ID));
        assert_eq!(declared.procedure_count(), 0);
    }
}
