//! Declarative source units.
//!
//! A unit is a YAML file inside a plugin directory. Its top-level keys are the
//! declaration primitives; each item under a key is applied to the unit's
//! `Registrar` on its own, so one malformed item never hides the others.
//!
//! ```yaml
//! modules: [clock]
//! hooks:
//!   - slot: agent_prompt_prefix
//!     priority: 1
//!     prepend: "Talk like a pirate. "
//! tools:
//!   - name: get-time
//!     description: tells the time
//!     examples: ["what time is it"]
//!     reply: "It is {input}"
//!     direct: true
//! forms:
//!   - name: pizza_order
//!     fields:
//!       pizza_type: { kind: string, description: kind of pizza }
//!     submit: "Ordered {pizza_type}"
//! events:
//!   - on: installed
//!     log: "pirate plugin ready"
//! settings:
//!   greeting: { kind: string, default: Ahoy }
//! ```

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use serde_yaml::Value as Yaml;
use std::sync::Arc;
use tracing::warn;

use hearth_hooks::{ActionHook, HookAction, HookSlot};
use hearth_procedures::{FormDefinition, Schema, TemplateSubmit, TemplateTool, ToolDefinition};

use crate::lifecycle::{LifecycleEvent, LogMessage};
use crate::sdk::{NativeCatalog, Registrar};

#[derive(Debug, Deserialize)]
struct HookDecl {
    slot: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    set: Option<Value>,
    #[serde(default)]
    prepend: Option<String>,
    #[serde(default)]
    append: Option<String>,
    #[serde(default)]
    remove: Option<Vec<Value>>,
}

impl HookDecl {
    fn action(self) -> Result<(HookSlot, i32, HookAction)> {
        let slot: HookSlot = self.slot.parse()?;
        let mut actions = Vec::new();
        if let Some(v) = self.set {
            actions.push(HookAction::Set(v));
        }
        if let Some(p) = self.prepend {
            actions.push(HookAction::Prepend(p));
        }
        if let Some(a) = self.append {
            actions.push(HookAction::Append(a));
        }
        if let Some(r) = self.remove {
            actions.push(HookAction::Remove(r));
        }
        if actions.len() > 1 {
            bail!("hook on '{slot}' declares more than one action");
        }
        let action = actions.pop().unwrap_or(HookAction::Identity);
        Ok((slot, self.priority, action))
    }
}

#[derive(Debug, Deserialize)]
struct ToolDecl {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    examples: Vec<String>,
    reply: String,
    #[serde(default)]
    direct: bool,
}

#[derive(Debug, Deserialize)]
struct FormDecl {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    stop_examples: Vec<String>,
    #[serde(default)]
    ask_confirm: bool,
    fields: Schema,
    #[serde(default)]
    submit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventDecl {
    on: LifecycleEvent,
    log: String,
}

/// Parse `raw` and apply every declaration to `registrar`.
///
/// A YAML syntax error fails the whole unit. Item errors are logged and skipped;
/// the number of skipped items is returned.
pub fn apply_unit(raw: &str, registrar: &mut Registrar, catalog: &NativeCatalog) -> Result<usize> {
    if raw.trim().is_empty() {
        return Ok(0);
    }
    let doc: Yaml = serde_yaml::from_str(raw).context("unit is not valid YAML")?;
    let map = match doc {
        Yaml::Mapping(map) => map,
        Yaml::Null => return Ok(0),
        _ => bail!("unit must be a mapping of declaration keys"),
    };

    let mut skipped = 0;
    for (key, value) in map {
        let Some(key) = key.as_str().map(str::to_string) else {
            continue;
        };
        let items = match (key.as_str(), value) {
            ("settings", value) => {
                if let Err(e) = declare_settings(value, registrar) {
                    skipped += 1;
                    report(registrar, &key, &e);
                }
                continue;
            }
            (_, Yaml::Sequence(items)) => items,
            (_, Yaml::Null) => continue,
            (_, _) => {
                skipped += 1;
                report(registrar, &key, &anyhow!("expected a list"));
                continue;
            }
        };

        for item in items {
            let result = match key.as_str() {
                "modules" => declare_module(item, registrar, catalog),
                "hooks" => declare_hook(item, registrar),
                "tools" => declare_tool(item, registrar),
                "forms" => declare_form(item, registrar),
                "events" => declare_event(item, registrar),
                // not a declaration primitive
                _ => Ok(()),
            };
            if let Err(e) = result {
                skipped += 1;
                report(registrar, &key, &e);
            }
        }
    }
    Ok(skipped)
}

fn report(registrar: &Registrar, key: &str, error: &anyhow::Error) {
    warn!(
        plugin = %registrar.plugin_id(),
        unit = %registrar.unit().display(),
        key,
        "[Plugins] skipped declaration: {error:#}"
    );
}

fn declare_module(item: Yaml, registrar: &mut Registrar, catalog: &NativeCatalog) -> Result<()> {
    let name: String = serde_yaml::from_value(item)?;
    let module = catalog
        .get(&name)
        .ok_or_else(|| anyhow!("unknown native module '{name}'"))?;
    module.register(registrar).with_context(|| format!("module '{name}'"))
}

fn declare_hook(item: Yaml, registrar: &mut Registrar) -> Result<()> {
    let decl: HookDecl = serde_yaml::from_value(item)?;
    let (slot, priority, action) = decl.action()?;
    registrar.hook(slot, priority, Arc::new(ActionHook::new(action)));
    Ok(())
}

fn declare_tool(item: Yaml, registrar: &mut Registrar) -> Result<()> {
    let decl: ToolDecl = serde_yaml::from_value(item)?;
    if decl.name.trim().is_empty() {
        bail!("tool without a name");
    }
    let handler = Arc::new(TemplateTool::new(decl.reply));
    let tool = ToolDefinition::new(&decl.name, decl.description, handler)
        .with_examples(decl.examples)
        .direct(decl.direct);
    registrar.tool(tool);
    Ok(())
}

fn declare_form(item: Yaml, registrar: &mut Registrar) -> Result<()> {
    let decl: FormDecl = serde_yaml::from_value(item)?;
    if decl.name.trim().is_empty() {
        bail!("form without a name");
    }
    let form = FormDefinition::new(
        &decl.name,
        decl.description,
        decl.fields,
        Arc::new(TemplateSubmit::new(decl.submit)),
    )
    .with_examples(decl.examples)
    .with_stop_examples(decl.stop_examples)
    .ask_confirm(decl.ask_confirm);
    registrar.form(form);
    Ok(())
}

fn declare_event(item: Yaml, registrar: &mut Registrar) -> Result<()> {
    let decl: EventDecl = serde_yaml::from_value(item)?;
    registrar.on(decl.on, Arc::new(LogMessage { message: decl.log }));
    Ok(())
}

fn declare_settings(value: Yaml, registrar: &mut Registrar) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let schema: Schema = serde_yaml::from_value(value)?;
    registrar.settings(schema);
    Ok(())
}
