/// Built-in hook implementations.
///
/// `IdentityHook` backs the base plugin: it registers one on every slot so that no
/// slot is ever empty. `ActionHook` backs hooks declared in plugin YAML units.
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use hearth_core::WorkingMemory;

use crate::registry::Hook;

// ---------------------------------------------------------------------------
// Identity hook
// ---------------------------------------------------------------------------

pub struct IdentityHook;

#[async_trait]
impl Hook for IdentityHook {
    async fn call(&self, value: Value, _session: Option<&mut WorkingMemory>) -> Result<Value> {
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Declarative action hook
// ---------------------------------------------------------------------------

/// A data-only transformation a plugin can declare without code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    /// Replace the value.
    Set(Value),
    /// Prefix a string, or insert at the front of a list.
    Prepend(String),
    /// Suffix a string, or push onto a list.
    Append(String),
    /// Drop matching entries from a list.
    Remove(Vec<Value>),
    /// Leave the value untouched.
    Identity,
}

impl HookAction {
    pub fn apply(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Set(v), _) => v.clone(),
            (Self::Identity, value) => value,

            (Self::Prepend(p), Value::String(s)) => Value::String(format!("{p}{s}")),
            (Self::Prepend(p), Value::Null) => Value::String(p.clone()),
            (Self::Prepend(p), Value::Array(mut list)) => {
                list.insert(0, Value::String(p.clone()));
                Value::Array(list)
            }

            (Self::Append(a), Value::String(s)) => Value::String(format!("{s}{a}")),
            (Self::Append(a), Value::Null) => Value::String(a.clone()),
            (Self::Append(a), Value::Array(mut list)) => {
                list.push(Value::String(a.clone()));
                Value::Array(list)
            }

            (Self::Remove(drop), Value::Array(list)) => {
                Value::Array(list.into_iter().filter(|v| !drop.contains(v)).collect())
            }

            (action, value) => {
                warn!(
                    ?action,
                    kind = value_kind(&value),
                    "[Hooks] action does not apply; value unchanged"
                );
                value
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub struct ActionHook {
    pub action: HookAction,
}

impl ActionHook {
    pub fn new(action: HookAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl Hook for ActionHook {
    async fn call(&self, value: Value, _session: Option<&mut WorkingMemory>) -> Result<Value> {
        Ok(self.action.apply(value))
    }
}
