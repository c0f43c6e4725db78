//! The procedures of the active plugins, indexed by name.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::form::FormDefinition;
use crate::procedure::{normalize_name, Procedure, ProcedureKind};
use crate::tool::ToolDefinition;

/// Where a trigger text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Description,
    StartExample,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::StartExample => "start_example",
        }
    }
}

/// A text that should lead to a procedure, as stored in procedural memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureTrigger {
    pub name: String,
    pub kind: ProcedureKind,
    pub source: TriggerSource,
    pub text: String,
}

#[derive(Debug, Clone)]
enum Entry {
    Tool(usize),
    Form(usize),
}

/// Immutable set of procedures. Names are unique across tools and forms.
#[derive(Debug, Clone, Default)]
pub struct ProcedureSet {
    tools: Vec<Arc<ToolDefinition>>,
    forms: Vec<Arc<FormDefinition>>,
    index: HashMap<String, Entry>,
}

impl ProcedureSet {
    /// Build from candidates in plugin order. A name already taken keeps its first
    /// owner; later duplicates are skipped with a warning.
    pub fn build(
        tools: impl IntoIterator<Item = Arc<ToolDefinition>>,
        forms: impl IntoIterator<Item = Arc<FormDefinition>>,
    ) -> Self {
        let mut set = Self::default();
        for tool in tools {
            if set.claim(&tool.name, &tool.plugin_id) {
                set.index.insert(tool.name.clone(), Entry::Tool(set.tools.len()));
                set.tools.push(tool);
            }
        }
        for form in forms {
            if set.claim(&form.name, &form.plugin_id) {
                set.index.insert(form.name.clone(), Entry::Form(set.forms.len()));
                set.forms.push(form);
            }
        }
        set
    }

    fn claim(&self, name: &str, plugin_id: &str) -> bool {
        if self.index.contains_key(name) {
            warn!(
                procedure = name,
                plugin = plugin_id,
                "[Procedures] duplicate name; keeping the first one"
            );
            return false;
        }
        true
    }

    pub fn tools(&self) -> &[Arc<ToolDefinition>] {
        &self.tools
    }

    pub fn forms(&self) -> &[Arc<FormDefinition>] {
        &self.forms
    }

    pub fn tool(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
        match self.index.get(&normalize_name(name))? {
            Entry::Tool(i) => self.tools.get(*i),
            Entry::Form(_) => None,
        }
    }

    pub fn form(&self, name: &str) -> Option<&Arc<FormDefinition>> {
        match self.index.get(&normalize_name(name))? {
            Entry::Form(i) => self.forms.get(*i),
            Entry::Tool(_) => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&normalize_name(name))
    }

    /// All procedures, tools first.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Procedure> {
        self.tools
            .iter()
            .map(|t| t.as_ref() as &dyn Procedure)
            .chain(self.forms.iter().map(|f| f.as_ref() as &dyn Procedure))
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len() + self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every trigger text: one per description, one per start example.
    pub fn triggers(&self) -> Vec<ProcedureTrigger> {
        let mut out = Vec::new();
        for p in self.iter() {
            let make = |source, text: &str| ProcedureTrigger {
                name: p.name().to_string(),
                kind: p.kind(),
                source,
                text: text.to_string(),
            };
            if !p.description().is_empty() {
                out.push(make(TriggerSource::Description, p.description()));
            }
            for example in p.start_examples() {
                out.push(make(TriggerSource::StartExample, example));
            }
        }
        out
    }
}
