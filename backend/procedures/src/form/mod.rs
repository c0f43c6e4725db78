//! Forms: multi-turn procedures that collect a structured model from the
//! conversation, optionally ask for confirmation, then submit.

mod instance;
pub mod prompts;

pub use instance::FormInstance;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use hearth_core::WorkingMemory;

use crate::procedure::{normalize_name, Procedure, ProcedureKind};
use crate::schema::Schema;

/// What happens with a completed, validated model.
#[async_trait]
pub trait FormSubmit: Send + Sync {
    async fn submit(
        &self,
        model: &Map<String, Value>,
        session: &mut WorkingMemory,
    ) -> Result<String>;
}

pub struct FnSubmit<F> {
    f: F,
}

#[async_trait]
impl<F> FormSubmit for FnSubmit<F>
where
    F: Fn(&Map<String, Value>, &mut WorkingMemory) -> Result<String> + Send + Sync,
{
    async fn submit(
        &self,
        model: &Map<String, Value>,
        session: &mut WorkingMemory,
    ) -> Result<String> {
        (self.f)(model, session)
    }
}

pub fn submit_fn<F>(f: F) -> Arc<dyn FormSubmit>
where
    F: Fn(&Map<String, Value>, &mut WorkingMemory) -> Result<String> + Send + Sync + 'static,
{
    Arc::new(FnSubmit { f })
}

/// Submission for forms declared in plugin files. `{field}` placeholders are
/// replaced by model values; without a template the model is echoed as JSON.
pub struct TemplateSubmit {
    template: Option<String>,
}

impl TemplateSubmit {
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }
}

#[async_trait]
impl FormSubmit for TemplateSubmit {
    async fn submit(
        &self,
        model: &Map<String, Value>,
        _session: &mut WorkingMemory,
    ) -> Result<String> {
        let Some(template) = &self.template else {
            return Ok(format!("Form submitted:\n{}", serde_json::to_string_pretty(model)?));
        };
        let mut out = template.clone();
        for (key, value) in model {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
                other => other.to_string(),
            };
            out = out.replace(&format!("{{{key}}}"), &rendered);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FormDefinition {
    pub name: String,
    pub description: String,
    pub start_examples: Vec<String>,
    /// Utterances meaning "stop filling this form".
    pub stop_examples: Vec<String>,
    /// Ask for an explicit yes/no before submitting.
    pub ask_confirm: bool,
    pub schema: Schema,
    pub plugin_id: String,
    submit: Arc<dyn FormSubmit>,
}

impl fmt::Debug for FormDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormDefinition")
            .field("name", &self.name)
            .field("ask_confirm", &self.ask_confirm)
            .field("fields", &self.schema.len())
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}

impl FormDefinition {
    pub fn new(
        name: &str,
        description: impl Into<String>,
        schema: Schema,
        submit: Arc<dyn FormSubmit>,
    ) -> Self {
        Self {
            name: normalize_name(name),
            description: description.into(),
            start_examples: Vec::new(),
            stop_examples: Vec::new(),
            ask_confirm: false,
            schema,
            plugin_id: String::new(),
            submit,
        }
    }

    pub fn with_examples<I, S>(mut self, start: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_examples = start.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stop_examples<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_examples = stop.into_iter().map(Into::into).collect();
        self
    }

    pub fn ask_confirm(mut self, ask: bool) -> Self {
        self.ask_confirm = ask;
        self
    }

    pub fn owned_by(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = plugin_id.into();
        self
    }

    /// A fresh instance in `Incomplete` with an empty model.
    pub fn instantiate(self: &Arc<Self>) -> FormInstance {
        FormInstance::new(Arc::clone(self))
    }

    pub(crate) async fn run_submit(
        &self,
        model: &Map<String, Value>,
        session: &mut WorkingMemory,
    ) -> Result<String> {
        self.submit.submit(model, session).await
    }
}

impl Procedure for FormDefinition {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn start_examples(&self) -> &[String] {
        &self.start_examples
    }
    fn kind(&self) -> ProcedureKind {
        ProcedureKind::Form
    }
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }
}
