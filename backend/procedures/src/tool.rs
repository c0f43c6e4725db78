//! Tools: single-shot procedures.
//!
//! A tool takes an optional text input, may read and write the session, and returns
//! a text observation. A `direct` tool's observation is the reply itself; otherwise
//! it is fed back into the selection loop.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use hearth_core::{HearthError, HearthResult, WorkingMemory};
use hearth_logging::{AgentEvent, EventLogger};

use crate::procedure::{normalize_name, Procedure, ProcedureKind};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, input: Option<String>, session: &mut WorkingMemory) -> Result<String>;
}

/// Closure-backed handler.
pub struct FnTool<F> {
    f: F,
}

#[async_trait]
impl<F> ToolHandler for FnTool<F>
where
    F: Fn(Option<String>, &mut WorkingMemory) -> Result<String> + Send + Sync,
{
    async fn run(&self, input: Option<String>, session: &mut WorkingMemory) -> Result<String> {
        (self.f)(input, session)
    }
}

pub fn tool_fn<F>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Option<String>, &mut WorkingMemory) -> Result<String> + Send + Sync + 'static,
{
    Arc::new(FnTool { f })
}

/// Handler for tools declared in plugin files: renders a reply template where
/// `{input}` stands for the tool input and `{user_id}` for the session's user.
pub struct TemplateTool {
    template: String,
}

impl TemplateTool {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }
}

#[async_trait]
impl ToolHandler for TemplateTool {
    async fn run(&self, input: Option<String>, session: &mut WorkingMemory) -> Result<String> {
        Ok(self
            .template
            .replace("{input}", input.as_deref().unwrap_or_default())
            .replace("{user_id}", &session.user_id))
    }
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub start_examples: Vec<String>,
    /// Return the observation as the final reply.
    pub direct: bool,
    pub plugin_id: String,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("direct", &self.direct)
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}

impl ToolDefinition {
    pub fn new(name: &str, description: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: normalize_name(name),
            description: description.into(),
            start_examples: Vec::new(),
            direct: false,
            plugin_id: String::new(),
            handler,
        }
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_examples = examples.into_iter().map(Into::into).collect();
        self
    }

    pub fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    pub fn owned_by(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = plugin_id.into();
        self
    }

    /// Run the tool inside a session.
    ///
    /// A tool only runs bound to a session; without one it fails with
    /// `ProcedureNotAssigned`.
    pub async fn call(
        &self,
        input: Option<String>,
        session: Option<&mut WorkingMemory>,
    ) -> HearthResult<String> {
        let session = session.ok_or_else(|| HearthError::ProcedureNotAssigned(self.name.clone()))?;
        debug!(tool = %self.name, input = ?input, "[Procedures] calling tool");

        let input_log = input.clone().unwrap_or_default();
        let observation = self.handler.run(input, session).await?;

        EventLogger::log_event(
            &session.user_id,
            AgentEvent::ProcedureCall {
                procedure: self.name.clone(),
                input: input_log,
                observation: observation.clone(),
            },
        );
        Ok(observation)
    }
}

impl Procedure for ToolDefinition {
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
        ProcedureKind::Tool
    }
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }
}
