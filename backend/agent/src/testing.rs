//! Test doubles shared by the agent tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use hearth_core::{Embedder, LlmProvider, LlmRequest, LlmResponse};
use hearth_hooks::{HookPipeline, HookRegistration};
use hearth_plugins::{BASE_PLUGIN_ID, CorePlugin, PluginModule, Registrar, RuntimeSnapshot};
use hearth_procedures::{FormDefinition, ProcedureSet, ToolDefinition};

/// Answers from a script, in order; once the script runs out every answer is
/// `"..."`. Records every request.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| Ok("...".into())) {
            Ok(content) => Ok(LlmResponse {
                content,
                provider: "scripted".into(),
                ..LlmResponse::default()
            }),
            Err(e) => Err(anyhow!(e)),
        }
    }
}

/// One dimension per keyword.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(["time", "pizza", "weather", "cat"]
            .iter()
            .map(|w| if text.contains(w) { 1.0 } else { 0.0 })
            .collect())
    }
}

pub fn base_hooks() -> Vec<HookRegistration> {
    let mut registrar = Registrar::new(BASE_PLUGIN_ID, "<builtin>");
    CorePlugin.register(&mut registrar).unwrap();
    registrar.finish().hooks
}

/// Base identity hooks plus `extra`, and the given tools.
pub fn snapshot_with(extra: Vec<HookRegistration>, tools: Vec<ToolDefinition>) -> RuntimeSnapshot {
    snapshot_with_forms(extra, tools, vec![])
}

pub fn snapshot_with_forms(
    extra: Vec<HookRegistration>,
    tools: Vec<ToolDefinition>,
    forms: Vec<FormDefinition>,
) -> RuntimeSnapshot {
    let mut hooks = base_hooks();
    hooks.extend(extra);
    RuntimeSnapshot::new(
        1,
        HookPipeline::build(1, hooks),
        ProcedureSet::build(tools.into_iter().map(Arc::new), forms.into_iter().map(Arc::new)),
    )
}
