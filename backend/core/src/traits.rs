use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::session::WorkingMemory;
use crate::types::FormState;

/// A language model capability: text in, text out.
///
/// Concrete adapters live outside the runtime; the core only depends on this trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openrouter", "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and return the response text.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Streaming completion. Tokens are forwarded to `tokens` as they arrive and the
    /// full response is returned at the end. Providers without native streaming emit
    /// the whole completion as a single token.
    async fn stream(
        &self,
        request: &LlmRequest,
        tokens: &mpsc::UnboundedSender<String>,
    ) -> Result<LlmResponse> {
        let response = self.complete(request).await?;
        let _ = tokens.send(response.content.clone());
        Ok(response)
    }
}

/// An embedding capability: text in, vector out.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Empty means "provider default".
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Sequences at which generation should stop.
    pub stop: Vec<String>,
}

impl LlmRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            model: String::new(),
            system_prompt: String::new(),
            user_prompt: user_prompt.into(),
            max_tokens: 1024,
            temperature: 0.0,
            stop: Vec::new(),
        }
    }

    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

/// A multi-turn form attached to a session.
///
/// The session owns at most one active form; the agent takes it out of the session,
/// advances it with `next`, and puts it back.
#[async_trait]
pub trait FormSession: Send + Sync + std::fmt::Debug {
    /// Canonical procedure name of the form.
    fn name(&self) -> &str;

    fn state(&self) -> FormState;

    /// Advance the state machine by one user turn and return the reply text.
    async fn next(&mut self, session: &mut WorkingMemory, llm: &dyn LlmProvider) -> Result<String>;

    /// Back to `Incomplete` with an empty model.
    fn reset(&mut self);
}
