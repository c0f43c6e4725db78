//! Conversational chain: the prompt prefix and suffix from hooks, the agent
//! context, and a streamed completion whose tokens go to the session's
//! outbound channel while the answer is produced.

use tokio::sync::mpsc;
use tracing::debug;

use hearth_core::{HearthError, HearthResult, LlmProvider, LlmRequest, OutboundEvent, WorkingMemory};
use hearth_hooks::{HookPipeline, HookSlot};

use crate::context::AgentContext;
use crate::output::{AgentOutput, IntermediateStep};
use crate::prompts::{CONVERSATION, DEFAULT_PREFIX, DEFAULT_SUFFIX};

pub async fn run_fallback(
    hooks: &HookPipeline,
    llm: &dyn LlmProvider,
    session: &mut WorkingMemory,
    context: &AgentContext,
    steps: Vec<IntermediateStep>,
) -> HearthResult<AgentOutput> {
    let prefix: String = hooks
        .execute_as(HookSlot::AgentPromptPrefix, DEFAULT_PREFIX.to_string(), Some(&mut *session))
        .await?;
    let suffix: String = hooks
        .execute_as(HookSlot::AgentPromptSuffix, DEFAULT_SUFFIX.to_string(), Some(&mut *session))
        .await?;

    let request = LlmRequest::new(context.render(CONVERSATION))
        .with_system(format!("{prefix}{}", context.render(&suffix)));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let forwarder = session.outbound().map(|outbound| {
        tokio::spawn(async move {
            while let Some(token) = rx.recv().await {
                if outbound.send(OutboundEvent::Token(token)).is_err() {
                    break;
                }
            }
        })
    });

    let result = llm.stream(&request, &tx).await;
    drop(tx);
    if let Some(forwarder) = forwarder {
        // closes once every token has been forwarded
        let _ = forwarder.await;
    }

    let response = result.map_err(|e| HearthError::Llm {
        provider: llm.name().to_string(),
        message: format!("{e:#}"),
    })?;
    debug!(
        provider = %response.provider,
        tokens = response.tokens_used,
        latency_ms = response.latency_ms,
        "[Agent] conversational chain answered"
    );

    let output = AgentOutput {
        output: response.content.trim().to_string(),
        return_direct: false,
        intermediate_steps: steps,
    };
    hooks
        .execute_as(HookSlot::AfterMemoryChain, output, Some(session))
        .await
}
