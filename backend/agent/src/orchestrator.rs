//! Agent Orchestrator
//!
//! The decision loop for one user turn. Stages run in order and the first one
//! that produces a reply wins:
//!
//! 1. `before_agent_starts` over the agent context
//! 2. instant tool trigger
//! 3. `agent_fast_reply`
//! 4. the session's active form
//! 5. procedure selection chain (only with procedural recall hits)
//! 6. conversational chain

use serde_json::Value;
use tracing::{debug, error, info, warn};

use hearth_core::{FormState, HearthResult, LlmProvider, WorkingMemory};
use hearth_hooks::HookSlot;
use hearth_logging::{AgentEvent, EventLogger};
use hearth_plugins::RuntimeSnapshot;

use crate::context::{AgentContext, format_tools_output};
use crate::fallback::run_fallback;
use crate::output::{AgentOutput, IntermediateStep};
use crate::prompts::APOLOGY;
use crate::selection::SelectionChain;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Let plugins declare an instant trigger pattern such as `@{name}`.
    pub instant_tool_trigger: bool,
    /// Cap on selection chain rounds.
    pub max_iterations: usize,
    /// History turns shown to the conversational chain.
    pub fallback_history_turns: usize,
    /// History turns shown to the selection chain.
    pub selection_history_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instant_tool_trigger: true,
            max_iterations: 5,
            fallback_history_turns: 5,
            selection_history_turns: 3,
        }
    }
}

pub struct AgentOrchestrator {
    config: AgentConfig,
}

impl AgentOrchestrator {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Like [`decide`](Self::decide) but never fails: errors are logged and
    /// answered with an apology.
    pub async fn run_turn(
        &self,
        snapshot: &RuntimeSnapshot,
        llm: &dyn LlmProvider,
        session: &mut WorkingMemory,
    ) -> AgentOutput {
        match self.decide(snapshot, llm, session).await {
            Ok(output) => output,
            Err(e) => {
                error!(user = %session.user_id, "[Agent] turn failed: {e}");
                EventLogger::log_event(
                    &session.user_id,
                    AgentEvent::Error { error_msg: e.to_string() },
                );
                AgentOutput::text(APOLOGY)
            }
        }
    }

    pub async fn decide(
        &self,
        snapshot: &RuntimeSnapshot,
        llm: &dyn LlmProvider,
        session: &mut WorkingMemory,
    ) -> HearthResult<AgentOutput> {
        let hooks = &snapshot.hooks;

        let context = AgentContext::build(session, self.config.fallback_history_turns);
        let mut context: AgentContext = hooks
            .execute_as(HookSlot::BeforeAgentStarts, context, Some(&mut *session))
            .await?;

        if self.config.instant_tool_trigger {
            if let Some(output) = self.instant_trigger(snapshot, &context.input, session).await? {
                return Ok(output);
            }
        }

        let fast = hooks
            .execute(HookSlot::AgentFastReply, Value::Null, Some(&mut *session))
            .await?;
        if let Some(output) = fast_reply(fast) {
            debug!("[Agent] fast reply");
            return Ok(output);
        }

        if let Some(mut form) = session.active_form.take() {
            if form.state() != FormState::Closed {
                let reply = form.next(session, llm).await?;
                let name = form.name().to_string();
                session.active_form = Some(form);
                let steps = vec![IntermediateStep::new(name, None, reply.clone())];
                return Ok(AgentOutput::direct(reply, steps));
            }
            debug!(form = %form.name(), "[Agent] dropping closed form");
        }

        let mut steps = Vec::new();
        if !session.procedural_memories.is_empty() {
            let chain = SelectionChain {
                snapshot,
                llm,
                max_iterations: self.config.max_iterations,
                history_turns: self.config.selection_history_turns,
            };
            match chain.run(session).await {
                Ok(output) => {
                    let output: AgentOutput = hooks
                        .execute_as(HookSlot::AfterProceduresChain, output, Some(&mut *session))
                        .await?;
                    if output.return_direct {
                        info!(
                            steps = output.intermediate_steps.len(),
                            "[Agent] procedures answered directly"
                        );
                        return Ok(output);
                    }
                    steps = output.intermediate_steps;
                }
                Err(e) => warn!("[Agent] procedure selection failed, falling back: {e}"),
            }
        }

        context.tools_output = format_tools_output(&steps);
        run_fallback(hooks, llm, session, &context, steps).await
    }

    /// Invoke the tool whose trigger prefixes `input`, with the rest of the
    /// input as argument.
    async fn instant_trigger(
        &self,
        snapshot: &RuntimeSnapshot,
        input: &str,
        session: &mut WorkingMemory,
    ) -> HearthResult<Option<AgentOutput>> {
        let pattern: Option<String> = snapshot
            .hooks
            .execute_as(HookSlot::InstantToolTrigger, None::<String>, Some(&mut *session))
            .await?;
        let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
            return Ok(None);
        };

        for tool in snapshot.procedures.tools() {
            let trigger = pattern.replace("{name}", &tool.name);
            let Some(rest) = input.strip_prefix(trigger.as_str()) else {
                continue;
            };
            let rest = rest.trim();
            let tool_input = (!rest.is_empty()).then(|| rest.to_string());
            info!(tool = %tool.name, "[Agent] instant trigger");
            let observation = tool.call(tool_input.clone(), Some(&mut *session)).await?;
            return Ok(Some(AgentOutput {
                output: observation.clone(),
                return_direct: tool.direct,
                intermediate_steps: vec![IntermediateStep::new(
                    &tool.name,
                    tool_input,
                    observation,
                )],
            }));
        }
        Ok(None)
    }
}

/// A non-null fast reply: either a bare string or a full output object.
fn fast_reply(value: Value) -> Option<AgentOutput> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(AgentOutput::text(text)),
        other => match serde_json::from_value::<AgentOutput>(other) {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("[Agent] ignoring malformed fast reply: {e}");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedLlm, snapshot_with, snapshot_with_forms};
    use anyhow::Result;
    use async_trait::async_trait;
    use hearth_core::{FormSession, RecalledMemory};
    use hearth_hooks::{HookRegistration, hook_fn};
    use hearth_procedures::{
        FieldKind, FieldSpec, FormDefinition, Schema, ToolDefinition, submit_fn, tool_fn,
    };
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn get_time(direct: bool) -> ToolDefinition {
        ToolDefinition::new(
            "get-time",
            "tells the time",
            tool_fn(|input, _| {
                let suffix = input.map(|i| format!(" ({i})")).unwrap_or_default();
                Ok(format!("noon{suffix}"))
            }),
        )
        .with_examples(["what time is it"])
        .direct(direct)
    }

    fn session(text: &str) -> WorkingMemory {
        let mut wm = WorkingMemory::new("alice");
        wm.user_message = Some(text.to_string());
        wm
    }

    fn recalled(wm: &mut WorkingMemory, name: &str) {
        wm.set_memories(
            hearth_core::MemoryKind::Procedural,
            vec![RecalledMemory::new(
                "what time is it",
                0.9,
                json!({ "name": name, "kind": "tool" }),
            )],
        );
    }

    #[tokio::test]
    async fn instant_trigger_runs_the_tool_alone() {
        let snap = snapshot_with(
            vec![HookRegistration::new(
                HookSlot::InstantToolTrigger,
                1,
                "trigger",
                hook_fn(|_, _| Ok(json!("@{name}"))),
            )],
            vec![get_time(false)],
        );
        let llm = ScriptedLlm::new(vec![]);
        let mut wm = session("@get-time please");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "noon (please)");
        assert!(!out.return_direct);
        assert_eq!(
            out.intermediate_steps,
            vec![IntermediateStep::new("get-time", Some("please".into()), "noon (please)")]
        );
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn instant_trigger_keeps_direct_tools_direct() {
        let snap = snapshot_with(
            vec![HookRegistration::new(
                HookSlot::InstantToolTrigger,
                1,
                "trigger",
                hook_fn(|_, _| Ok(json!("@{name}"))),
            )],
            vec![get_time(true)],
        );
        let llm = ScriptedLlm::new(vec![]);
        let mut wm = session("@get-time");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "noon");
        assert!(out.return_direct);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn instant_trigger_off_by_config() {
        let snap = snapshot_with(
            vec![HookRegistration::new(
                HookSlot::InstantToolTrigger,
                1,
                "t",
                hook_fn(|_, _| Ok(json!("@{name}"))),
            )],
            vec![get_time(false)],
        );
        let llm = ScriptedLlm::new(vec![Ok("chatting".into())]);
        let config = AgentConfig { instant_tool_trigger: false, ..AgentConfig::default() };
        let out = AgentOrchestrator::new(config)
            .decide(&snap, &llm, &mut session("@get-time please"))
            .await
            .unwrap();
        assert_eq!(out.output, "chatting");
    }

    #[tokio::test]
    async fn fast_reply_short_circuits() {
        let snap = snapshot_with(
            vec![HookRegistration::new(
                HookSlot::AgentFastReply,
                1,
                "cache",
                hook_fn(|_, _| Ok(json!("cached"))),
            )],
            vec![],
        );
        let llm = ScriptedLlm::new(vec![]);
        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut session("hi"))
            .await
            .unwrap();
        assert_eq!(out, AgentOutput::text("cached"));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn final_answer_with_null_input_falls_back() {
        let snap = snapshot_with(vec![], vec![get_time(false)]);
        let llm = ScriptedLlm::new(vec![
            Ok(r#"{"action": "final_answer", "action_input": null}"#.into()),
            Ok("Hello there".into()),
        ]);
        let mut wm = session("hey");
        recalled(&mut wm, "get-time");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "Hello there");
        assert!(!out.return_direct);
        assert!(out.intermediate_steps.is_empty());
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn tool_observation_reaches_the_conversational_prompt() {
        let snap = snapshot_with(vec![], vec![get_time(false)]);
        let llm = ScriptedLlm::new(vec![
            Ok(r#"```json
{"action": "get-time", "action_input": null}
```"#
                .into()),
            Ok(r#"{"action": "final_answer", "action_input": null}"#.into()),
            Ok("It is noon.".into()),
        ]);
        let mut wm = session("what time is it?");
        recalled(&mut wm, "get-time");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "It is noon.");
        assert_eq!(out.intermediate_steps.len(), 1);
        let requests = llm.requests();
        assert!(requests[1].user_prompt.contains(r#"{"action_output":"noon"}"#));
        assert!(requests[2].system_prompt.contains(" - get-time: noon"));
    }

    #[tokio::test]
    async fn direct_tool_returns_its_observation() {
        let snap = snapshot_with(vec![], vec![get_time(true)]);
        let llm =
            ScriptedLlm::new(vec![Ok(r#"{"action": "get-time", "action_input": "Rome"}"#.into())]);
        let mut wm = session("time in Rome?");
        recalled(&mut wm, "get-time");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "noon (Rome)");
        assert!(out.return_direct);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn iteration_cap_bounds_the_chain() {
        let snap = snapshot_with(vec![], vec![get_time(false)]);
        let step = r#"{"action": "get-time", "action_input": null}"#;
        let mut script: Vec<Result<String, String>> =
            (0..2).map(|_| Ok(step.to_string())).collect();
        script.push(Ok("done".into()));
        let llm = ScriptedLlm::new(script);
        let mut wm = session("loop");
        recalled(&mut wm, "get-time");

        let config = AgentConfig { max_iterations: 2, ..AgentConfig::default() };
        let out = AgentOrchestrator::new(config).decide(&snap, &llm, &mut wm).await.unwrap();
        assert_eq!(out.intermediate_steps.len(), 2);
        assert_eq!(out.output, "done");
        assert_eq!(llm.calls(), 3);
    }

    #[tokio::test]
    async fn selection_failure_falls_back() {
        let snap = snapshot_with(vec![], vec![get_time(false)]);
        let llm = ScriptedLlm::new(vec![
            Ok("I refuse to answer in JSON".into()),
            Ok("plain answer".into()),
        ]);
        let mut wm = session("hey");
        recalled(&mut wm, "get-time");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "plain answer");
    }

    #[tokio::test]
    async fn disallowed_tools_skip_the_chain() {
        let snap = snapshot_with(
            vec![HookRegistration::new(
                HookSlot::AllowedTools,
                1,
                "deny",
                hook_fn(|_, _| Ok(json!([]))),
            )],
            vec![get_time(false)],
        );
        let llm = ScriptedLlm::new(vec![Ok("just chatting".into())]);
        let mut wm = session("what time is it?");
        recalled(&mut wm, "get-time");

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "just chatting");
        assert_eq!(llm.calls(), 1);
    }

    #[derive(Debug)]
    struct CountingForm {
        state: FormState,
        turns: usize,
    }

    #[async_trait]
    impl FormSession for CountingForm {
        fn name(&self) -> &str {
            "survey"
        }
        fn state(&self) -> FormState {
            self.state
        }
        async fn next(
            &mut self,
            _session: &mut WorkingMemory,
            _llm: &dyn LlmProvider,
        ) -> Result<String> {
            self.turns += 1;
            Ok(format!("question {}", self.turns))
        }
        fn reset(&mut self) {
            self.state = FormState::Incomplete;
            self.turns = 0;
        }
    }

    #[tokio::test]
    async fn active_form_answers_and_stays_attached() {
        let snap = snapshot_with(vec![], vec![]);
        let llm = ScriptedLlm::new(vec![]);
        let mut wm = session("my answer");
        wm.active_form = Some(Box::new(CountingForm { state: FormState::Incomplete, turns: 0 }));

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "question 1");
        assert!(out.return_direct);
        assert_eq!(out.intermediate_steps[0].procedure, "survey");
        assert!(wm.active_form.is_some());
    }

    #[tokio::test]
    async fn closed_form_is_dropped_and_the_turn_continues() {
        let snap = snapshot_with(vec![], vec![]);
        let llm = ScriptedLlm::new(vec![Ok("back to chat".into())]);
        let mut wm = session("thanks");
        wm.active_form = Some(Box::new(CountingForm { state: FormState::Closed, turns: 3 }));

        let out = AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(out.output, "back to chat");
        assert!(wm.active_form.is_none());
    }

    #[tokio::test]
    async fn selected_form_confirms_submits_once_and_detaches() {
        let submits = Arc::new(AtomicUsize::new(0));
        let counter = submits.clone();
        let form = FormDefinition::new(
            "pizza_order",
            "order a pizza",
            Schema::new().field("pizza_type", FieldSpec::new(FieldKind::String, "kind of pizza")),
            submit_fn(move |model, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("ordered {}", model["pizza_type"].as_str().unwrap_or_default()))
            }),
        )
        .ask_confirm(true);
        let snap = snapshot_with_forms(vec![], vec![], vec![form]);
        let llm = ScriptedLlm::new(vec![
            // turn 1: selection, exit check, extraction
            Ok(r#"{"action": "pizza_order", "action_input": null}"#.into()),
            Ok(r#"{"exit": false}"#.into()),
            Ok(r#"{"pizza_type": "margherita"}"#.into()),
            // turn 2: exit check, confirmation
            Ok(r#"{"exit": false}"#.into()),
            Ok(r#"{"confirm": true}"#.into()),
            // turn 3: selection declines, conversational reply
            Ok(r#"{"action": "none_of_the_others", "action_input": null}"#.into()),
            Ok("anything else?".into()),
        ]);
        let orchestrator = AgentOrchestrator::new(AgentConfig::default());
        let mut wm = session("I want a margherita");
        recalled(&mut wm, "pizza_order");

        let out = orchestrator.decide(&snap, &llm, &mut wm).await.unwrap();
        assert!(out.return_direct);
        assert!(out.output.contains("Confirm? Yes or no?"));
        assert_eq!(out.intermediate_steps[0].procedure, "pizza_order");
        assert_eq!(wm.active_form.as_ref().map(|f| f.state()), Some(FormState::WaitConfirm));
        assert_eq!(submits.load(Ordering::SeqCst), 0);

        wm.user_message = Some("yes".into());
        let out = orchestrator.decide(&snap, &llm, &mut wm).await.unwrap();
        assert!(out.return_direct);
        assert_eq!(out.output, "ordered margherita");
        assert_eq!(submits.load(Ordering::SeqCst), 1);

        wm.user_message = Some("thanks".into());
        let out = orchestrator.decide(&snap, &llm, &mut wm).await.unwrap();
        assert_eq!(out.output, "anything else?");
        assert!(!out.return_direct);
        assert!(wm.active_form.is_none());
        assert_eq!(submits.load(Ordering::SeqCst), 1);
        assert_eq!(llm.calls(), 7);
    }

    #[tokio::test]
    async fn failures_become_an_apology() {
        let snap = snapshot_with(vec![], vec![]);
        let llm = ScriptedLlm::new(vec![Err("provider down".into())]);
        let out = AgentOrchestrator::new(AgentConfig::default())
            .run_turn(&snap, &llm, &mut session("hi"))
            .await;
        assert_eq!(out, AgentOutput::text(APOLOGY));
    }

    #[tokio::test]
    async fn tokens_are_streamed_to_the_session() {
        let snap = snapshot_with(vec![], vec![]);
        let llm = ScriptedLlm::new(vec![Ok("streamed".into())]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut wm = session("hi").with_outbound(tx);

        AgentOrchestrator::new(AgentConfig::default())
            .decide(&snap, &llm, &mut wm)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(hearth_core::OutboundEvent::Token("streamed".into())));
    }

    #[test]
    fn fast_reply_shapes() {
        assert_eq!(fast_reply(Value::Null), None);
        assert_eq!(fast_reply(json!("x")), Some(AgentOutput::text("x")));
        let full = fast_reply(json!({ "output": "y", "return_direct": true })).unwrap();
        assert!(full.return_direct);
        assert_eq!(fast_reply(json!(42)), None);
    }
}
