//! Procedure selection chain.
//!
//! Offers the recalled, active and allowed procedures to the LLM and asks it
//! for one JSON action at a time. Tools are invoked and their observation fed
//! back through the scratchpad; a form is attached to the session and advanced
//! once. The loop ends on `final_answer`, `none_of_the_others`, a direct tool,
//! a form, or after `max_iterations` rounds.

use rand::seq::SliceRandom;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use hearth_core::{FormSession, HearthError, HearthResult, LlmProvider, LlmRequest, WorkingMemory};
use hearth_hooks::HookSlot;
use hearth_plugins::RuntimeSnapshot;
use hearth_procedures::form::prompts::parse_json_object;
use hearth_procedures::{Procedure, ProcedureSet, normalize_name};

use crate::output::{AgentOutput, IntermediateStep};
use crate::prompts::{DEFAULT_INSTRUCTIONS, FINAL_ANSWER, NONE_OF_THE_OTHERS, selection_prompt};

/// One decision of the LLM.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub input: Option<String>,
}

/// Read `{"action": .., "action_input": ..}` out of a completion.
pub fn parse_action(text: &str) -> HearthResult<Action> {
    let map = parse_json_object(text)
        .ok_or_else(|| HearthError::ProcedureSelection(format!("no JSON action in: {text}")))?;
    let name = map
        .get("action")
        .and_then(Value::as_str)
        .map(normalize_name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| HearthError::ProcedureSelection("JSON action without \"action\"".into()))?;
    let input = match map.get("action_input") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };
    Ok(Action { name, input })
}

/// Names of the procedures the chain may pick: recalled, active, then filtered
/// by `allowed_tools`. Order follows recall ranking.
pub async fn candidates(
    snapshot: &RuntimeSnapshot,
    session: &mut WorkingMemory,
) -> HearthResult<Vec<String>> {
    let mut recalled: Vec<String> = Vec::new();
    for hit in &session.procedural_memories {
        if let Some(name) = hit.procedure_name() {
            if snapshot.procedures.contains(name) && !recalled.iter().any(|n| n == name) {
                recalled.push(name.to_string());
            }
        }
    }
    if recalled.is_empty() {
        return Ok(recalled);
    }
    let allowed: Vec<String> = snapshot
        .hooks
        .execute_as(HookSlot::AllowedTools, recalled.clone(), Some(session))
        .await?;
    Ok(recalled.into_iter().filter(|n| allowed.contains(n)).collect())
}

fn describe(procedures: &ProcedureSet, names: &[String]) -> (String, String, String) {
    let offered: Vec<&dyn Procedure> = procedures
        .iter()
        .filter(|p| names.iter().any(|n| n == p.name()))
        .collect();

    let tools = offered
        .iter()
        .map(|p| format!("- \"{}\": {}", p.name(), p.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let tool_names = offered
        .iter()
        .map(|p| format!("\"{}\"", p.name()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut rng = rand::thread_rng();
    let examples: String = offered
        .iter()
        .filter_map(|p| p.start_examples().choose(&mut rng).map(|ex| (p.name(), ex)))
        .map(|(name, example)| {
            format!(
                "\nQuestion: {example}\n```json\n{{\n    \"action\": \"{name}\",\n    \"action_input\": \"...input here...\"\n}}\n```\n"
            )
        })
        .collect();
    let examples = if examples.is_empty() {
        examples
    } else {
        format!("## Here some examples:\n{examples}")
    };
    (tools, tool_names, examples)
}

fn scratchpad_entry(action: &Action, observation: &str) -> String {
    format!(
        "\n```json\n{}\n```\n```json\n{}\n```",
        json!({ "action": action.name, "action_input": action.input }),
        json!({ "action_output": observation }),
    )
}

pub struct SelectionChain<'a> {
    pub snapshot: &'a RuntimeSnapshot,
    pub llm: &'a dyn LlmProvider,
    pub max_iterations: usize,
    pub history_turns: usize,
}

impl SelectionChain<'_> {
    /// Run the chain. An empty candidate set yields an empty, non-direct output.
    pub async fn run(&self, session: &mut WorkingMemory) -> HearthResult<AgentOutput> {
        let names = candidates(self.snapshot, session).await?;
        if names.is_empty() {
            debug!("[Agent] no procedure candidates");
            return Ok(AgentOutput::default());
        }
        info!(candidates = ?names, "[Agent] running procedure selection");

        let hooks = &self.snapshot.hooks;
        let procedures = &self.snapshot.procedures;
        let (tools, tool_names, examples) = describe(procedures, &names);
        let instructions: String = hooks
            .execute_as(
                HookSlot::AgentPromptInstructions,
                DEFAULT_INSTRUCTIONS.to_string(),
                Some(&mut *session),
            )
            .await?;
        let system = instructions
            .replace("{tools}", &tools)
            .replace("{tool_names}", &tool_names)
            .replace("{examples}", &examples);

        let history = session.stringify_history(self.history_turns);
        let input = session.user_text().to_string();
        let mut scratchpad = String::new();
        let mut steps = Vec::new();

        for iteration in 0..self.max_iterations {
            let request = LlmRequest::new(selection_prompt(&history, &input, &scratchpad))
                .with_system(system.clone());
            let response = self
                .llm
                .complete(&request)
                .await
                .map_err(|e| HearthError::ProcedureSelection(format!("LLM failed: {e:#}")))?;
            let action = parse_action(&response.content)?;
            debug!(iteration, action = %action.name, "[Agent] selection step");

            match action.name.as_str() {
                FINAL_ANSWER => {
                    return Ok(AgentOutput {
                        output: action.input.unwrap_or_default(),
                        return_direct: false,
                        intermediate_steps: steps,
                    });
                }
                NONE_OF_THE_OTHERS => {
                    return Ok(AgentOutput {
                        intermediate_steps: steps,
                        ..AgentOutput::default()
                    });
                }
                name if !names.iter().any(|n| n == name) => {
                    return Err(HearthError::ProcedureSelection(format!(
                        "action '{name}' was not offered"
                    )));
                }
                _ => {}
            }

            if let Some(form) = procedures.form(&action.name) {
                let mut instance = form.instantiate();
                let reply = instance
                    .next(session, self.llm)
                    .await
                    .map_err(|e| {
                        HearthError::ProcedureSelection(format!("form '{}': {e:#}", action.name))
                    })?;
                session.active_form = Some(Box::new(instance));
                steps.push(IntermediateStep::new(&action.name, action.input, reply.clone()));
                return Ok(AgentOutput::direct(reply, steps));
            }

            let Some(tool) = procedures.tool(&action.name) else {
                return Err(HearthError::ProcedureSelection(format!(
                    "'{}' is not a procedure",
                    action.name
                )));
            };
            let observation = tool
                .call(action.input.clone(), Some(&mut *session))
                .await
                .map_err(|e| {
                    HearthError::ProcedureSelection(format!("tool '{}': {e}", action.name))
                })?;
            scratchpad.push_str(&scratchpad_entry(&action, &observation));
            steps.push(IntermediateStep::new(&action.name, action.input, observation.clone()));
            if tool.direct {
                return Ok(AgentOutput::direct(observation, steps));
            }
        }

        warn!(max = self.max_iterations, "[Agent] selection hit the iteration cap");
        Ok(AgentOutput {
            intermediate_steps: steps,
            ..AgentOutput::default()
        })
    }
}
