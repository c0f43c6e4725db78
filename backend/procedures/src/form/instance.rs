use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use hearth_core::{FormSession, FormState, HearthError, LlmProvider, LlmRequest, WorkingMemory};
use hearth_logging::{AgentEvent, EventLogger};

use super::prompts;
use super::FormDefinition;

/// Extracted values that mean "the model did not find anything".
const NULL_LIKE: &[&str] = &["", "None", "null", "lower-case", "unknown", "missing"];

/// Conversation turns shown to the extraction prompt.
const EXTRACTION_HISTORY_TURNS: usize = 10;

/// One user's run through a form.
pub struct FormInstance {
    definition: Arc<FormDefinition>,
    state: FormState,
    model: Map<String, Value>,
    /// Invalid-field messages from the latest validation.
    errors: Vec<String>,
    /// Required fields absent at the latest validation.
    missing_fields: Vec<String>,
}

impl fmt::Debug for FormInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormInstance")
            .field("form", &self.definition.name)
            .field("state", &self.state)
            .field("model", &self.model)
            .field("missing_fields", &self.missing_fields)
            .finish()
    }
}

impl FormInstance {
    pub fn new(definition: Arc<FormDefinition>) -> Self {
        Self {
            definition,
            state: FormState::Incomplete,
            model: Map::new(),
            errors: Vec::new(),
            missing_fields: Vec::new(),
        }
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn model(&self) -> &Map<String, Value> {
        &self.model
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn missing_fields(&self) -> &[String] {
        &self.missing_fields
    }

    fn transition(&mut self, session: &WorkingMemory, to: FormState) {
        if self.state == to {
            return;
        }
        EventLogger::log_event(
            &session.user_id,
            AgentEvent::FormTransition {
                form: self.definition.name.clone(),
                from: self.state.to_string(),
                to: to.to_string(),
            },
        );
        self.state = to;
    }

    async fn ask(&self, llm: &dyn LlmProvider, prompt: String) -> Result<String> {
        let response = llm.complete(&LlmRequest::new(prompt)).await?;
        Ok(response.content)
    }

    async fn wants_exit(&self, message: &str, llm: &dyn LlmProvider) -> Result<bool> {
        let prompt = prompts::exit_intent_prompt(
            &self.definition.stop_examples,
            &self.definition.start_examples,
            message,
        );
        Ok(prompts::parse_flag(&self.ask(llm, prompt).await?, "exit"))
    }

    async fn confirmed(&self, message: &str, llm: &dyn LlmProvider) -> Result<bool> {
        let prompt = prompts::confirm_prompt(&self.model, message);
        Ok(prompts::parse_flag(&self.ask(llm, prompt).await?, "confirm"))
    }

    fn conversation(session: &WorkingMemory) -> String {
        let mut text = session.stringify_history(EXTRACTION_HISTORY_TURNS);
        let current = session.user_text();
        let already_recorded = session.history.last().is_some_and(|t| t.text == current);
        if !current.is_empty() && !already_recorded {
            text.push_str(&format!("\n - Human: {current}"));
        }
        text
    }

    async fn extract(
        &self,
        session: &WorkingMemory,
        llm: &dyn LlmProvider,
    ) -> Result<Map<String, Value>, HearthError> {
        let conversation = Self::conversation(session);
        let prompt =
            prompts::extraction_prompt(&self.definition.schema, &self.model, &conversation);
        let raw = self
            .ask(llm, prompt)
            .await
            .map_err(|e| HearthError::FormExtraction(e.to_string()))?;
        prompts::parse_json_object(&raw)
            .ok_or_else(|| {
                HearthError::FormExtraction(format!("no JSON object in completion: {raw}"))
            })
    }

    /// Drop keys whose value is null or one of the null-like placeholders.
    fn sanitize(model: &mut Map<String, Value>) {
        model.retain(|_, v| match v {
            Value::Null => false,
            Value::String(s) => !NULL_LIKE.contains(&s.trim()),
            _ => true,
        });
    }

    /// Extract, merge, sanitize and validate. Moves to `Complete` when the model
    /// passes validation.
    async fn update(&mut self, session: &WorkingMemory, llm: &dyn LlmProvider) {
        let extracted = match self.extract(session, llm).await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    form = %self.definition.name,
                    error = %e,
                    "[Forms] extraction failed; keeping current model"
                );
                Map::new()
            }
        };

        for (key, value) in extracted {
            self.model.insert(key, value);
        }
        Self::sanitize(&mut self.model);

        self.errors.clear();
        self.missing_fields.clear();
        match self.definition.schema.validate(&self.model) {
            Ok(valid) => {
                self.model = valid;
                self.transition(session, FormState::Complete);
            }
            Err(field_errors) => {
                for err in field_errors {
                    if err.missing {
                        self.missing_fields.push(err.field);
                    } else {
                        self.model.remove(&err.field);
                        self.errors.push(format!("{}: {}", err.field, err.message));
                    }
                }
                debug!(
                    form = %self.definition.name,
                    missing = ?self.missing_fields,
                    invalid = self.errors.len(),
                    "[Forms] model incomplete"
                );
            }
        }
    }

    async fn submit(&mut self, session: &mut WorkingMemory) -> Result<String> {
        self.transition(session, FormState::Closed);
        self.definition.run_submit(&self.model, session).await
    }

    /// Status text for the current state.
    pub fn message(&self) -> String {
        let model = serde_json::to_string_pretty(&self.model).unwrap_or_default();
        match self.state {
            FormState::Closed => format!("Form {} closed", self.definition.name),
            FormState::WaitConfirm => format!(
                "Your {}:\n```json\n{model}\n```\nConfirm? Yes or no?",
                self.definition.name
            ),
            FormState::Incomplete | FormState::Complete => {
                let mut out = format!("Info until now:\n```json\n{model}\n```");
                for field in &self.missing_fields {
                    out.push_str(&format!("\n - {field}: (missing)"));
                }
                for err in &self.errors {
                    out.push_str(&format!("\n - {err}"));
                }
                out
            }
        }
    }
}

#[async_trait]
impl FormSession for FormInstance {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn state(&self) -> FormState {
        self.state
    }

    async fn next(&mut self, session: &mut WorkingMemory, llm: &dyn LlmProvider) -> Result<String> {
        let message = session.user_text().to_string();

        if self.wants_exit(&message, llm).await? {
            self.transition(session, FormState::Closed);
            return Ok(self.message());
        }

        if self.state == FormState::WaitConfirm {
            if self.confirmed(&message, llm).await? {
                return self.submit(session).await;
            }
            self.transition(session, FormState::Incomplete);
        }

        if self.state == FormState::Incomplete {
            self.update(session, llm).await;
        }

        if self.state == FormState::Complete {
            if self.definition.ask_confirm {
                self.transition(session, FormState::WaitConfirm);
            } else {
                return self.submit(session).await;
            }
        }

        Ok(self.message())
    }

    fn reset(&mut self) {
        self.state = FormState::Incomplete;
        self.model.clear();
        self.errors.clear();
        self.missing_fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{submit_fn, TemplateSubmit};
    use crate::schema::{FieldKind, FieldSpec, Schema};
    use hearth_core::LlmResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers prompts by their leading sentence: exit and confirm checks get
    /// fixed answers, extraction prompts pop the next scripted completion.
    struct ScriptedLlm {
        exit: bool,
        confirm: Mutex<VecDeque<bool>>,
        extractions: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(extractions: &[&str]) -> Self {
            Self {
                exit: false,
                confirm: Mutex::new(VecDeque::new()),
                extractions: Mutex::new(extractions.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            let prompt = request.user_prompt.clone();
            self.prompts.lock().unwrap().push(prompt.clone());
            let content = if prompt.contains("wants to exit") {
                format!("{{\"exit\": {}}}", self.exit)
            } else if prompt.contains("is confirming") {
                let answer = self.confirm.lock().unwrap().pop_front().unwrap_or(false);
                format!("{{\"confirm\": {answer}}}")
            } else {
                self.extractions.lock().unwrap().pop_front().unwrap_or_default()
            };
            Ok(LlmResponse { content, ..Default::default() })
        }
    }

    fn pizza_form(ask_confirm: bool) -> Arc<FormDefinition> {
        let schema = Schema::new()
            .field("pizza_type", FieldSpec::new(FieldKind::String, "kind of pizza"))
            .field("address", FieldSpec::new(FieldKind::String, "delivery address"));
        Arc::new(
            FormDefinition::new(
                "pizza_order",
                "order a pizza",
                schema,
                Arc::new(TemplateSubmit::new(Some("Ordered {pizza_type} to {address}".into()))),
            )
            .ask_confirm(ask_confirm),
        )
    }

    fn turn(wm: &mut WorkingMemory, text: &str) {
        wm.user_message = Some(text.to_string());
    }

    #[tokio::test]
    async fn incomplete_then_complete_with_confirmation() {
        let llm = ScriptedLlm::new(&[
            r#"{"pizza_type": "margherita", "address": "unknown"}"#,
            r#"{"address": "Via Roma 1"}"#,
        ]);
        llm.confirm.lock().unwrap().push_back(true);
        let submits = Arc::new(AtomicUsize::new(0));
        let counter = submits.clone();
        let def = Arc::new(
            FormDefinition::new(
                "pizza_order",
                "order a pizza",
                pizza_form(true).schema.clone(),
                submit_fn(move |model, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let field = |k: &str| model[k].as_str().unwrap_or_default().to_string();
                    Ok(format!("Ordered {} to {}", field("pizza_type"), field("address")))
                }),
            )
            .ask_confirm(true),
        );
        let mut form = def.instantiate();
        let mut wm = WorkingMemory::new("alice");

        turn(&mut wm, "a margherita please");
        let reply = form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::Incomplete);
        assert_eq!(form.missing_fields(), ["address".to_string()]);
        assert!(!form.model().contains_key("address"));
        assert!(reply.contains("address: (missing)"));

        turn(&mut wm, "Via Roma 1");
        let reply = form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::WaitConfirm);
        assert!(reply.contains("Confirm? Yes or no?"));

        turn(&mut wm, "yes");
        let reply = form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::Closed);
        assert_eq!(reply, "Ordered margherita to Via Roma 1");
        assert_eq!(submits.load(Ordering::SeqCst), 1);

        // a closed form never submits again
        turn(&mut wm, "yes");
        let reply = form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::Closed);
        assert_eq!(reply, "Form pizza_order closed");
        assert_eq!(submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn complete_without_confirmation_submits_immediately() {
        let llm = ScriptedLlm::new(&[r#"{"pizza_type": "diavola", "address": "Main St 3"}"#]);
        let mut form = pizza_form(false).instantiate();
        let mut wm = WorkingMemory::new("bob");
        turn(&mut wm, "diavola to Main St 3");
        let reply = form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::Closed);
        assert_eq!(reply, "Ordered diavola to Main St 3");
    }

    #[tokio::test]
    async fn rejected_confirmation_reextracts_in_same_turn() {
        let llm = ScriptedLlm::new(&[
            r#"{"pizza_type": "margherita", "address": "Via Roma 1"}"#,
            r#"{"pizza_type": "marinara"}"#,
        ]);
        llm.confirm.lock().unwrap().push_back(false);
        let mut form = pizza_form(true).instantiate();
        let mut wm = WorkingMemory::new("carol");

        turn(&mut wm, "margherita to Via Roma 1");
        form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::WaitConfirm);

        turn(&mut wm, "no, make it a marinara");
        form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::WaitConfirm);
        assert_eq!(form.model()["pizza_type"], "marinara");
    }

    #[tokio::test]
    async fn exit_intent_closes_from_any_state() {
        let mut llm = ScriptedLlm::new(&[]);
        llm.exit = true;
        let mut form = pizza_form(true).instantiate();
        let mut wm = WorkingMemory::new("dave");
        turn(&mut wm, "forget it");
        let reply = form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::Closed);
        assert_eq!(reply, "Form pizza_order closed");
        // exit check is the only prompt sent
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_extraction_keeps_model() {
        let llm =
            ScriptedLlm::new(&[r#"{"pizza_type": "margherita"}"#, "I could not find anything."]);
        let mut form = pizza_form(false).instantiate();
        let mut wm = WorkingMemory::new("erin");
        turn(&mut wm, "margherita");
        form.next(&mut wm, &llm).await.unwrap();
        turn(&mut wm, "hmm");
        form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.state(), FormState::Incomplete);
        assert_eq!(form.model()["pizza_type"], "margherita");
    }

    #[tokio::test]
    async fn missing_fields_do_not_accumulate() {
        let llm = ScriptedLlm::new(&["{}", "{}"]);
        let mut form = pizza_form(false).instantiate();
        let mut wm = WorkingMemory::new("frank");
        turn(&mut wm, "hello");
        form.next(&mut wm, &llm).await.unwrap();
        form.next(&mut wm, &llm).await.unwrap();
        assert_eq!(form.missing_fields(), ["address".to_string(), "pizza_type".to_string()]);
    }

    #[tokio::test]
    async fn null_like_values_are_sanitized() {
        let llm =
            ScriptedLlm::new(&[r#"{"pizza_type": "None", "address": "missing", "extra": null}"#]);
        let mut form = pizza_form(false).instantiate();
        let mut wm = WorkingMemory::new("gina");
        turn(&mut wm, "hi");
        form.next(&mut wm, &llm).await.unwrap();
        assert!(form.model().is_empty());
        assert_eq!(form.missing_fields().len(), 2);
    }

    #[tokio::test]
    async fn extraction_prompt_includes_current_message() {
        let llm = ScriptedLlm::new(&["{}"]);
        let mut form = pizza_form(false).instantiate();
        let mut wm = WorkingMemory::new("hal");
        wm.push_human("I am hungry");
        wm.push_ai("Want a pizza?");
        turn(&mut wm, "deliver to Elm St 9");
        form.next(&mut wm, &llm).await.unwrap();
        let prompts = llm.prompts.lock().unwrap();
        let extraction = prompts.iter().find(|p| p.contains("fill up a JSON")).unwrap();
        assert!(extraction.contains(" - Human: I am hungry"));
        assert!(extraction.contains(" - Human: deliver to Elm St 9"));
    }

    #[tokio::test]
    async fn submit_handler_sees_session() {
        let schema = Schema::new().field("item", FieldSpec::new(FieldKind::String, ""));
        let def = Arc::new(FormDefinition::new(
            "wishlist",
            "",
            schema,
            submit_fn(|model, session| {
                session.push_ai("noted");
                Ok(format!("added {}", model["item"]))
            }),
        ));
        let llm = ScriptedLlm::new(&[r#"{"item": "bike"}"#]);
        let mut form = def.instantiate();
        let mut wm = WorkingMemory::new("ivy");
        turn(&mut wm, "I want a bike");
        assert_eq!(form.next(&mut wm, &llm).await.unwrap(), "added \"bike\"");
        assert_eq!(wm.history.len(), 1);
    }

    #[test]
    fn reset_returns_to_incomplete() {
        let mut form = pizza_form(true).instantiate();
        form.model.insert("pizza_type".into(), Value::from("x"));
        form.state = FormState::WaitConfirm;
        form.reset();
        assert_eq!(form.state(), FormState::Incomplete);
        assert!(form.model().is_empty());
    }
}
