//! Prompts the form state machine sends to the LLM, and lenient parsing of the
//! JSON it gets back.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::schema::Schema;

static BARE_TRUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btrue\b").unwrap());

/// Utterances that always count as wanting to leave a form.
const DEFAULT_STOP_EXAMPLES: &[&str] = &["stop", "cancel", "I don't want to continue", "forget it"];
const DEFAULT_CONTINUE_EXAMPLES: &[&str] =
    &["yes", "sure", "my address is Via Roma 1", "two please"];

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.map(|e| format!("\n- {e}")).collect()
}

pub fn exit_intent_prompt(
    stop_examples: &[String],
    start_examples: &[String],
    message: &str,
) -> String {
    let stop = bullet_list(
        DEFAULT_STOP_EXAMPLES
            .iter()
            .copied()
            .chain(stop_examples.iter().map(String::as_str)),
    );
    let go_on = bullet_list(
        DEFAULT_CONTINUE_EXAMPLES
            .iter()
            .copied()
            .chain(start_examples.iter().map(String::as_str)),
    );
    format!(
        "Your task is to produce a JSON representing whether a user wants to exit or not.\n\
         JSON must be in this format:\n\
         ```json\n{{\n\t\"exit\": // type boolean, must be `true` or `false`\n}}\n```\n\n\
         Examples where {{\"exit\": true}}:{stop}\n\n\
         Examples where {{\"exit\": false}}:{go_on}\n\n\
         User said \"{message}\"\n\n\
         JSON:\n"
    )
}

pub fn confirm_prompt(model: &Map<String, Value>, message: &str) -> String {
    let model = serde_json::to_string(model).unwrap_or_default();
    format!(
        "Your task is to produce a JSON representing whether a user is confirming or not.\n\
         JSON must be in this format:\n\
         ```json\n{{\n\t\"confirm\": // type boolean, must be `true` or `false`\n}}\n```\n\n\
         The user was shown this data and asked to confirm it: {model}\n\n\
         Examples where {{\"confirm\": true}}:\n- yes\n- correct\n- go ahead\n\n\
         Examples where {{\"confirm\": false}}:\n- no\n- wait, change the size\n- not yet\n\n\
         User said \"{message}\"\n\n\
         JSON:\n"
    )
}

pub fn extraction_prompt(
    schema: &Schema,
    model: &Map<String, Value>,
    conversation: &str,
) -> String {
    let fields = schema.describe();
    let model = serde_json::to_string(model).unwrap_or_default();
    format!(
        "Your task is to fill up a JSON out of a conversation.\n\
         The JSON must have this format:\n\
         ```json\n{{\n{fields}\n}}\n```\n\n\
         This is the current JSON:\n\
         ```json\n{model}\n```\n\n\
         This is the conversation:\n{conversation}\n\n\
         Updated JSON:\n"
    )
}

/// Pull the first JSON object out of a completion, tolerating code fences and
/// chatter around it.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Read a boolean flag from a completion. Falls back to looking for the bare
/// word `true` when the JSON is malformed.
pub fn parse_flag(text: &str, key: &str) -> bool {
    match parse_json_object(text).and_then(|m| m.get(key).cloned()) {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(_) => false,
        None => BARE_TRUE.is_match(text),
    }
}
