//! Field schemas.
//!
//! A `Schema` maps field names to typed field specs. Forms use it to validate the
//! model extracted from the conversation; plugins use it to describe and default
//! their settings.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

static LIST_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[,;]\s*").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// One of `options`.
    Select,
    /// A list of strings. A comma separated string is accepted too.
    List,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Select => "select",
            Self::List => "list",
        };
        f.write_str(s)
    }
}

fn default_true() -> bool {
    true
}

/// Declaration of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default = "default_kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    // Constraints. Each applies only to the kinds it makes sense for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

fn default_kind() -> FieldKind {
    FieldKind::String
}

impl FieldSpec {
    pub fn new(kind: FieldKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            required: true,
            default: None,
            options: Vec::new(),
            min: None,
            max: None,
            pattern: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Coerce a raw value into this field's kind, checking constraints.
    pub fn coerce(&self, raw: &Value) -> Result<Value, String> {
        let value = match self.kind {
            FieldKind::String => Value::String(coerce_string(raw)?),
            FieldKind::Integer => Value::Number(coerce_integer(raw)?.into()),
            FieldKind::Number => {
                let n = coerce_number(raw)?;
                Value::Number(Number::from_f64(n).ok_or("not a finite number")?)
            }
            FieldKind::Boolean => Value::Bool(coerce_bool(raw)?),
            FieldKind::Select => Value::String(self.coerce_select(raw)?),
            FieldKind::List => {
                Value::Array(coerce_list(raw)?.into_iter().map(Value::String).collect())
            }
        };
        self.check_constraints(&value)?;
        Ok(value)
    }

    fn coerce_select(&self, raw: &Value) -> Result<String, String> {
        let given = coerce_string(raw)?;
        self.options
            .iter()
            .find(|opt| opt.eq_ignore_ascii_case(given.trim()))
            .cloned()
            .ok_or_else(|| format!("must be one of: {}", self.options.join(", ")))
    }

    fn check_constraints(&self, value: &Value) -> Result<(), String> {
        let magnitude = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if self.kind == FieldKind::String => Some(s.chars().count() as f64),
            Value::Array(items) => Some(items.len() as f64),
            _ => None,
        };
        if let Some(m) = magnitude {
            if let Some(min) = self.min {
                if m < min {
                    return Err(format!("must be at least {min}"));
                }
            }
            if let Some(max) = self.max {
                if m > max {
                    return Err(format!("must be at most {max}"));
                }
            }
        }
        if let (Some(pattern), Value::String(s)) = (&self.pattern, value) {
            let re = Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            if !re.is_match(s) {
                return Err(format!("does not match pattern {pattern}"));
            }
        }
        Ok(())
    }
}

fn coerce_string(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected text, got {}", kind_name(other))),
    }
}

fn coerce_integer(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| format!("expected an integer, got {n}")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got '{s}'")),
        other => Err(format!("expected an integer, got {}", kind_name(other))),
    }
}

fn coerce_number(raw: &Value) -> Result<f64, String> {
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("expected a number, got {n}")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("expected a number, got '{s}'")),
        other => Err(format!("expected a number, got {}", kind_name(other))),
    }
}

fn coerce_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true),
            "false" | "no" | "n" | "0" => Ok(false),
            _ => Err(format!("expected yes or no, got '{s}'")),
        },
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        other => Err(format!("expected a boolean, got {}", kind_name(other))),
    }
}

fn coerce_list(raw: &Value) -> Result<Vec<String>, String> {
    match raw {
        Value::Array(items) => items.iter().map(coerce_string).collect(),
        Value::String(s) => Ok(LIST_SPLIT
            .split(s.trim())
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()),
        other => Err(format!("expected a list, got {}", kind_name(other))),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// A validation problem on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    /// The field is required and absent, as opposed to present but invalid.
    pub missing: bool,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Add every field of `other`, replacing same-named ones.
    pub fn extend(&mut self, other: Schema) {
        self.fields.extend(other.fields);
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Values of every field that declares a default.
    pub fn defaults(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|(name, spec)| spec.default.clone().map(|d| (name.clone(), d)))
            .collect()
    }

    /// Validate `model` against the schema.
    ///
    /// On success returns the coerced model: only declared fields, each converted to
    /// its kind, with defaults filled in for absent fields. On failure returns every
    /// problem found, missing and invalid fields alike.
    pub fn validate(
        &self,
        model: &Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<FieldError>> {
        let mut out = Map::new();
        let mut errors = Vec::new();

        for (name, spec) in &self.fields {
            match model.get(name).filter(|v| !v.is_null()) {
                Some(raw) => match spec.coerce(raw) {
                    Ok(value) => {
                        out.insert(name.clone(), value);
                    }
                    Err(message) => errors.push(FieldError {
                        field: name.clone(),
                        message,
                        missing: false,
                    }),
                },
                None => {
                    if let Some(default) = &spec.default {
                        out.insert(name.clone(), default.clone());
                    } else if spec.required {
                        errors.push(FieldError {
                            field: name.clone(),
                            message: "field required".into(),
                            missing: true,
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }

    /// Field list in the shape used by extraction prompts:
    /// `"name": // kind, description`.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(name, spec)| {
                let mut line = format!("\t\"{name}\": // {}", spec.kind);
                if !spec.options.is_empty() {
                    line.push_str(&format!(" (one of: {})", spec.options.join(", ")));
                }
                if !spec.description.is_empty() {
                    line.push_str(&format!(", {}", spec.description));
                }
                if !spec.required {
                    line.push_str(", optional");
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
