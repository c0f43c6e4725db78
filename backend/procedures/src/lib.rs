//! Procedures for Hearth: tools, forms, and the schemas behind them.
//!
//! A procedure is a named capability the agent can select during a turn. Tools
//! run once and return an observation; forms collect a structured model over
//! several turns through a small state machine.

pub mod form;
pub mod procedure;
pub mod schema;
pub mod set;
pub mod tool;

pub use form::{submit_fn, FnSubmit, FormDefinition, FormInstance, FormSubmit, TemplateSubmit};
pub use procedure::{normalize_name, Procedure, ProcedureKind};
pub use schema::{FieldError, FieldKind, FieldSpec, Schema};
pub use set::{ProcedureSet, ProcedureTrigger, TriggerSource};
pub use tool::{tool_fn, FnTool, TemplateTool, ToolDefinition, ToolHandler};
