//! Telemetry and structured logging for Hearth.
//!
//! Handles subscriber setup, log redaction, and structured agent event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{AgentEvent, EventLogEntry, EventLogger};
pub use logger::{init_console_logger, init_logger};
pub use redact::redact_sensitive_data;
