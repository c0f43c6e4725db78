//! Config validation: range and consistency checks with field paths.

use crate::schema::{HearthConfig, RecallSettings};
use thiserror::Error;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &HearthConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_plugins(config, &mut report);
    validate_agent(config, &mut report);
    validate_memory(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_plugins(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(plugins) = &config.plugins else { return };
    if plugins.root.as_deref().is_some_and(|r| r.trim().is_empty()) {
        report.error("plugins.root", "Plugins root cannot be empty");
    }
    if plugins
        .active_set_file
        .as_deref()
        .is_some_and(|f| f.trim().is_empty())
    {
        report.error("plugins.activeSetFile", "Active-set file cannot be empty");
    }
    if let Some(deps) = &plugins.dependencies {
        if deps.enabled == Some(true) {
            if deps.command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                report.error(
                    "plugins.dependencies.command",
                    "A command is required when dependency installation is enabled",
                );
            }
            if deps.file.as_deref().map(str::trim).unwrap_or("").is_empty() {
                report.error(
                    "plugins.dependencies.file",
                    "A dependency file name is required when dependency installation is enabled",
                );
            }
        }
    }
}

fn validate_agent(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(agent) = &config.agent else { return };
    if agent.max_iterations == Some(0) {
        report.error("agent.maxIterations", "maxIterations must be >= 1");
    }
    if agent.selection_history_turns == Some(0) && agent.fallback_history_turns == Some(0) {
        report.warn("agent", "Both chains run without chat history");
    }
}

fn validate_recall(path: &str, recall: &RecallSettings, report: &mut ValidationReport) {
    if recall.k == Some(0) {
        report.warn(format!("{path}.k"), "k = 0 disables recall for this collection");
    }
    if let Some(threshold) = recall.threshold {
        if !(0.0..=1.0).contains(&threshold) {
            report.error(
                format!("{path}.threshold"),
                format!("threshold {threshold} is outside 0.0..=1.0"),
            );
        }
    }
}

fn validate_memory(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(memory) = &config.memory else { return };
    let sections = [
        ("memory.episodic", &memory.episodic),
        ("memory.declarative", &memory.declarative),
        ("memory.procedural", &memory.procedural),
    ];
    for (path, section) in sections {
        if let Some(recall) = section {
            validate_recall(path, recall, report);
        }
    }
}

fn validate_logging(config: &HearthConfig, report: &mut ValidationReport) {
    let Some(logging) = &config.logging else { return };
    if let Some(level) = &logging.level {
        if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            report.warn(
                "logging.level",
                format!("Unknown level '{level}'; expected one of {}", LOG_LEVELS.join(", ")),
            );
        }
    }
}
