//! Config defaults: fills every unset field after loading.

use crate::schema::{
    AgentConfig, DependencyConfig, HearthConfig, LoggingConfig, MemoryConfig, PluginsConfig,
    RecallSettings,
};

pub const DEFAULT_PLUGINS_ROOT: &str = "plugins";
pub const DEFAULT_ACTIVE_SET_FILE: &str = "active_plugins.json";
pub const DEFAULT_DEPENDENCY_FILE: &str = "requirements.txt";
pub const DEFAULT_DEPENDENCY_COMMAND: &str = "pip install --no-cache-dir -r {file}";

pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_FALLBACK_HISTORY_TURNS: usize = 5;
pub const DEFAULT_SELECTION_HISTORY_TURNS: usize = 3;

pub const DEFAULT_RECALL_K: usize = 3;
pub const DEFAULT_RECALL_THRESHOLD: f32 = 0.7;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: HearthConfig) -> HearthConfig {
    let config = apply_plugin_defaults(config);
    let config = apply_agent_defaults(config);
    let config = apply_memory_defaults(config);
    apply_logging_defaults(config)
}

fn apply_plugin_defaults(mut config: HearthConfig) -> HearthConfig {
    let plugins = config.plugins.get_or_insert_with(PluginsConfig::default);
    plugins.root.get_or_insert_with(|| DEFAULT_PLUGINS_ROOT.to_string());
    plugins
        .active_set_file
        .get_or_insert_with(|| DEFAULT_ACTIVE_SET_FILE.to_string());
    plugins.watch.get_or_insert(false);

    let deps = plugins.dependencies.get_or_insert_with(DependencyConfig::default);
    deps.enabled.get_or_insert(false);
    deps.file.get_or_insert_with(|| DEFAULT_DEPENDENCY_FILE.to_string());
    deps.command
        .get_or_insert_with(|| DEFAULT_DEPENDENCY_COMMAND.to_string());
    config
}

fn apply_agent_defaults(mut config: HearthConfig) -> HearthConfig {
    let agent = config.agent.get_or_insert_with(AgentConfig::default);
    agent.instant_tool_trigger.get_or_insert(true);
    agent.max_iterations.get_or_insert(DEFAULT_MAX_ITERATIONS);
    agent
        .fallback_history_turns
        .get_or_insert(DEFAULT_FALLBACK_HISTORY_TURNS);
    agent
        .selection_history_turns
        .get_or_insert(DEFAULT_SELECTION_HISTORY_TURNS);
    config
}

fn apply_memory_defaults(mut config: HearthConfig) -> HearthConfig {
    let memory = config.memory.get_or_insert_with(MemoryConfig::default);
    for section in [
        &mut memory.episodic,
        &mut memory.declarative,
        &mut memory.procedural,
    ] {
        let recall = section.get_or_insert_with(RecallSettings::default);
        recall.k.get_or_insert(DEFAULT_RECALL_K);
        recall.threshold.get_or_insert(DEFAULT_RECALL_THRESHOLD);
    }
    config
}

fn apply_logging_defaults(mut config: HearthConfig) -> HearthConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.dir.get_or_insert_with(|| DEFAULT_LOG_DIR.to_string());
    logging.json.get_or_insert(false);
    config
}
