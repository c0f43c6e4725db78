use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the Hearth runtime.
#[derive(Debug, Error)]
pub enum HearthError {
    #[error("invalid plugin path: {}", .0.display())]
    InvalidPluginPath(PathBuf),

    #[error("plugin '{0}' contains no loadable source units")]
    EmptyPlugin(String),

    #[error("manifest parse error ({path}): {message}")]
    ManifestParse { path: String, message: String },

    #[error("settings parse error ({path}): {message}")]
    SettingsParse { path: String, message: String },

    #[error("no active plugin implements hook slot '{0}'")]
    HookSlotEmpty(String),

    #[error("hook '{slot}' from plugin '{plugin}' failed: {source}")]
    Hook {
        slot: String,
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("procedure '{0}' invoked without a session")]
    ProcedureNotAssigned(String),

    #[error("form extraction failed: {0}")]
    FormExtraction(String),

    #[error("procedure selection failed: {0}")]
    ProcedureSelection(String),

    #[error("plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("plugin '{0}' is protected and cannot be changed")]
    ProtectedPlugin(String),

    #[error("LLM provider error ({provider}): {message}")]
    Llm { provider: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HearthError {
    /// Errors the plugin registry recovers from by falling back to defaults.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ManifestParse { .. }
                | Self::SettingsParse { .. }
                | Self::FormExtraction(_)
                | Self::ProcedureSelection(_)
        )
    }
}

pub type HearthResult<T> = std::result::Result<T, HearthError>;
