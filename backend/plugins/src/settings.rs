//! Plugin settings: `settings.json`, validated against the schema the plugin
//! declares.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use hearth_core::{HearthError, HearthResult};
use hearth_procedures::Schema;

pub const SETTINGS_FILE: &str = "settings.json";

/// Write `value` as pretty JSON through a temp file and a rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> HearthResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Check `value` against `schema`. An empty schema accepts any object as-is.
pub fn validate_settings(schema: &Schema, value: &Value) -> HearthResult<Map<String, Value>> {
    let Value::Object(map) = value else {
        return Err(HearthError::SettingsParse {
            path: SETTINGS_FILE.into(),
            message: "settings must be a JSON object".into(),
        });
    };
    if schema.is_empty() {
        return Ok(map.clone());
    }
    schema.validate(map).map_err(|errors| HearthError::SettingsParse {
        path: SETTINGS_FILE.into(),
        message: errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
    })
}

/// Load the settings of the plugin in `dir`.
///
/// - file present and valid: its (coerced) content
/// - file present but invalid: schema defaults, logged
/// - file absent, non-empty schema: schema defaults, written to disk
/// - file absent, empty schema: empty settings
pub fn load_settings(dir: &Path, plugin_id: &str, schema: &Schema) -> Map<String, Value> {
    let path = dir.join(SETTINGS_FILE);
    match std::fs::read_to_string(&path) {
        Ok(raw) => {
            let parsed = serde_json::from_str::<Value>(&raw)
                .map_err(|e| HearthError::SettingsParse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
                .and_then(|value| validate_settings(schema, &value));
            match parsed {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(plugin = %plugin_id, "[Plugins] {e}; using schema defaults");
                    schema.defaults()
                }
            }
        }
        Err(_) if schema.is_empty() => Map::new(),
        Err(_) => {
            let defaults = schema.defaults();
            match write_json_atomic(&path, &defaults) {
                Ok(()) => info!(plugin = %plugin_id, "[Plugins] wrote default settings"),
                Err(e) => warn!(
                    plugin = %plugin_id,
                    error = %e,
                    "[Plugins] could not write default settings"
                ),
            }
            defaults
        }
    }
}

/// Validate and persist new settings for the plugin in `dir`.
pub fn save_settings(
    dir: &Path,
    schema: &Schema,
    value: &Value,
) -> HearthResult<Map<String, Value>> {
    let settings = validate_settings(schema, value)?;
    write_json_atomic(&dir.join(SETTINGS_FILE), &settings)?;
    Ok(settings)
}
