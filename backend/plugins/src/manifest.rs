/// Plugin manifest: the optional `plugin.json` at the root of a plugin directory.
///
/// Parsing is lenient. A missing file, a syntax error, or an invalid field never
/// fails a load: the offending part falls back to its default and a warning is
/// logged.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

use hearth_core::HearthError;

pub const MANIFEST_FILE: &str = "plugin.json";
pub const DEFAULT_VERSION: &str = "0.0.1";

static SEMVER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(?:-[0-9A-Za-z.\-]+)?(?:\+[0-9A-Za-z.\-]+)?$").unwrap()
});

fn default_tags() -> Vec<String> {
    vec!["miscellaneous".into(), "unknown".into()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author_name: String,
    pub author_url: Option<String>,
    pub plugin_url: Option<String>,
    pub thumb: Option<String>,
    pub tags: Vec<String>,
}

impl PluginManifest {
    /// Defaults for a plugin without a manifest: the name is the plugin id.
    pub fn defaults(id: &str) -> Self {
        Self {
            name: id.to_string(),
            version: DEFAULT_VERSION.into(),
            description: String::new(),
            author_name: "Unknown author".into(),
            author_url: None,
            plugin_url: None,
            thumb: None,
            tags: default_tags(),
        }
    }

    /// Read `plugin.json` from `dir`, falling back to defaults.
    pub fn load(dir: &Path, id: &str) -> Self {
        let path = dir.join(MANIFEST_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::defaults(id),
        };
        let (manifest, problems) = Self::parse(&raw, id);
        for message in problems {
            let err = HearthError::ManifestParse {
                path: path.display().to_string(),
                message,
            };
            warn!(plugin = %id, "[Plugins] {err}; using default");
        }
        manifest
    }

    /// Parse manifest text. Returns the manifest and one message per field that
    /// was rejected.
    pub fn parse(raw: &str, id: &str) -> (Self, Vec<String>) {
        let mut manifest = Self::defaults(id);
        let mut problems = Vec::new();

        let fields: Map<String, Value> = match serde_json::from_str(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                problems.push("manifest is not a JSON object".into());
                return (manifest, problems);
            }
            Err(e) => {
                problems.push(e.to_string());
                return (manifest, problems);
            }
        };

        let mut text = |key: &str, alias: &str| -> Option<String> {
            let value = fields.get(key).or_else(|| fields.get(alias))?;
            match value.as_str() {
                Some(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => {
                    problems.push(format!("field '{key}' must be a non-empty string"));
                    None
                }
            }
        };

        if let Some(name) = text("name", "name") {
            manifest.name = name;
        }
        if let Some(description) = text("description", "description") {
            manifest.description = description;
        }
        if let Some(author) = text("authorName", "author_name") {
            manifest.author_name = author;
        }
        let version = text("version", "version");
        let author_url = text("authorUrl", "author_url");
        let plugin_url = text("pluginUrl", "plugin_url");
        let thumb = text("thumb", "thumb");

        if let Some(version) = version {
            if SEMVER_RE.is_match(&version) {
                manifest.version = version;
            } else {
                problems.push(format!("version '{version}' is not semver"));
            }
        }

        for (key, value, slot) in [
            ("authorUrl", author_url, &mut manifest.author_url),
            ("pluginUrl", plugin_url, &mut manifest.plugin_url),
            ("thumb", thumb, &mut manifest.thumb),
        ] {
            if let Some(raw_url) = value {
                match url::Url::parse(&raw_url) {
                    Ok(_) => *slot = Some(raw_url),
                    Err(e) => problems.push(format!("field '{key}' is not a URL: {e}")),
                }
            }
        }

        match fields.get("tags") {
            None => {}
            Some(Value::Array(items))
                if items.iter().all(Value::is_string) && !items.is_empty() =>
            {
                manifest.tags =
                    items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            Some(Value::String(csv)) if !csv.trim().is_empty() => {
                manifest.tags = csv
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            Some(_) => problems.push("field 'tags' must be a list of strings".into()),
        }

        (manifest, problems)
    }
}
