//! The persisted set of active plugin ids.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use hearth_core::HearthResult;

use crate::base::BASE_PLUGIN_ID;
use crate::settings::write_json_atomic;

/// Active plugin ids in activation order. The base plugin is always a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSet {
    path: Option<PathBuf>,
    ids: Vec<String>,
}

impl Default for ActiveSet {
    fn default() -> Self {
        Self { path: None, ids: vec![BASE_PLUGIN_ID.to_string()] }
    }
}

impl ActiveSet {
    /// An unpersisted set holding only the base plugin.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Read the JSON list at `path`. Missing or unreadable files give the default.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut set = Self { path: Some(path.clone()), ..Self::default() };
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %path.display(), "[Plugins] no active set on disk; base plugin only");
                return set;
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => {
                for id in ids {
                    set.insert(&id);
                }
            }
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "[Plugins] unreadable active set; base plugin only"
            ),
        }
        set
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|i| i == id)
    }

    /// Returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    /// Returns false if it was absent. The base plugin cannot be removed.
    pub fn remove(&mut self, id: &str) -> bool {
        if id == BASE_PLUGIN_ID {
            return false;
        }
        let before = self.ids.len();
        self.ids.retain(|i| i != id);
        before != self.ids.len()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Write the set to its path. No-op for in-memory sets.
    pub fn save(&self) -> HearthResult<()> {
        match &self.path {
            Some(path) => write_json_atomic(path, &self.ids),
            None => Ok(()),
        }
    }
}
