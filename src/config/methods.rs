//! Selector → method name table, loaded once at startup

use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::ConfigError;

/// Immutable mapping from a `0x`-prefixed, lower-case 4-byte selector to a
/// human-readable method name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTable {
    entries: HashMap<String, String>,
}

impl MethodTable {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_json(&content)?;
        info!(path = %path.display(), selectors = table.len(), "Loaded method table");
        Ok(table)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let raw: HashMap<String, String> = serde_json::from_str(content)?;
        Ok(raw.into_iter().collect())
    }

    pub fn name(&self, selector: &str) -> Option<&str> {
        self.entries.get(selector).map(String::as_str)
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.entries.contains_key(selector)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for MethodTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(selector, name)| (selector.as_ref().to_lowercase(), name.into()))
            .collect();
        Self { entries }
    }
}
