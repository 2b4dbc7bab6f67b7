use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tidemark_core::TidemarkError;

/// Free-form key-value annotations carried by a resource.
///
/// Keys are write-once; derived and joined resources inherit a copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta(BTreeMap<String, serde_json::Value>);

impl Meta {
    /// Set `key` to `value`.
    ///
    /// # Errors
    /// Returns `InvalidArg` if `key` is already set.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), TidemarkError> {
        use std::collections::btree_map::Entry;
        match self.0.entry(key.into()) {
            Entry::Occupied(e) => Err(TidemarkError::InvalidArg(format!(
                "meta key '{}' is already set",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(value.into());
                Ok(())
            }
        }
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Whether `key` is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Entries ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no entries are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
