//! Class index to label mapping.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Immutable mapping from class index to human-readable label.
///
/// Stored the way it is written on disk: a JSON object keyed by the
/// stringified class index, e.g. `{"0": "amoxicillin", "1": "ibuprofen"}`.
/// Loaded once and shared read-only behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassIndexMap {
    labels: HashMap<String, String>,
}

impl ClassIndexMap {
    /// Build a map from labels listed in class index order.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| (i.to_string(), label.into()))
            .collect();
        Self { labels }
    }

    /// Parse a JSON object of `index -> label`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::ClassMap(e.to_string()))
    }

    /// Load a JSON class map from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ClassMap(format!("{}: {e}", path.display())))?;
        let map = Self::from_json_str(&json)?;
        tracing::info!("Loaded class map with {} labels from {:?}", map.len(), path);
        Ok(map)
    }

    /// Label for a class index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownClass`] if the index has no entry.
    pub fn label(&self, index: usize) -> Result<&str> {
        self.labels
            .get(&index.to_string())
            .map(String::as_str)
            .ok_or(CoreError::UnknownClass(index))
    }

    /// Labels in ascending class index order. Non-numeric keys are skipped.
    pub fn labels(&self) -> Vec<(usize, &str)> {
        let mut labels: Vec<_> = self
            .labels
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|i| (i, v.as_str())))
            .collect();
        labels.sort_unstable_by_key(|&(i, _)| i);
        labels
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the map holds no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
