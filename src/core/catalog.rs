//! Read-only registry of translation-capable models

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::ModelEntry;

/// Immutable model lookup built once at process start
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entries: Arc<Vec<ModelEntry>>,
    index: Arc<HashMap<String, usize>>,
}

impl ModelCatalog {
    /// Build a catalog; later duplicates of an id are ignored
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            index.entry(entry.id.clone()).or_insert(pos);
        }

        Self {
            entries: Arc::new(entries),
            index: Arc::new(index),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.index.get(id).map(|pos| &self.entries[*pos])
    }

    /// Lookup that treats an unknown id as a user input error
    pub fn require(&self, id: &str) -> Result<&ModelEntry> {
        self.get(id)
            .ok_or_else(|| TranslationError::invalid_input("Unknown model selected."))
    }

    pub fn all(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
