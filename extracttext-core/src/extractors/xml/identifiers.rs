use crate::types::MediaType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error};

const BUNDLED_IDENTIFIERS: &str = include_str!("../../../data/media-type-identifiers.yaml");

/// Raw XML identifier (doctype name, PI href, namespace, element name) to media type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierTable(HashMap<String, MediaType>);

impl IdentifierTable {
    /// The table shipped with the crate. A broken bundle degrades to an
    /// empty table, which only means no XML type is ever refined.
    pub fn bundled() -> Self {
        match serde_yaml::from_str(BUNDLED_IDENTIFIERS) {
            Ok(table) => table,
            Err(e) => {
                error!("Bundled media type identifier table is invalid: {e}");
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading identifier table {}", path.display()))?;
        let table = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing identifier table {}", path.display()))?;
        Ok(table)
    }

    /// Load `path` when given, falling back to the bundled table on any failure
    pub fn load_or_bundled(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No identifier table configured, using the bundled one");
            return Self::bundled();
        };
        match Self::load(path) {
            Ok(table) => table,
            Err(e) => {
                error!("{e:#}; using the bundled identifier table");
                Self::bundled()
            }
        }
    }

    pub fn lookup(&self, identifier: &str) -> Option<&MediaType> {
        self.0.get(identifier)
    }

    pub fn with_entry(mut self, identifier: &str, media_type: &str) -> Self {
        self.0.insert(identifier.to_string(), media_type.to_string());
        self
    }

    /// Distinct media types the table can produce
    pub fn media_types(&self) -> Vec<&MediaType> {
        let mut types: Vec<&MediaType> = self.0.values().collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
