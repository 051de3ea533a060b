use crate::types::{PropertyId, PropertyValue, ResourceId, ValueType};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A resource's property values, as the host persists them
pub trait PropertyStore {
    /// Values in stored order; an unknown resource has none
    fn values(&self, resource: &ResourceId) -> Result<Vec<PropertyValue>>;
    /// Remove one entry equal to `value`, if present
    fn remove_value(&mut self, resource: &ResourceId, value: &PropertyValue) -> Result<()>;
    fn add_value(
        &mut self,
        resource: &ResourceId,
        property: PropertyId,
        value_type: ValueType,
        value: &str,
    ) -> Result<()>;
}

/// Namespace + local name → property id, the host's vocabulary lookup
pub trait PropertyResolver {
    fn resolve(&self, namespace_uri: &str, local_name: &str) -> Option<PropertyId>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: PropertyId,
    pub namespace_uri: String,
    pub local_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: Vec<Term>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the term unless it is already there; returns its id either way
    pub fn install(&mut self, namespace_uri: &str, local_name: &str) -> PropertyId {
        if let Some(id) = self.resolve(namespace_uri, local_name) {
            return id;
        }
        let next = self.terms.iter().map(|t| t.id.0).max().unwrap_or(0) + 1;
        let id = PropertyId(next);
        self.terms.push(Term {
            id,
            namespace_uri: namespace_uri.to_string(),
            local_name: local_name.to_string(),
        });
        id
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
}

impl PropertyResolver for Vocabulary {
    fn resolve(&self, namespace_uri: &str, local_name: &str) -> Option<PropertyId> {
        self.terms
            .iter()
            .find(|t| t.namespace_uri == namespace_uri && t.local_name == local_name)
            .map(|t| t.id)
    }
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<ResourceId, Vec<PropertyValue>>,
    vocabulary: Vocabulary,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_term(&mut self, namespace_uri: &str, local_name: &str) -> PropertyId {
        self.vocabulary.install(namespace_uri, local_name)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

impl PropertyStore for MemoryStore {
    fn values(&self, resource: &ResourceId) -> Result<Vec<PropertyValue>> {
        Ok(self.values.get(resource).cloned().unwrap_or_default())
    }

    fn remove_value(&mut self, resource: &ResourceId, value: &PropertyValue) -> Result<()> {
        if let Some(values) = self.values.get_mut(resource) {
            if let Some(pos) = values.iter().position(|v| v == value) {
                values.remove(pos);
            }
        }
        Ok(())
    }

    fn add_value(
        &mut self,
        resource: &ResourceId,
        property: PropertyId,
        value_type: ValueType,
        value: &str,
    ) -> Result<()> {
        self.values.entry(resource.clone()).or_default().push(PropertyValue {
            property,
            value_type,
            value: value.to_string(),
        });
        Ok(())
    }
}

/// What `FileStore` keeps per resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub values: Vec<PropertyValue>,
    pub updated_at: DateTime<Utc>,
}

/// Directory-backed store: one JSON record per resource plus the vocabulary
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join("resources"))
            .with_context(|| format!("creating store at {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn vocabulary_path(&self) -> PathBuf {
        self.root.join("vocabulary.json")
    }

    fn record_path(&self, resource: &ResourceId) -> PathBuf {
        self.root
            .join("resources")
            .join(format!("{}.json", resource_hash(resource)))
    }

    pub fn vocabulary(&self) -> Result<Vocabulary> {
        let path = self.vocabulary_path();
        if !path.exists() {
            return Ok(Vocabulary::new());
        }
        let json_str = fs::read_to_string(&path)?;
        serde_json::from_str(&json_str)
            .map_err(|e| anyhow!("Failed to deserialize vocabulary {}: {}", path.display(), e))
    }

    pub fn install_term(&self, namespace_uri: &str, local_name: &str) -> Result<PropertyId> {
        let mut vocabulary = self.vocabulary()?;
        let before = vocabulary.terms().len();
        let id = vocabulary.install(namespace_uri, local_name);
        if vocabulary.terms().len() != before {
            write_json(&self.vocabulary_path(), &vocabulary)?;
        }
        Ok(id)
    }

    pub fn record(&self, resource: &ResourceId) -> Result<Option<ResourceRecord>> {
        let path = self.record_path(resource);
        if !path.exists() {
            return Ok(None);
        }
        let json_str = fs::read_to_string(&path)?;
        let record: ResourceRecord = serde_json::from_str(&json_str)
            .map_err(|e| anyhow!("Failed to deserialize record {}: {}", path.display(), e))?;
        Ok(Some(record))
    }

    fn store_values(&self, resource: &ResourceId, values: Vec<PropertyValue>) -> Result<()> {
        let record = ResourceRecord {
            id: resource.clone(),
            values,
            updated_at: Utc::now(),
        };
        write_json(&self.record_path(resource), &record)
    }
}

impl PropertyStore for FileStore {
    fn values(&self, resource: &ResourceId) -> Result<Vec<PropertyValue>> {
        Ok(self.record(resource)?.map(|r| r.values).unwrap_or_default())
    }

    fn remove_value(&mut self, resource: &ResourceId, value: &PropertyValue) -> Result<()> {
        let mut values = self.values(resource)?;
        if let Some(pos) = values.iter().position(|v| v == value) {
            values.remove(pos);
            self.store_values(resource, values)?;
        }
        Ok(())
    }

    fn add_value(
        &mut self,
        resource: &ResourceId,
        property: PropertyId,
        value_type: ValueType,
        value: &str,
    ) -> Result<()> {
        let mut values = self.values(resource)?;
        values.push(PropertyValue {
            property,
            value_type,
            value: value.to_string(),
        });
        self.store_values(resource, values)
    }
}

/// Record file name for a resource id
pub fn resource_hash(resource: &ResourceId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource.0.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write through a sibling temp file so readers never see half a record
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json_str = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow!("Failed to serialize {}: {}", path.display(), e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json_str).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
