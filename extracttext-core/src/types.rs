use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Normalized media type string, e.g. `application/pdf`.
/// Lookups are exact and case-sensitive.
pub type MediaType = String;

// ===== EXTRACTION TYPES =====

/// Outcome of a single extraction call.
///
/// `Text("")` is a successful result (a blank page is still a page);
/// `NotExtracted` means no text could be produced at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionResult {
    Text(String),
    NotExtracted,
}

impl ExtractionResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::Text(text) => Some(text),
            ExtractionResult::NotExtracted => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            ExtractionResult::Text(text) => Some(text),
            ExtractionResult::NotExtracted => None,
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, ExtractionResult::Text(_))
    }
}

impl From<Option<String>> for ExtractionResult {
    fn from(text: Option<String>) -> Self {
        text.map_or(ExtractionResult::NotExtracted, ExtractionResult::Text)
    }
}

/// Whether the calling path tolerates long blocking work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// Inline with a user-facing request
    #[default]
    Foreground,
    /// Worker, job runner or batch process
    Background,
}

/// A scalar option value passed to an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    /// Integer view of the value; numeric strings are accepted.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(i) => Some(*i),
            OptionValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Integer(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Integer(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

/// Open key/value mapping handed to `Extractor::extract`.
///
/// Each extractor reads the keys it understands and ignores the rest.
/// Keys are kept sorted so anything built from them (command lines,
/// transform parameters) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionOptions(BTreeMap<String, OptionValue>);

impl ExtractionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer `overrides` on top of these options.
    pub fn merged(&self, overrides: &ExtractionOptions) -> ExtractionOptions {
        let mut merged = self.clone();
        for (key, value) in overrides.iter() {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Parse a `key=value` pair as typed on a command line.
    /// Integers and booleans are recognised, everything else stays text.
    pub fn parse_pair(pair: &str) -> Option<(String, OptionValue)> {
        let (key, raw) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let value = if let Ok(i) = raw.parse::<i64>() {
            OptionValue::Integer(i)
        } else if let Ok(b) = raw.parse::<bool>() {
            OptionValue::Bool(b)
        } else {
            OptionValue::Text(raw.to_string())
        };
        Some((key.to_string(), value))
    }
}

// ===== RESOURCE TYPES =====
// Items own an ordered list of media. Both are identified by whatever id
// the host uses; the core never interprets it.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        ResourceId(id.to_string())
    }
}

/// Host-assigned identifier of a vocabulary property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Literal,
    Uri,
    Resource,
}

/// One entry of a resource's property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub property: PropertyId,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: String,
}

/// A child media as seen by the aggregation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: ResourceId,
    /// Explicit position within the parent item
    pub position: u32,
    /// Local path of the original file, when the host stores files locally
    #[serde(default, rename = "file")]
    pub file_path: Option<PathBuf>,
    /// Media type recorded for the media at ingest time
    #[serde(default)]
    pub media_type: Option<MediaType>,
}

/// What `aggregate_to_parent` does with the child media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateMode {
    /// Aggregate the media's current text
    #[default]
    Default,
    /// Re-extract each locally stored file first, then aggregate
    Refresh,
    /// Remove extracted text from every media and from the item
    Clear,
}

impl FromStr for AggregateMode {
    type Err = std::convert::Infallible;

    /// Unknown actions fall back to `Default`, like an absent action would.
    fn from_str(action: &str) -> Result<Self, Self::Err> {
        Ok(match action.trim() {
            "refresh" => AggregateMode::Refresh,
            "clear" => AggregateMode::Clear,
            _ => AggregateMode::Default,
        })
    }
}

impl fmt::Display for AggregateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateMode::Default => "default",
            AggregateMode::Refresh => "refresh",
            AggregateMode::Clear => "clear",
        };
        f.write_str(name)
    }
}
