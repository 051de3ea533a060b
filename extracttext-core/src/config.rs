use crate::extractors::process::{DEFAULT_OCR_LANGUAGE, DEFAULT_OCR_OEM, DEFAULT_OCR_PSM};
use crate::extractors::xml::{DEFAULT_CHUNK_SIZE, DEFAULT_XSLT_PROCESSOR};
use crate::types::{ExtractionOptions, MediaType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const TEXT_PROPERTY_NAMESPACE: &str = "http://omeka.org/s/vocabs/o-module-extracttext#";
pub const TEXT_PROPERTY_LOCAL_NAME: &str = "extracted_text";

// Default value functions for serde
fn default_ocr_language() -> String {
    DEFAULT_OCR_LANGUAGE.to_string()
}

fn default_ocr_psm() -> i64 {
    DEFAULT_OCR_PSM
}

fn default_ocr_oem() -> i64 {
    DEFAULT_OCR_OEM
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_xslt_processor() -> String {
    DEFAULT_XSLT_PROCESSOR.to_string()
}

fn default_namespace_uri() -> String {
    TEXT_PROPERTY_NAMESPACE.to_string()
}

fn default_local_name() -> String {
    TEXT_PROPERTY_LOCAL_NAME.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Extractor keys that are never registered
    #[serde(default)]
    pub disabled_extractors: Vec<String>,
    /// Media type → extractor key, merged over the built-in aliases
    #[serde(default)]
    pub aliases: HashMap<MediaType, String>,
    /// Binary name → absolute path, checked before searching PATH
    #[serde(default)]
    pub binaries: HashMap<String, PathBuf>,
    /// Wall-clock limit for one external process
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub xml: XmlConfig,
    #[serde(default)]
    pub text_property: TextPropertyConfig,
    /// Passed to every extraction; per-call options win
    #[serde(default)]
    pub default_options: ExtractionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_language")]
    pub language: String,
    /// Page segmentation mode (0-13)
    #[serde(default = "default_ocr_psm")]
    pub psm: i64,
    /// OCR engine mode (0-3)
    #[serde(default = "default_ocr_oem")]
    pub oem: i64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_ocr_language(),
            psm: default_ocr_psm(),
            oem: default_ocr_oem(),
        }
    }
}

impl OcrConfig {
    /// As extractor options (`l`, `psm`, `oem`)
    pub fn to_options(&self) -> ExtractionOptions {
        ExtractionOptions::new()
            .with("l", self.language.as_str())
            .with("psm", self.psm)
            .with("oem", self.oem)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlConfig {
    /// Directory of `<format-tag>.xsl` files; the bundled set when unset
    #[serde(default)]
    pub stylesheet_dir: Option<PathBuf>,
    /// Replaces the bundled identifier table
    #[serde(default)]
    pub identifiers_file: Option<PathBuf>,
    /// Read size for the streaming well-formedness check
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_xslt_processor")]
    pub xslt_processor: String,
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            stylesheet_dir: None,
            identifiers_file: None,
            chunk_size: default_chunk_size(),
            xslt_processor: default_xslt_processor(),
        }
    }
}

/// The vocabulary term that holds extracted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPropertyConfig {
    #[serde(default = "default_namespace_uri")]
    pub namespace_uri: String,
    #[serde(default = "default_local_name")]
    pub local_name: String,
}

impl Default for TextPropertyConfig {
    fn default() -> Self {
        Self {
            namespace_uri: default_namespace_uri(),
            local_name: default_local_name(),
        }
    }
}

impl ExtractConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ExtractConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if given; a missing or broken file logs a warning and
    /// yields the defaults.
    pub fn load_with_fallback(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No config file given, using defaults");
            return Self::default();
        };
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{e:#}; using default configuration");
                Self::default()
            }
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn is_disabled(&self, key: &str) -> bool {
        self.disabled_extractors.iter().any(|k| k == key)
    }
}
