//! Media type → extractor dispatch
//!
//! Factories are registered under extractor keys (`pdftotext`, `xml`, ...).
//! A media type resolves either directly as a key or through the alias
//! table. Instances are built on first use and shared afterwards.

use crate::command::CommandRunner;
use crate::config::ExtractConfig;
use crate::extractors::process::{CliTool, ProcessExtractor};
use crate::extractors::xml::{bundled_stylesheet_dir, IdentifierTable, XmlExtractor};
use crate::extractors::{Extractor, PlainReadExtractor};
use crate::types::MediaType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub type ExtractorFactory = Box<dyn Fn() -> Arc<dyn Extractor> + Send + Sync>;

pub const PLAIN_KEY: &str = "filegetcontents";
pub const XML_KEY: &str = "xml";

/// Media types handled out of the box, by extractor key
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("text/plain", PLAIN_KEY),
    ("text/html", "lynx"),
    ("application/xhtml+xml", "lynx"),
    ("application/pdf", "pdftotext"),
    ("application/msword", "catdoc"),
    ("application/rtf", "catdoc"),
    ("text/rtf", "catdoc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx2txt",
    ),
    ("image/png", "tesseract"),
    ("image/jpeg", "tesseract"),
    ("image/tiff", "tesseract"),
    ("image/gif", "tesseract"),
    ("image/bmp", "tesseract"),
    ("image/webp", "tesseract"),
    ("image/jp2", "tesseract"),
    ("application/xml", XML_KEY),
    ("text/xml", XML_KEY),
];

#[derive(Default)]
pub struct ExtractorRegistry {
    factories: HashMap<String, ExtractorFactory>,
    aliases: HashMap<MediaType, String>,
    instances: Mutex<HashMap<String, Arc<dyn Extractor>>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in extractor set, shaped by `config`
    pub fn with_defaults(config: &ExtractConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Self::new();

        for tool in CliTool::ALL {
            let runner = runner.clone();
            let defaults = if tool == CliTool::Tesseract {
                config.ocr.to_options()
            } else {
                Default::default()
            };
            registry.register(tool.key(), move || {
                Arc::new(ProcessExtractor::new(tool, runner.clone()).with_defaults(defaults.clone()))
            });
        }

        registry.register(PLAIN_KEY, || Arc::new(PlainReadExtractor::new()));

        let identifiers = Arc::new(IdentifierTable::load_or_bundled(
            config.xml.identifiers_file.as_deref(),
        ));
        let stylesheet_dir = config.xml.stylesheet_dir.clone().or_else(bundled_stylesheet_dir);
        let chunk_size = config.xml.chunk_size;
        let processor = config.xml.xslt_processor.clone();
        {
            let identifiers = identifiers.clone();
            let runner = runner.clone();
            registry.register(XML_KEY, move || {
                Arc::new(
                    XmlExtractor::new(runner.clone())
                        .with_identifiers(identifiers.clone())
                        .with_stylesheet_dir(stylesheet_dir.clone())
                        .with_chunk_size(chunk_size)
                        .with_xslt_processor(&processor),
                )
            });
        }

        for (media_type, key) in BUILTIN_ALIASES {
            registry.alias(media_type, key);
        }
        // Every refined XML type goes to the XML pipeline unless a more
        // specific backend already claims it.
        for media_type in identifiers.media_types() {
            if !registry.aliases.contains_key(media_type) {
                registry.alias(media_type, XML_KEY);
            }
        }
        for (media_type, key) in &config.aliases {
            registry.alias(media_type, key);
        }

        for key in &config.disabled_extractors {
            registry.unregister(key);
        }

        registry
    }

    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Extractor> + Send + Sync + 'static,
    {
        self.factories.insert(key.to_string(), Box::new(factory));
        self.lock_instances().remove(key);
    }

    /// Drop the factory for `key`. Aliases pointing at it stop resolving.
    pub fn unregister(&mut self, key: &str) {
        self.factories.remove(key);
        self.lock_instances().remove(key);
    }

    pub fn alias(&mut self, media_type: &str, key: &str) {
        self.aliases.insert(media_type.to_string(), key.to_string());
    }

    /// Extractor key that `media_type` resolves to, if any
    pub fn resolve_key(&self, media_type: &str) -> Option<&str> {
        if let Some((key, _)) = self.factories.get_key_value(media_type) {
            return Some(key.as_str());
        }
        let key = self.aliases.get(media_type)?;
        self.factories.get_key_value(key).map(|(key, _)| key.as_str())
    }

    /// `None` means nothing is configured for `media_type`; that is a normal
    /// outcome, not an error.
    pub fn resolve(&self, media_type: &str) -> Option<Arc<dyn Extractor>> {
        let Some(key) = self.resolve_key(media_type) else {
            debug!("No extractor configured for {media_type}");
            return None;
        };

        let mut instances = self.lock_instances();
        if let Some(extractor) = instances.get(key) {
            return Some(extractor.clone());
        }
        let factory = self.factories.get(key)?;
        let extractor = factory();
        instances.insert(key.to_string(), extractor.clone());
        Some(extractor)
    }

    /// Registered extractor keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Alias entries as `(media type, key)`, sorted by media type
    pub fn aliases(&self) -> Vec<(&str, &str)> {
        let mut aliases: Vec<(&str, &str)> = self
            .aliases
            .iter()
            .map(|(media_type, key)| (media_type.as_str(), key.as_str()))
            .collect();
        aliases.sort_unstable();
        aliases
    }

    /// Media types aliased to `key`, sorted
    pub fn media_types_for(&self, key: &str) -> Vec<&str> {
        self.aliases()
            .into_iter()
            .filter(|(_, k)| *k == key)
            .map(|(media_type, _)| media_type)
            .collect()
    }

    fn lock_instances(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Extractor>>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
