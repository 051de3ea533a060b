//! Extracted text on resources
//!
//! Media get their own text from their file; an item gets the text of its
//! media joined in position order. Every write replaces: all existing
//! values of the text property are removed before at most one is added.

use crate::config::TextPropertyConfig;
use crate::service::ExtractionService;
use crate::storage::{PropertyResolver, PropertyStore};
use crate::types::{
    AggregateMode, ExecutionContext, ExtractionOptions, ExtractionResult, MediaRef, PropertyId,
    ResourceId, ValueType,
};
use anyhow::Result;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Joins child texts in the aggregate
const AGGREGATE_SEPARATOR: &str = "\n";

pub struct PropagationEngine {
    service: ExtractionService,
    resolver: Box<dyn PropertyResolver + Send + Sync>,
    text_term: TextPropertyConfig,
    /// Resolved on first use, kept for the engine's lifetime
    text_property: OnceLock<Option<PropertyId>>,
    /// Options for extractions the engine starts itself
    options: ExtractionOptions,
}

impl PropagationEngine {
    pub fn new(
        service: ExtractionService,
        resolver: Box<dyn PropertyResolver + Send + Sync>,
        text_term: TextPropertyConfig,
    ) -> Self {
        Self {
            service,
            resolver,
            text_term,
            text_property: OnceLock::new(),
            options: ExtractionOptions::new(),
        }
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn service(&self) -> &ExtractionService {
        &self.service
    }

    /// The extracted-text property, or `None` when the vocabulary lacks it.
    /// In that case every write below is a no-op.
    pub fn text_property(&self) -> Option<PropertyId> {
        *self.text_property.get_or_init(|| {
            let property = self
                .resolver
                .resolve(&self.text_term.namespace_uri, &self.text_term.local_name);
            if property.is_none() {
                info!(
                    "Property {}{} is not installed, extracted text will not be stored",
                    self.text_term.namespace_uri, self.text_term.local_name
                );
            }
            property
        })
    }

    /// Replace the resource's extracted text with `result`.
    ///
    /// `NotExtracted` leaves the resource without any value; `Text("")` is
    /// stored as an empty value. Returns `false` when the property is unresolved.
    pub fn set_text_on_resource(
        &self,
        store: &mut dyn PropertyStore,
        resource: &ResourceId,
        result: &ExtractionResult,
    ) -> Result<bool> {
        let Some(property) = self.text_property() else {
            return Ok(false);
        };

        let existing: Vec<_> = store
            .values(resource)?
            .into_iter()
            .filter(|v| v.property == property)
            .collect();
        for value in &existing {
            store.remove_value(resource, value)?;
        }

        if let Some(text) = result.text() {
            store.add_value(resource, property, ValueType::Literal, text)?;
        }
        Ok(true)
    }

    /// Extract `file_path` and store the text on `media`.
    ///
    /// Returns `false` and leaves the media untouched when the file is not a
    /// regular file, the property is unresolved, or nothing was extracted.
    pub fn set_text_to_media(
        &self,
        store: &mut dyn PropertyStore,
        media: &MediaRef,
        file_path: &Path,
        context: ExecutionContext,
    ) -> Result<bool> {
        if !file_path.is_file() {
            debug!("{} is not a file, not extracting for {}", file_path.display(), media.id);
            return Ok(false);
        }
        if self.text_property().is_none() {
            return Ok(false);
        }

        let result = self.service.extract_text(
            file_path,
            media.media_type.as_deref(),
            &self.options,
            context,
        )?;
        if !result.is_extracted() {
            debug!("No text extracted from {} for {}", file_path.display(), media.id);
            return Ok(false);
        }
        self.set_text_on_resource(store, &media.id, &result)
    }

    /// Roll the media's text up into `parent`.
    ///
    /// Returns the text now stored on the parent, `None` when it has none.
    pub fn aggregate_to_parent(
        &self,
        store: &mut dyn PropertyStore,
        parent: &ResourceId,
        children: &[MediaRef],
        mode: AggregateMode,
        context: ExecutionContext,
    ) -> Result<Option<String>> {
        let Some(property) = self.text_property() else {
            return Ok(None);
        };

        let mut ordered: Vec<&MediaRef> = children.iter().collect();
        ordered.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

        if mode == AggregateMode::Clear {
            for media in &ordered {
                self.set_text_on_resource(store, &media.id, &ExtractionResult::NotExtracted)?;
            }
            self.set_text_on_resource(store, parent, &ExtractionResult::NotExtracted)?;
            return Ok(None);
        }

        let mut texts: Vec<String> = Vec::new();
        for media in &ordered {
            if mode == AggregateMode::Refresh {
                if let Some(file_path) = &media.file_path {
                    self.set_text_to_media(store, media, file_path, context)?;
                }
            }
            texts.extend(
                store
                    .values(&media.id)?
                    .into_iter()
                    .filter(|v| v.property == property && v.value_type == ValueType::Literal)
                    .map(|v| v.value),
            );
        }

        let aggregate = texts.join(AGGREGATE_SEPARATOR).trim().to_string();
        if aggregate.is_empty() {
            self.set_text_on_resource(store, parent, &ExtractionResult::NotExtracted)?;
            return Ok(None);
        }
        self.set_text_on_resource(store, parent, &ExtractionResult::Text(aggregate.clone()))?;
        Ok(Some(aggregate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractConfig;
    use crate::storage::{MemoryStore, Vocabulary};
    use crate::testing::ScriptedRunner;
    use crate::types::PropertyValue;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Fixture {
        engine: PropagationEngine,
        store: MemoryStore,
        property: PropertyId,
    }

    fn fixture_with(runner: &ScriptedRunner) -> Fixture {
        let term = TextPropertyConfig::default();
        let mut store = MemoryStore::new();
        let property = store.install_term(&term.namespace_uri, &term.local_name);
        let service = ExtractionService::with_runner(&ExtractConfig::default(), Arc::new(runner.clone()));
        let engine = PropagationEngine::new(service, Box::new(store.vocabulary().clone()), term);
        Fixture { engine, store, property }
    }

    fn fixture() -> Fixture {
        fixture_with(&ScriptedRunner::new())
    }

    fn media(id: &str, position: u32) -> MediaRef {
        MediaRef {
            id: ResourceId::from(id),
            position,
            file_path: None,
            media_type: None,
        }
    }

    fn texts(f: &Fixture, id: &str) -> Vec<String> {
        f.store
            .values(&ResourceId::from(id))
            .unwrap()
            .into_iter()
            .filter(|v| v.property == f.property)
            .map(|v| v.value)
            .collect()
    }

    fn put(f: &mut Fixture, id: &str, text: &str) {
        f.store
            .add_value(&ResourceId::from(id), f.property, ValueType::Literal, text)
            .unwrap();
    }

    #[test]
    fn test_set_text_is_idempotent() {
        let mut f = fixture();
        let id = ResourceId::from("media-1");
        let result = ExtractionResult::Text("Hello".to_string());

        f.engine.set_text_on_resource(&mut f.store, &id, &result).unwrap();
        f.engine.set_text_on_resource(&mut f.store, &id, &result).unwrap();
        assert_eq!(texts(&f, "media-1"), vec!["Hello"]);
    }

    #[test]
    fn test_set_text_collapses_duplicates_and_keeps_other_properties() {
        let mut f = fixture();
        put(&mut f, "media-1", "old one");
        put(&mut f, "media-1", "old two");
        f.store
            .add_value(&ResourceId::from("media-1"), PropertyId(500), ValueType::Literal, "title")
            .unwrap();

        f.engine
            .set_text_on_resource(&mut f.store, &ResourceId::from("media-1"), &ExtractionResult::Text(String::new()))
            .unwrap();
        assert_eq!(texts(&f, "media-1"), vec![""]);
        let all = f.store.values(&ResourceId::from("media-1")).unwrap();
        assert!(all.contains(&PropertyValue {
            property: PropertyId(500),
            value_type: ValueType::Literal,
            value: "title".to_string(),
        }));
    }

    #[test]
    fn test_not_extracted_clears() {
        let mut f = fixture();
        put(&mut f, "media-1", "stale");
        f.engine
            .set_text_on_resource(&mut f.store, &ResourceId::from("media-1"), &ExtractionResult::NotExtracted)
            .unwrap();
        assert!(texts(&f, "media-1").is_empty());
    }

    #[test]
    fn test_default_aggregate_joins_in_position_order() {
        let mut f = fixture();
        put(&mut f, "b", "bar");
        put(&mut f, "a", "foo");
        // Supplied out of order; positions decide
        let children = [media("b", 2), media("a", 1)];

        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &children, AggregateMode::Default, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text.as_deref(), Some("foo\nbar"));
        assert_eq!(texts(&f, "item"), vec!["foo\nbar"]);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let mut f = fixture();
        put(&mut f, "a", "foo");
        let children = [media("a", 0)];
        for _ in 0..2 {
            f.engine
                .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &children, AggregateMode::Default, ExecutionContext::Foreground)
                .unwrap();
        }
        assert_eq!(texts(&f, "item"), vec!["foo"]);
    }

    #[test]
    fn test_empty_aggregate_leaves_parent_without_value() {
        let mut f = fixture();
        put(&mut f, "item", "previous aggregate");
        put(&mut f, "a", "");
        put(&mut f, "b", "  \n ");
        let children = [media("a", 1), media("b", 2)];

        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &children, AggregateMode::Default, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text, None);
        assert!(texts(&f, "item").is_empty());
    }

    #[test]
    fn test_aggregate_reads_only_literal_values() {
        let mut f = fixture();
        put(&mut f, "a", "words");
        f.store
            .add_value(&ResourceId::from("a"), f.property, ValueType::Uri, "http://example.org/text")
            .unwrap();

        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &[media("a", 0)], AggregateMode::Default, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text.as_deref(), Some("words"));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut f = fixture();
        put(&mut f, "a", "foo");
        put(&mut f, "b", "bar");
        put(&mut f, "item", "foo\nbar");
        let children = [media("a", 1), media("b", 2)];

        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &children, AggregateMode::Clear, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text, None);
        assert!(texts(&f, "a").is_empty());
        assert!(texts(&f, "b").is_empty());
        assert!(texts(&f, "item").is_empty());
    }

    #[test]
    fn test_refresh_reextracts_local_files_first() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("one.txt");
        std::fs::write(&first, "fresh one").unwrap();

        let mut f = fixture();
        put(&mut f, "a", "stale one");
        put(&mut f, "b", "kept two");
        let mut a = media("a", 1);
        a.file_path = Some(first);
        a.media_type = Some("text/plain".to_string());
        // Remote file: no local path, current text is used as-is
        let b = media("b", 2);

        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &[a, b], AggregateMode::Refresh, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text.as_deref(), Some("fresh one\nkept two"));
        assert_eq!(texts(&f, "a"), vec!["fresh one"]);
    }

    #[test]
    fn test_refresh_keeps_text_when_extraction_fails() {
        let dir = tempdir().unwrap();
        let scan = dir.path().join("scan.png");
        std::fs::write(&scan, b"\x89PNG\r\n\x1a\n").unwrap();
        let runner = ScriptedRunner::new().respond("tesseract", "ocr text", 0);

        let mut f = fixture_with(&runner);
        put(&mut f, "a", "earlier ocr");
        let mut a = media("a", 0);
        a.file_path = Some(scan);

        // Foreground: OCR refuses, the previous text stays
        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &[a.clone()], AggregateMode::Refresh, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text.as_deref(), Some("earlier ocr"));
        assert_eq!(runner.call_count(), 0);

        let text = f
            .engine
            .aggregate_to_parent(&mut f.store, &ResourceId::from("item"), &[a], AggregateMode::Refresh, ExecutionContext::Background)
            .unwrap();
        assert_eq!(text.as_deref(), Some("ocr text"));
    }

    #[test]
    fn test_set_text_to_media_falls_back_to_stored_media_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, "plain contents").unwrap();

        let mut f = fixture();
        let mut m = media("m", 0);
        m.media_type = Some("text/plain".to_string());
        assert!(f.engine.set_text_to_media(&mut f.store, &m, &path, ExecutionContext::Foreground).unwrap());
        assert_eq!(texts(&f, "m"), vec!["plain contents"]);

        let missing = PathBuf::from("/nonexistent/upload.bin");
        assert!(!f.engine.set_text_to_media(&mut f.store, &m, &missing, ExecutionContext::Foreground).unwrap());
        assert!(!f.engine.set_text_to_media(&mut f.store, &m, dir.path(), ExecutionContext::Foreground).unwrap());
        assert_eq!(texts(&f, "m"), vec!["plain contents"]);
    }

    #[test]
    fn test_unresolved_property_makes_writes_noops() {
        let service = ExtractionService::with_runner(&ExtractConfig::default(), Arc::new(ScriptedRunner::new()));
        let engine = PropagationEngine::new(service, Box::new(Vocabulary::new()), TextPropertyConfig::default());
        let mut store = MemoryStore::new();
        let id = ResourceId::from("media-1");

        assert_eq!(engine.text_property(), None);
        assert!(!engine
            .set_text_on_resource(&mut store, &id, &ExtractionResult::Text("x".to_string()))
            .unwrap());
        let text = engine
            .aggregate_to_parent(&mut store, &ResourceId::from("item"), &[media("media-1", 0)], AggregateMode::Default, ExecutionContext::Foreground)
            .unwrap();
        assert_eq!(text, None);
        assert!(store.values(&id).unwrap().is_empty());
    }
}
