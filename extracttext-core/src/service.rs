use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::ExtractConfig;
use crate::extractors::ExtractError;
use crate::registry::ExtractorRegistry;
use crate::sniffer::{MagicSniffer, MediaTypeSniffer};
use crate::types::{ExecutionContext, ExtractionOptions, ExtractionResult, MediaType};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// File path (+ optional media type) in, text out.
///
/// Resolution order: declared media type, else a sniffed one; then the
/// registry; then the extractor's own availability check. Any miss along
/// the way is `NotExtracted`.
pub struct ExtractionService {
    registry: ExtractorRegistry,
    sniffer: Box<dyn MediaTypeSniffer>,
    /// Applied under every call's options
    default_options: ExtractionOptions,
}

impl ExtractionService {
    pub fn new(registry: ExtractorRegistry, sniffer: Box<dyn MediaTypeSniffer>) -> Self {
        Self {
            registry,
            sniffer,
            default_options: ExtractionOptions::new(),
        }
    }

    pub fn with_default_options(mut self, options: ExtractionOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Built-in extractors and the magic-number sniffer, with `runner`
    pub fn with_runner(config: &ExtractConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            ExtractorRegistry::with_defaults(config, runner),
            Box::new(MagicSniffer::new()),
        )
        .with_default_options(config.default_options.clone())
    }

    /// Built-in extractors running real binaries
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemCommandRunner::from_config(config)))
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Declared type if given, else whatever the sniffer makes of the file
    pub fn media_type_for(&self, path: &Path, declared: Option<&str>) -> Option<MediaType> {
        match declared.map(str::trim).filter(|t| !t.is_empty()) {
            Some(declared) => Some(declared.to_string()),
            None => self.sniffer.sniff(path),
        }
    }

    pub fn extract_text(
        &self,
        path: &Path,
        declared: Option<&str>,
        options: &ExtractionOptions,
        context: ExecutionContext,
    ) -> Result<ExtractionResult, ExtractError> {
        let Some(media_type) = self.media_type_for(path, declared) else {
            debug!("Could not determine a media type for {}", path.display());
            return Ok(ExtractionResult::NotExtracted);
        };

        let Some(extractor) = self.registry.resolve(&media_type) else {
            return Ok(ExtractionResult::NotExtracted);
        };

        if !extractor.is_available() {
            info!(
                "Extractor {} for {media_type} is not available, skipping {}",
                extractor.name(),
                path.display()
            );
            return Ok(ExtractionResult::NotExtracted);
        }

        debug!("Extracting {} ({media_type}) with {}", path.display(), extractor.name());
        extractor.extract(path, &self.default_options.merged(options), context)
    }
}
