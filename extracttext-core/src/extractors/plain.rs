//! Plain text passthrough.

use crate::extractors::traits::{ExtractError, Extractor};
use crate::types::{ExecutionContext, ExtractionOptions, ExtractionResult};
use std::fs;
use std::path::Path;
use tracing::error;

/// Returns the file contents as-is. Invalid UTF-8 is replaced, not rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainReadExtractor;

impl PlainReadExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for PlainReadExtractor {
    fn name(&self) -> &str {
        "filegetcontents"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extract(
        &self,
        path: &Path,
        _options: &ExtractionOptions,
        _context: ExecutionContext,
    ) -> Result<ExtractionResult, ExtractError> {
        match fs::read(path) {
            Ok(bytes) => Ok(ExtractionResult::Text(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Err(e) => {
                error!("Failed to read {}: {e}", path.display());
                Ok(ExtractionResult::NotExtracted)
            }
        }
    }
}
