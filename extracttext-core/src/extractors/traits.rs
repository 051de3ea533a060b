// Extractor abstraction for text extraction
//
// This module defines the boundary between "which backend handles this file"
// (registry, service) and "how text comes out of it" (the backends). Every
// backend absorbs its own failures: the only thing that crosses this boundary
// besides a result is a rejected option value.

use crate::types::{ExecutionContext, ExtractionOptions, ExtractionResult};
use std::path::Path;
use thiserror::Error;

/// Raised before any work is attempted when a caller passes an option
/// value the extractor refuses to put on a command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid value {value:?} for option `{key}`: {reason}")]
    InvalidOption {
        key: String,
        value: String,
        reason: String,
    },
}

impl ExtractError {
    pub fn invalid_option(key: &str, value: impl ToString, reason: &str) -> Self {
        ExtractError::InvalidOption {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Extractor trait - produces plain text from one file
///
/// Implementations handle:
/// - Checking whether they can run at all in this environment
/// - Refusing work that does not belong in the caller's execution context
/// - Turning every failure (missing binary, bad input, tool error) into
///   `ExtractionResult::NotExtracted`
///
/// Extractors log through `tracing`; with no subscriber installed the
/// diagnostics are dropped and nothing else changes.
pub trait Extractor: Send + Sync {
    /// Short key used in logs and listings
    fn name(&self) -> &str;

    /// Cheap, side-effect-free availability check (binary present, etc.)
    fn is_available(&self) -> bool;

    /// Extract text from `path`
    ///
    /// Returns `Err` only for option values rejected by validation.
    fn extract(
        &self,
        path: &Path,
        options: &ExtractionOptions,
        context: ExecutionContext,
    ) -> Result<ExtractionResult, ExtractError>;
}
