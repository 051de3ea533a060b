// ExtractText Core Library
//
// Pulls plain text out of documents (PDF, Word, RTF, HTML, images via OCR,
// XML) through pluggable extractors, and propagates it onto resources:
// media get their own text, items get the text of their media.

pub mod types;
pub mod command;
pub mod extractors;
pub mod registry;
pub mod sniffer;
pub mod service;
pub mod config;
pub mod storage;
pub mod propagation;
// Test double for hosts' and our own tests, not part of the supported API
#[doc(hidden)]
pub mod testing;

// Re-export main types and functions for easy use
pub use types::*;
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use extractors::{CliTool, ExtractError, Extractor, PlainReadExtractor, ProcessExtractor, XmlExtractor};
pub use registry::ExtractorRegistry;
pub use sniffer::{MagicSniffer, MediaTypeSniffer};
pub use service::ExtractionService;
pub use config::ExtractConfig;
pub use storage::{FileStore, MemoryStore, PropertyResolver, PropertyStore, Vocabulary};
pub use propagation::PropagationEngine;
