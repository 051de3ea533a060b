//! Text extractors
//!
//! ## Architecture
//!
//! ```text
//! file + media type
//!     ↓
//! [ExtractorRegistry] -- key or alias --> Arc<dyn Extractor>
//!     ↓
//! ProcessExtractor (tesseract, pdftotext, catdoc, docx2txt, lynx)
//! PlainReadExtractor (filegetcontents)
//! XmlExtractor (well-formedness → sniff → XSLT or text content)
//!     ↓
//! ExtractionResult
//! ```

pub mod plain;
pub mod process;
pub mod traits;
pub mod xml;

pub use plain::PlainReadExtractor;
pub use process::{CliTool, ProcessExtractor};
pub use traits::{ExtractError, Extractor};
pub use xml::{IdentifierTable, XmlExtractor};

use std::ffi::OsString;
use std::path::Path;

/// A path as a command argument. Relative paths starting with `-` would be
/// read as flags, so they get a `./` prefix.
pub(crate) fn file_arg(file: &Path) -> OsString {
    if file.as_os_str().to_string_lossy().starts_with('-') {
        Path::new(".").join(file).into_os_string()
    } else {
        file.as_os_str().to_os_string()
    }
}
