//! Structured XML extraction
//!
//! Per call: well-formedness check, media type sniff, then either an XSLT
//! transform chosen by the sniffed type or plain text content. The first
//! failing step ends the call with `NotExtracted`.

pub mod entities;
pub mod identifiers;
pub mod sniff;
pub mod text;
pub mod wellformed;

pub use identifiers::IdentifierTable;
pub use sniff::{sniff_identifier, IdentifierSource, RawIdentifier};
pub use wellformed::{check_well_formed, SyntaxError, DEFAULT_CHUNK_SIZE};

use crate::command::CommandRunner;
use crate::extractors::file_arg;
use crate::extractors::traits::{ExtractError, Extractor};
use crate::types::{ExecutionContext, ExtractionOptions, ExtractionResult, MediaType};
use regex::Regex;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, info};

pub const DEFAULT_XSLT_PROCESSOR: &str = "xsltproc";

static PARAM_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").unwrap());

static FORMAT_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9._-]*$").unwrap());

/// Stylesheets compiled into the crate, by format tag
const BUNDLED_STYLESHEETS: [(&str, &str); 3] = [
    (
        "oasis.opendocument.text",
        include_str!("../../../data/xsl/oasis.opendocument.text.xsl"),
    ),
    ("tei", include_str!("../../../data/xsl/tei.xsl")),
    ("alto", include_str!("../../../data/xsl/alto.xsl")),
];

/// Directory holding the bundled stylesheets.
///
/// The source tree's `data/xsl` when it is still around, otherwise the
/// compiled-in copies written out under the system temp directory.
pub fn bundled_stylesheet_dir() -> Option<PathBuf> {
    let source = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data/xsl"));
    if source.is_dir() {
        return Some(source);
    }
    let dir = std::env::temp_dir()
        .join(concat!("extracttext-", env!("CARGO_PKG_VERSION")))
        .join("xsl");
    match write_bundled_stylesheets(&dir) {
        Ok(()) => {
            debug!("Using bundled stylesheets from {}", dir.display());
            Some(dir)
        }
        Err(e) => {
            info!(
                "Cannot write bundled stylesheets to {}: {e}; XML falls back to text content",
                dir.display()
            );
            None
        }
    }
}

/// Write the compiled-in stylesheets into `dir`, leaving up-to-date files alone
pub fn write_bundled_stylesheets(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for (tag, content) in BUNDLED_STYLESHEETS {
        let path = dir.join(format!("{tag}.xsl"));
        if fs::read_to_string(&path).ok().as_deref() != Some(content) {
            fs::write(&path, content)?;
        }
    }
    Ok(())
}

/// Short tag used to find a stylesheet for a media type.
///
/// `application/vnd.oasis.opendocument.text+xml` becomes
/// `oasis.opendocument.text`, `application/tei+xml` becomes `tei`.
pub fn format_tag(media_type: &str) -> Option<String> {
    let tag = media_type
        .strip_prefix("application/")
        .or_else(|| media_type.strip_prefix("text/"))
        .unwrap_or(media_type);
    let tag = tag.strip_suffix("+xml").unwrap_or(tag);
    let tag = tag.strip_prefix("vnd.").unwrap_or(tag);
    FORMAT_TAG_REGEX.is_match(tag).then(|| tag.to_string())
}

pub struct XmlExtractor {
    runner: Arc<dyn CommandRunner>,
    identifiers: Arc<IdentifierTable>,
    stylesheet_dir: Option<PathBuf>,
    chunk_size: usize,
    xslt_processor: String,
}

impl XmlExtractor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            identifiers: Arc::new(IdentifierTable::bundled()),
            stylesheet_dir: bundled_stylesheet_dir(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            xslt_processor: DEFAULT_XSLT_PROCESSOR.to_string(),
        }
    }

    pub fn with_identifiers(mut self, identifiers: Arc<IdentifierTable>) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// `None` disables XSLT entirely
    pub fn with_stylesheet_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.stylesheet_dir = dir;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_xslt_processor(mut self, processor: &str) -> Self {
        self.xslt_processor = processor.to_string();
        self
    }

    pub fn identifiers(&self) -> &IdentifierTable {
        &self.identifiers
    }

    /// Refined media type of a document, or `None` when nothing in its
    /// head maps to a known type
    pub fn sniff_media_type(&self, path: &Path) -> io::Result<Option<MediaType>> {
        sniff::sniff_media_type(path, &self.identifiers)
    }

    /// Stylesheet for `tag`, if one exists and has content
    pub fn stylesheet_for(&self, tag: &str) -> Option<PathBuf> {
        let path = self.stylesheet_dir.as_ref()?.join(format!("{tag}.xsl"));
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
            _ => None,
        }
    }

    fn xslt_args(
        &self,
        stylesheet: &Path,
        path: &Path,
        options: &ExtractionOptions,
    ) -> Result<Vec<OsString>, ExtractError> {
        let mut args: Vec<OsString> = vec!["--nonet".into(), "--novalid".into()];
        for (key, value) in options.iter() {
            if !PARAM_NAME_REGEX.is_match(key) {
                return Err(ExtractError::invalid_option(
                    key,
                    value,
                    "not a valid stylesheet parameter name",
                ));
            }
            args.push("--stringparam".into());
            args.push(key.into());
            args.push(value.to_string().into());
        }
        args.push(file_arg(stylesheet));
        args.push(file_arg(path));
        Ok(args)
    }

    fn transform(
        &self,
        stylesheet: &Path,
        path: &Path,
        options: &ExtractionOptions,
    ) -> Result<Option<ExtractionResult>, ExtractError> {
        let args = self.xslt_args(stylesheet, path, options)?;

        let Some(program) = self.runner.locate(&self.xslt_processor) else {
            info!(
                "{} not found, falling back to text content for {}",
                self.xslt_processor,
                path.display()
            );
            return Ok(None);
        };

        let result = match self.runner.run(&program, &args) {
            Ok(output) if output.success() => ExtractionResult::Text(output.stdout_string()),
            Ok(output) => {
                error!(
                    "Transform of {} with {} failed with status {:?}",
                    path.display(),
                    stylesheet.display(),
                    output.status
                );
                ExtractionResult::NotExtracted
            }
            Err(e) => {
                error!(
                    "Transform of {} with {} failed: {e:#}",
                    path.display(),
                    stylesheet.display()
                );
                ExtractionResult::NotExtracted
            }
        };
        Ok(Some(result))
    }
}

impl Extractor for XmlExtractor {
    fn name(&self) -> &str {
        "xml"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractionOptions,
        _context: ExecutionContext,
    ) -> Result<ExtractionResult, ExtractError> {
        match check_well_formed(path, self.chunk_size) {
            Ok(errors) if errors.is_empty() => {}
            Ok(errors) => {
                error!("{} is not well-formed XML ({} errors)", path.display(), errors.len());
                for e in &errors {
                    error!("{}: {e}", path.display());
                }
                return Ok(ExtractionResult::NotExtracted);
            }
            Err(e) => {
                error!("Cannot read {}: {e}", path.display());
                return Ok(ExtractionResult::NotExtracted);
            }
        }

        let media_type = match self.sniff_media_type(path) {
            Ok(media_type) => media_type,
            Err(e) => {
                error!("Cannot read {}: {e}", path.display());
                return Ok(ExtractionResult::NotExtracted);
            }
        };
        debug!("Sniffed {} as {:?}", path.display(), media_type);

        let stylesheet = media_type
            .as_deref()
            .and_then(format_tag)
            .and_then(|tag| self.stylesheet_for(&tag));

        if let Some(stylesheet) = stylesheet {
            if let Some(result) = self.transform(&stylesheet, path, options)? {
                return Ok(result);
            }
        }

        match text::document_text(path, self.chunk_size) {
            Ok(text) => Ok(ExtractionResult::Text(text)),
            Err(e) => {
                error!("{e:#}");
                Ok(ExtractionResult::NotExtracted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use tempfile::{tempdir, TempDir};

    const FLAT_ODT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2" office:mimetype="application/vnd.oasis.opendocument.text">
  <office:body><office:text><text:p>Hello</text:p><text:p>World</text:p></office:text></office:body>
</office:document>
"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn extractor(runner: &ScriptedRunner, stylesheets: Option<PathBuf>) -> XmlExtractor {
        XmlExtractor::new(Arc::new(runner.clone())).with_stylesheet_dir(stylesheets)
    }

    fn run(xml: &XmlExtractor, path: &Path, options: &ExtractionOptions) -> ExtractionResult {
        xml.extract(path, options, ExecutionContext::Foreground).unwrap()
    }

    #[test]
    fn test_format_tag() {
        assert_eq!(
            format_tag("application/vnd.oasis.opendocument.text+xml").as_deref(),
            Some("oasis.opendocument.text")
        );
        assert_eq!(format_tag("application/tei+xml").as_deref(), Some("tei"));
        assert_eq!(format_tag("text/xml").as_deref(), Some("xml"));
        assert_eq!(format_tag("image/svg+xml").as_deref(), None);
        assert_eq!(format_tag("application/../etc/passwd"), None);
        assert_eq!(format_tag("application/.hidden+xml"), None);
    }

    #[test]
    fn test_malformed_document_is_not_extracted() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "broken.xml", "<root>\n  <a>\n    <b>text</a>\n</root>\n");
        let runner = ScriptedRunner::new().respond("xsltproc", "never", 0);

        assert_eq!(run(&extractor(&runner, None), &path, &ExtractionOptions::new()), ExtractionResult::NotExtracted);
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_stylesheet_output_wins_over_text_content() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "letter.fodt", FLAT_ODT);
        let xsl = tempdir().unwrap();
        write(&xsl, "oasis.opendocument.text.xsl", "<xsl:stylesheet/>");
        let runner = ScriptedRunner::new().respond("xsltproc", "Hello\nWorld\n", 0);

        let xml = extractor(&runner, Some(xsl.path().to_path_buf()));
        let result = run(&xml, &path, &ExtractionOptions::new());
        assert_eq!(result, ExtractionResult::Text("Hello\nWorld\n".to_string()));

        let args = runner.calls()[0].args_lossy();
        assert_eq!(args[0], "--nonet");
        assert_eq!(args[1], "--novalid");
        assert!(args[2].ends_with("oasis.opendocument.text.xsl"));
        assert_eq!(args[3], path.display().to_string());
    }

    #[test]
    fn test_options_become_stylesheet_params() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "letter.fodt", FLAT_ODT);
        let xsl = tempdir().unwrap();
        write(&xsl, "oasis.opendocument.text.xsl", "<xsl:stylesheet/>");
        let runner = ScriptedRunner::new().respond("xsltproc", "x", 0);
        let xml = extractor(&runner, Some(xsl.path().to_path_buf()));

        run(&xml, &path, &ExtractionOptions::new().with("separator", " | ").with("depth", 2));
        let args = runner.calls()[0].args_lossy();
        assert_eq!(
            &args[2..8],
            ["--stringparam", "depth", "2", "--stringparam", "separator", " | "]
        );

        let bad = xml.extract(
            &path,
            &ExtractionOptions::new().with("bad name", "x"),
            ExecutionContext::Foreground,
        );
        assert!(matches!(bad, Err(ExtractError::InvalidOption { .. })));
    }

    #[test]
    fn test_without_stylesheet_falls_back_to_text_content() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "letter.fodt", FLAT_ODT);
        let empty_dir = tempdir().unwrap();
        write(&empty_dir, "oasis.opendocument.text.xsl", "");
        let runner = ScriptedRunner::new().respond("xsltproc", "unused", 0);

        let result = run(&extractor(&runner, Some(empty_dir.path().to_path_buf())), &path, &ExtractionOptions::new());
        assert_eq!(result.text().map(str::trim), Some("HelloWorld"));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_missing_processor_falls_back_to_text_content() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "letter.fodt", FLAT_ODT);
        let xsl = tempdir().unwrap();
        write(&xsl, "oasis.opendocument.text.xsl", "<xsl:stylesheet/>");

        let result = run(&extractor(&ScriptedRunner::new(), Some(xsl.path().to_path_buf())), &path, &ExtractionOptions::new());
        assert_eq!(result.text().map(str::trim), Some("HelloWorld"));
    }

    #[test]
    fn test_failed_transform_is_not_extracted() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "letter.fodt", FLAT_ODT);
        let xsl = tempdir().unwrap();
        write(&xsl, "oasis.opendocument.text.xsl", "<xsl:stylesheet/>");
        let runner = ScriptedRunner::new().respond("xsltproc", "", 5);

        let result = run(&extractor(&runner, Some(xsl.path().to_path_buf())), &path, &ExtractionOptions::new());
        assert_eq!(result, ExtractionResult::NotExtracted);
    }

    #[test]
    fn test_unknown_vocabulary_uses_text_content() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "stock.xml", "<inventory><item>bolts</item> <item>nuts</item></inventory>");
        let result = run(&extractor(&ScriptedRunner::new(), bundled_stylesheet_dir()), &path, &ExtractionOptions::new());
        assert_eq!(result, ExtractionResult::Text("bolts nuts".to_string()));
    }

    #[test]
    fn test_sniffed_type_uses_configured_table() {
        let dir = tempdir().unwrap();
        let path = write(&dir, "ledger.xml", "<ledger xmlns=\"urn:example:ledger\"/>");
        let table = IdentifierTable::default().with_entry("urn:example:ledger", "application/vnd.example.ledger+xml");
        let xml = XmlExtractor::new(Arc::new(ScriptedRunner::new())).with_identifiers(Arc::new(table));
        assert_eq!(
            xml.sniff_media_type(&path).unwrap().as_deref(),
            Some("application/vnd.example.ledger+xml")
        );
    }

    #[test]
    fn test_dash_prefixed_paths_are_not_flags() {
        let xml = extractor(&ScriptedRunner::new(), None);
        let args = xml
            .xslt_args(Path::new("-x.xsl"), Path::new("-o.xml"), &ExtractionOptions::new())
            .unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--nonet", "--novalid", "./-x.xsl", "./-o.xml"]);
    }

    #[test]
    fn test_internal_entities_reach_text_content() {
        let dir = tempdir().unwrap();
        let path = write(
            &dir,
            "made.xml",
            "<!DOCTYPE doc [<!ENTITY org \"Acme\">]>\n<doc>Made by &org;</doc>\n",
        );
        let result = run(&extractor(&ScriptedRunner::new(), None), &path, &ExtractionOptions::new());
        assert_eq!(result, ExtractionResult::Text("Made by Acme".to_string()));
    }

    #[test]
    fn test_compiled_in_stylesheets_are_written_out() {
        let dir = tempdir().unwrap();
        let xsl_dir = dir.path().join("xsl");
        write_bundled_stylesheets(&xsl_dir).unwrap();
        // Second run leaves matching files in place
        write_bundled_stylesheets(&xsl_dir).unwrap();

        let xml = extractor(&ScriptedRunner::new(), Some(xsl_dir.clone()));
        for tag in ["oasis.opendocument.text", "tei", "alto"] {
            let written = xml.stylesheet_for(tag).unwrap();
            let source = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("data/xsl")
                .join(format!("{tag}.xsl"));
            assert_eq!(
                fs::read_to_string(written).unwrap(),
                fs::read_to_string(source).unwrap()
            );
        }
        assert_eq!(xml.stylesheet_for("docbook"), None);
    }

    #[test]
    fn test_missing_file_is_not_extracted() {
        let xml = extractor(&ScriptedRunner::new(), None);
        assert!(xml.is_available());
        assert_eq!(
            run(&xml, Path::new("/nonexistent/doc.xml"), &ExtractionOptions::new()),
            ExtractionResult::NotExtracted
        );
    }
}
