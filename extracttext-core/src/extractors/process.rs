//! Process-backed extractors
//!
//! Wraps command line converters. Each [`CliTool`] knows its binary, how to
//! build an argument list for a file, and whether it may only run in a
//! background context. [`ProcessExtractor`] does the rest: context gate,
//! option validation, binary lookup, execution and output checks.

use crate::command::CommandRunner;
use crate::extractors::file_arg;
use crate::extractors::traits::{ExtractError, Extractor};
use crate::types::{ExecutionContext, ExtractionOptions, ExtractionResult};
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static LANGUAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+(\+[A-Za-z0-9_]+)*$").unwrap());

/// OCR defaults when the caller passes no `l`, `psm` or `oem`
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
pub const DEFAULT_OCR_PSM: i64 = 3;
pub const DEFAULT_OCR_OEM: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CliTool {
    /// OCR for images
    Tesseract,
    /// PDF text layer
    Pdftotext,
    /// Legacy Word and RTF
    Catdoc,
    /// Office Open XML documents
    Docx2txt,
    /// HTML rendered as text
    Lynx,
}

impl CliTool {
    pub const ALL: [CliTool; 5] = [
        CliTool::Tesseract,
        CliTool::Pdftotext,
        CliTool::Catdoc,
        CliTool::Docx2txt,
        CliTool::Lynx,
    ];

    /// Registry key
    pub fn key(&self) -> &'static str {
        self.binary()
    }

    pub fn binary(&self) -> &'static str {
        match self {
            CliTool::Tesseract => "tesseract",
            CliTool::Pdftotext => "pdftotext",
            CliTool::Catdoc => "catdoc",
            CliTool::Docx2txt => "docx2txt",
            CliTool::Lynx => "lynx",
        }
    }

    /// Long-running tools must stay off the foreground path
    pub fn requires_background(&self) -> bool {
        matches!(self, CliTool::Tesseract)
    }

    /// Tools for which empty stdout is a real answer (blank page)
    pub fn allows_empty_output(&self) -> bool {
        matches!(self, CliTool::Tesseract | CliTool::Pdftotext)
    }

    /// Build the argument list for `file`. Output always goes to stdout.
    pub fn build_args(&self, file: &Path, options: &ExtractionOptions) -> Result<Vec<OsString>, ExtractError> {
        let file = file_arg(file);
        let args = match self {
            CliTool::Tesseract => {
                let language = ocr_language(options)?;
                let psm = ranged_integer(options, "psm", DEFAULT_OCR_PSM, 0..=13)?;
                let oem = ranged_integer(options, "oem", DEFAULT_OCR_OEM, 0..=3)?;
                vec![
                    file,
                    "-".into(), // outputbase (stdout)
                    "-l".into(),
                    language.into(),
                    "--psm".into(),
                    psm.to_string().into(),
                    "--oem".into(),
                    oem.to_string().into(),
                    "quiet".into(), // config file: suppress the info line
                ]
            }
            CliTool::Pdftotext => vec!["-enc".into(), "UTF-8".into(), file, "-".into()],
            CliTool::Catdoc => vec!["-d".into(), "utf-8".into(), file],
            CliTool::Docx2txt => vec![file, "-".into()],
            CliTool::Lynx => vec![
                "-dump".into(),
                "-nolist".into(),
                "-force_html".into(),
                "-display_charset=utf-8".into(),
                file,
            ],
        };
        Ok(args)
    }
}

fn ocr_language(options: &ExtractionOptions) -> Result<String, ExtractError> {
    let Some(value) = options.get("l") else {
        return Ok(DEFAULT_OCR_LANGUAGE.to_string());
    };
    let language = value.to_string();
    if LANGUAGE_REGEX.is_match(&language) {
        Ok(language)
    } else {
        Err(ExtractError::invalid_option(
            "l",
            value,
            "expected language codes like `eng` or `eng+fra`",
        ))
    }
}

fn ranged_integer(
    options: &ExtractionOptions,
    key: &str,
    default: i64,
    range: std::ops::RangeInclusive<i64>,
) -> Result<i64, ExtractError> {
    let Some(value) = options.get(key) else {
        return Ok(default);
    };
    match value.as_integer() {
        Some(n) if range.contains(&n) => Ok(n),
        _ => Err(ExtractError::invalid_option(
            key,
            value,
            &format!("expected an integer in {}..={}", range.start(), range.end()),
        )),
    }
}

pub struct ProcessExtractor {
    tool: CliTool,
    runner: Arc<dyn CommandRunner>,
    /// Configured options; the caller's options win on conflict
    defaults: ExtractionOptions,
}

impl ProcessExtractor {
    pub fn new(tool: CliTool, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            tool,
            runner,
            defaults: ExtractionOptions::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: ExtractionOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn tool(&self) -> CliTool {
        self.tool
    }

    fn command_path(&self) -> Option<PathBuf> {
        self.runner.locate(self.tool.binary())
    }
}

impl Extractor for ProcessExtractor {
    fn name(&self) -> &str {
        self.tool.key()
    }

    fn is_available(&self) -> bool {
        self.command_path().is_some()
    }

    fn extract(
        &self,
        path: &Path,
        options: &ExtractionOptions,
        context: ExecutionContext,
    ) -> Result<ExtractionResult, ExtractError> {
        if self.tool.requires_background() && context != ExecutionContext::Background {
            debug!(
                "{} only runs in background context, skipping {}",
                self.tool.key(),
                path.display()
            );
            return Ok(ExtractionResult::NotExtracted);
        }

        let args = self.tool.build_args(path, &self.defaults.merged(options))?;

        let Some(program) = self.command_path() else {
            info!("{} not found, cannot extract {}", self.tool.binary(), path.display());
            return Ok(ExtractionResult::NotExtracted);
        };

        let output = match self.runner.run(&program, &args) {
            Ok(output) => output,
            Err(e) => {
                warn!("{} failed on {}: {e:#}", self.tool.binary(), path.display());
                return Ok(ExtractionResult::NotExtracted);
            }
        };

        if !output.success() {
            warn!(
                "{} exited with {:?} on {}",
                self.tool.binary(),
                output.status,
                path.display()
            );
            return Ok(ExtractionResult::NotExtracted);
        }

        let text = output.stdout_string().trim().to_string();
        if text.is_empty() && !self.tool.allows_empty_output() {
            warn!("{} produced no output for {}", self.tool.binary(), path.display());
            return Ok(ExtractionResult::NotExtracted);
        }

        Ok(ExtractionResult::Text(text))
    }
}
