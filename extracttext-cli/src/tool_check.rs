//! Tool check - reports which external converters are installed
//!
//! The extractors degrade quietly when a binary is missing; this is where
//! the CLI tells the user what is missing and how to get it. Also owns the
//! per-user data directory the default store lives in.

use anyhow::{anyhow, Result};
use extracttext_core::{CliTool, CommandRunner, ExtractConfig};
use std::path::PathBuf;

/// One binary the extractors may call
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub binary: String,
    /// Extractor key that needs it
    pub used_by: &'static str,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_installed(&self) -> bool {
        self.path.is_some()
    }

    /// Package that usually provides the binary
    pub fn install_hint(&self) -> &'static str {
        match self.binary.as_str() {
            "tesseract" => "tesseract-ocr (apt) / tesseract (brew)",
            "pdftotext" => "poppler-utils (apt) / poppler (brew)",
            "catdoc" => "catdoc (apt, brew)",
            "docx2txt" => "docx2txt (apt, brew)",
            "lynx" => "lynx (apt, brew)",
            "xsltproc" => "xsltproc (apt) / libxslt (brew)",
            _ => "see your package manager",
        }
    }
}

/// Checks binaries through the same runner the extractors use
pub struct ToolCheck<'a> {
    runner: &'a dyn CommandRunner,
    xslt_processor: String,
}

impl<'a> ToolCheck<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &ExtractConfig) -> Self {
        Self {
            runner,
            xslt_processor: config.xml.xslt_processor.clone(),
        }
    }

    pub fn statuses(&self) -> Vec<ToolStatus> {
        let mut statuses: Vec<ToolStatus> = CliTool::ALL
            .iter()
            .map(|tool| ToolStatus {
                binary: tool.binary().to_string(),
                used_by: tool.key(),
                path: self.runner.locate(tool.binary()),
            })
            .collect();
        statuses.push(ToolStatus {
            binary: self.xslt_processor.clone(),
            used_by: "xml",
            path: self.runner.locate(&self.xslt_processor),
        });
        statuses
    }

    pub fn missing(&self) -> Vec<ToolStatus> {
        self.statuses()
            .into_iter()
            .filter(|s| !s.is_installed())
            .collect()
    }
}

/// Base directory for extracttext data (e.g., ~/.local/share/extracttext)
pub fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine local data directory"))?;
    Ok(base.join("extracttext"))
}

/// Where `init`, `set-media`, `aggregate` and `show` keep values by default
pub fn default_store_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("store"))
}
