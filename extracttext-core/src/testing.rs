//! Testing utilities.
//!
//! [`ScriptedRunner`] stands in for the system command runner so extractors
//! can be exercised without tesseract, pdftotext or xsltproc installed.

use crate::command::{CommandOutput, CommandRunner};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Record of a call made to the scripted runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl RecordedCall {
    /// Arguments as lossy strings, for assertions
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// A command runner with canned binaries and responses.
///
/// Binaries are "installed" at `/usr/bin/<name>`. A response is keyed by
/// binary name; running a binary without one is reported as a spawn error.
#[derive(Default, Clone)]
pub struct ScriptedRunner {
    installed: Arc<RwLock<HashMap<String, PathBuf>>>,
    responses: Arc<RwLock<HashMap<String, CommandOutput>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `binary` locatable without a canned response
    pub fn install(self, binary: &str) -> Self {
        if let Ok(mut installed) = self.installed.write() {
            installed.insert(binary.to_string(), PathBuf::from("/usr/bin").join(binary));
        }
        self
    }

    /// Install `binary` and have it print `stdout` and exit with `status`
    pub fn respond(self, binary: &str, stdout: &str, status: i32) -> Self {
        let runner = self.install(binary);
        if let Ok(mut responses) = runner.responses.write() {
            responses.insert(
                binary.to_string(),
                CommandOutput {
                    stdout: stdout.as_bytes().to_vec(),
                    status: Some(status),
                },
            );
        }
        runner
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl CommandRunner for ScriptedRunner {
    fn locate(&self, binary: &str) -> Option<PathBuf> {
        self.installed.read().ok()?.get(binary).cloned()
    }

    fn run(&self, program: &Path, args: &[OsString]) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(RecordedCall {
                program: program.to_path_buf(),
                args: args.to_vec(),
            });
        }
        let binary = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.responses
            .read()
            .map_err(|_| anyhow!("scripted runner lock poisoned"))?
            .get(&binary)
            .cloned()
            .ok_or_else(|| anyhow!("failed to start: {}", program.display()))
    }
}
