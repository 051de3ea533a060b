//! External command execution
//!
//! Process-backed extractors never spawn anything themselves. They go
//! through a [`CommandRunner`], which finds binaries and runs them with an
//! argument list (no shell, no string joining). Hosts can swap in their
//! own runner; tests use a scripted one.

use crate::config::ExtractConfig;
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Output from a captured command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    /// Exit code, `None` when the process was killed by a signal
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

pub trait CommandRunner: Send + Sync {
    /// Absolute path of `binary`, or `None` when it is not installed
    fn locate(&self, binary: &str) -> Option<PathBuf>;

    /// Run `program` with `args` and capture stdout and exit status.
    ///
    /// A non-zero exit is not an error here; `Err` means the process could
    /// not be started, waited for, or was killed on timeout.
    fn run(&self, program: &Path, args: &[OsString]) -> Result<CommandOutput>;
}

/// Runner backed by `std::process`
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    overrides: HashMap<String, PathBuf>,
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` for `binary` instead of searching PATH
    pub fn with_override(mut self, binary: &str, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(binary.to_string(), path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Binary overrides and timeout from `config`
    pub fn from_config(config: &ExtractConfig) -> Self {
        let mut runner = Self::new().with_timeout(config.command_timeout());
        for (binary, path) in &config.binaries {
            runner = runner.with_override(binary, path);
        }
        runner
    }

    fn wait_with_timeout(&self, program: &Path, mut child: Child, timeout: Duration) -> Result<CommandOutput> {
        // Drain both pipes on their own threads so a chatty child can't block
        // on a full pipe while we poll for exit.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child
                .try_wait()
                .with_context(|| format!("failed to wait for: {}", program.display()))?
            {
                break status;
            }
            if Instant::now() >= deadline {
                // Already-exited races are fine: kill just reports an error we ignore.
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "{} timed out after {}s",
                    program.display(),
                    timeout.as_secs()
                ));
            }
            thread::sleep(Duration::from_millis(25));
        };

        let stdout = stdout
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();
        if let Some(handle) = stderr {
            let _ = handle.join();
        }

        Ok(CommandOutput {
            stdout,
            status: status.code(),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

impl CommandRunner for SystemCommandRunner {
    fn locate(&self, binary: &str) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(binary) {
            return path.is_file().then(|| path.clone());
        }
        which::which(binary).ok()
    }

    fn run(&self, program: &Path, args: &[OsString]) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            // Explicitly set stdin to null to prevent hanging on interactive prompts
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start: {}", program.display()))?;

        if let Some(timeout) = self.timeout {
            return self.wait_with_timeout(program, child, timeout);
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for: {}", program.display()))?;

        Ok(CommandOutput {
            stdout: output.stdout,
            status: output.status.code(),
        })
    }
}
