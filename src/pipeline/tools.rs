//! Launching external conversion tools.
//!
//! The pipeline never calls `Command` directly; it goes through a
//! [`ToolInvoker`] so tests can script tool behaviour without the USD
//! toolchain installed. [`ProcessToolInvoker`] is the real implementation.
//!
//! A tool's exit status is the only success signal. Output files are not
//! inspected, so a tool that exits 0 after writing garbage is a success.

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// How much of a failing tool's stderr we keep.
const STDERR_TAIL_BYTES: usize = 2048;

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// How a tool run ended, as far as the pipeline cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExit {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Tail of stderr, for diagnostics.
    pub stderr: String,
}

impl ToolExit {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external tools to completion.
///
/// `Err` means the process could not be started at all; a process that ran
/// and failed is `Ok` with a nonzero [`ToolExit::code`].
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, command: &ToolCommand) -> std::io::Result<ToolExit>;
}

/// Spawns real processes, found through `PATH`.
///
/// Child processes are not killed when the awaiting future is dropped: once
/// a step is launched it runs to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessToolInvoker;

#[async_trait]
impl ToolInvoker for ProcessToolInvoker {
    async fn invoke(&self, command: &ToolCommand) -> std::io::Result<ToolExit> {
        debug!("Running: {}", command);

        // Nothing reads stdout, and stderr is kept only as a bounded tail, so
        // a chatty tool cannot grow memory without limit.
        let mut child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut tail = Vec::new();
        if let Some(mut stderr) = child.stderr.take() {
            let mut buf = [0u8; 4096];
            loop {
                let n = stderr.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > 2 * STDERR_TAIL_BYTES {
                    // Keep a little over the tail so truncation stays visible.
                    tail.drain(..tail.len() - STDERR_TAIL_BYTES - 4);
                }
            }
        }
        let status = child.wait().await?;

        let exit = ToolExit {
            code: status.code(),
            stderr: stderr_tail(&tail),
        };

        if exit.is_success() {
            debug!("{} exited successfully", command.program);
        } else {
            warn!(
                "{} exited with {:?}: {}",
                command.program,
                exit.code,
                exit.stderr.trim_end()
            );
        }
        Ok(exit)
    }
}

/// Keep the last [`STDERR_TAIL_BYTES`] of `raw`, cut on a char boundary.
fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= STDERR_TAIL_BYTES {
        return text.into_owned();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}
