//! Child-process execution for external analysis tools
//!
//! Every tool invocation goes through a [`CommandRunner`]. The production
//! [`ProcessRunner`] spawns the program with piped output, enforces a hard
//! deadline and kills the child when the deadline passes or when the caller
//! drops the future (client went away).

use futures::future::BoxFuture;
use log::{debug, warn};
use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Bytes of output kept when reporting a failure
pub const DIAGNOSTIC_TAIL_BYTES: usize = 2048;

/// One external program invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Tool name used in logs and errors
    pub tool: String,
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(tool: &str, program: &str, timeout: Duration) -> Self {
        Self {
            tool: tool.to_string(),
            program: program.to_string(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Arguments as lossy strings, for assertions and logs
    pub fn args_lossy(&self) -> Vec<String> {
        self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful exit with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed exit with the given code and stderr
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: Some(code),
            success: false,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Exit status plus the tail of stderr (or stdout when stderr is empty)
    pub fn diagnostics(&self) -> String {
        let stream = if self.stderr.iter().any(|b| !b.is_ascii_whitespace()) {
            &self.stderr
        } else {
            &self.stdout
        };
        let status = match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        format!("{}: {}", status, output_tail(stream, DIAGNOSTIC_TAIL_BYTES).trim())
    }
}

/// Last `max` bytes of `bytes` as lossy UTF-8
pub fn output_tail(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} could not be started: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("{tool} I/O error while running: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    pub fn tool(&self) -> &str {
        match self {
            ToolError::Spawn { tool, .. } | ToolError::Timeout { tool, .. } | ToolError::Io { tool, .. } => tool,
        }
    }
}

/// Executes external commands on behalf of the analyzers
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: CommandSpec) -> BoxFuture<'_, Result<CommandOutput, ToolError>>;
}

/// Runs commands as real child processes
pub struct ProcessRunner {
    max_output_bytes: usize,
}

impl ProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }

    fn cap(&self, tool: &str, stream: &str, mut bytes: Vec<u8>) -> Vec<u8> {
        if bytes.len() > self.max_output_bytes {
            warn!("{} {} truncated from {} to {} bytes", tool, stream, bytes.len(), self.max_output_bytes);
            bytes.truncate(self.max_output_bytes);
        }
        bytes
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: CommandSpec) -> BoxFuture<'_, Result<CommandOutput, ToolError>> {
        Box::pin(async move {
            debug!("Executing {}: {} {:?}", spec.tool, spec.program, spec.args_lossy());
            let started = Instant::now();

            let child = Command::new(&spec.program)
                .args(&spec.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| ToolError::Spawn {
                    tool: spec.tool.clone(),
                    source,
                })?;

            // On timeout the wait future is dropped, which kills the child
            match timeout(spec.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => {
                    debug!(
                        "{} finished with {:?} in {:?}",
                        spec.tool,
                        output.status.code(),
                        started.elapsed()
                    );
                    Ok(CommandOutput {
                        exit_code: output.status.code(),
                        success: output.status.success(),
                        stdout: self.cap(&spec.tool, "stdout", output.stdout),
                        stderr: self.cap(&spec.tool, "stderr", output.stderr),
                    })
                }
                Ok(Err(source)) => Err(ToolError::Io { tool: spec.tool, source }),
                Err(_) => {
                    warn!("{} timed out after {:?}, killed", spec.tool, spec.timeout);
                    Err(ToolError::Timeout {
                        tool: spec.tool,
                        timeout: spec.timeout,
                    })
                }
            }
        })
    }
}


#[cfg(test)]
pub use scripted::ScriptedRunner;
