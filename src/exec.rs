//! External process execution
//!
//! Every external tool (git, go, protoc, sh) runs through the [`Executor`]
//! trait so the pipeline can be tested with spies. The system implementation
//! captures stdout, stderr and the exit code for error reporting; no
//! interactive input is forwarded.

use crate::error::{ProtopinError, ProtopinResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// A fully-rendered external command
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    /// Program name or path
    pub program: String,
    /// Arguments, already rendered
    pub args: Vec<String>,
    /// Working directory; inherited when `None`
    pub dir: Option<PathBuf>,
    /// Extra environment entries, appended to the inherited environment
    pub env: Vec<(String, String)>,
}

impl CommandRequest {
    /// Create a request for `program` with `args`
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            env: Vec::new(),
        }
    }

    /// Set the working directory
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Append an environment entry
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The command line as shown in logs and errors
    pub fn rendered(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    fn dir_display(&self) -> String {
        self.dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| ".".to_string())
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Narrow process-execution capability
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the command to completion and capture its output.
    ///
    /// A non-zero exit status is an error carrying the command line, working
    /// directory, exit code and captured output.
    async fn execute(&self, req: CommandRequest) -> ProtopinResult<CommandOutput>;
}

/// Executor backed by real child processes
pub struct SystemExecutor {
    dry_run: bool,
}

impl SystemExecutor {
    /// Create an executor that spawns processes
    pub fn new() -> Self {
        Self { dry_run: false }
    }

    /// Create an executor that logs commands instead of running them
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn execute(&self, req: CommandRequest) -> ProtopinResult<CommandOutput> {
        if self.dry_run {
            info!(command = %req.rendered(), dir = %req.dir_display(), "dry run");
            return Ok(CommandOutput::default());
        }

        let mut cmd = Command::new(&req.program);
        cmd.args(&req.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // cancellation of the owning task must not leave the child running
            .kill_on_drop(true);
        if let Some(dir) = &req.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &req.env {
            cmd.env(key, value);
        }

        debug!(command = %req.rendered(), dir = %req.dir_display(), "executing");
        let output = cmd.output().await.map_err(|e| ProtopinError::CommandSpawn {
            command: req.rendered(),
            source: e,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ProtopinError::CommandFailed {
                command: req.rendered(),
                dir: req.dir_display(),
                code: output.status.code().unwrap_or(1),
                stdout,
                stderr,
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}
