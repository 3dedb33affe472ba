//! External tool invocations (node, npm, dotnet).
//!
//! Output is always captured, never inherited from the parent terminal.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("Failed to run '{0}': {1}")]
    Io(String, std::io::Error),
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Human-readable command line, e.g. `npm run dev -- --port 3000`.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Program and arguments as actually executed. On Windows, package
    /// managers are batch shims, so everything goes through `cmd /c`.
    fn platform_argv(&self) -> (String, Vec<String>) {
        if cfg!(windows) {
            let mut args = vec!["/c".to_string(), self.program.clone()];
            args.extend(self.args.iter().cloned());
            ("cmd".to_string(), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }

    fn to_tokio(&self) -> tokio::process::Command {
        let (program, args) = self.platform_argv();
        let mut c = tokio::process::Command::new(program);
        c.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            c.current_dir(dir);
        }
        c
    }

    fn map_spawn_error(&self, e: std::io::Error) -> CommandError {
        if e.kind() == std::io::ErrorKind::NotFound {
            CommandError::NotFound(self.program.clone())
        } else {
            CommandError::Io(self.display(), e)
        }
    }

    /// Run to completion and capture stdout/stderr.
    pub async fn output(&self) -> Result<ToolOutput, CommandError> {
        let output = self
            .to_tokio()
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Start without waiting. stdout/stderr are piped for the caller to read.
    /// The child is not killed when its handle is dropped.
    pub fn spawn(&self) -> Result<tokio::process::Child, CommandError> {
        self.to_tokio()
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| self.map_spawn_error(e))
    }
}
