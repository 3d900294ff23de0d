//! External tool invocation.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::exec::ExecContext;

/// Captured result of a finished tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    /// Most useful diagnostic text: stderr, or stdout when stderr is empty.
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() { self.stdout.trim() } else { stderr }
    }
}

/// A blocking external command that honours an [`ExecContext`].
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Short tool name for messages.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion, killing the process if the context is cancelled
    /// or its deadline passes. A non-zero exit is not an error here.
    pub fn run(&self, ctx: &ExecContext) -> Result<ToolOutput> {
        ctx.check()?;
        let name = self.name();
        debug!("Running {} {:?}", self.program.display(), self.args);
        let start = Instant::now();

        let output = ctx.block_on(async {
            let child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| spawn_error(&name, e))?;

            // Losing the race drops the child, which kills it.
            match ctx.guard(child.wait_with_output()).await {
                Ok(output) => output.map_err(|e| {
                    Error::with_source(ErrorKind::System, format!("failed to wait for {name}"), e)
                }),
                Err(interrupted) => {
                    warn!("Terminated {} ({})", name, interrupted.kind());
                    Err(interrupted.context(format!("{name} was terminated")))
                }
            }
        })??;

        let output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} finished with {} in {:?}", name, output.status, start.elapsed());
        Ok(output)
    }

    /// Like [`ToolCommand::run`], but a non-zero exit becomes a `System`
    /// error carrying the tool's diagnostics.
    pub fn run_checked(&self, ctx: &ExecContext) -> Result<ToolOutput> {
        let output = self.run(ctx)?;
        if !output.success() {
            return Err(Error::system(format!(
                "{} exited with {}: {}",
                self.name(),
                output.status,
                output.diagnostics()
            )));
        }
        Ok(output)
    }
}

/// Whether `program` can be executed: an existing file for paths, or a match
/// on `PATH` for bare names.
pub fn tool_available(program: &Path) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        let candidate = dir.join(program);
        candidate.is_file() || (cfg!(windows) && candidate.with_extension("exe").is_file())
    })
}

fn spawn_error(name: &str, err: std::io::Error) -> Error {
    match err.kind() {
        std::io::ErrorKind::NotFound => {
            Error::with_source(ErrorKind::NotFound, format!("tool not found: {name}"), err)
        }
        std::io::ErrorKind::PermissionDenied => {
            Error::with_source(ErrorKind::Permission, format!("cannot execute {name}"), err)
        }
        _ => Error::with_source(ErrorKind::System, format!("failed to start {name}"), err),
    }
}
