//! External process execution.
//!
//! Every tool this crate drives (the package manager, the freezer, UPX,
//! probes) goes through a [`CommandRunner`], so the pipeline can be run
//! against a recording fake in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExecError {
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

/// How the child's stdout/stderr are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
  /// Capture both streams for parsing.
  #[default]
  Capture,
  /// Stream straight to our terminal, unmodified.
  Inherit,
}

/// A fully described process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  /// Variables set on top of the inherited environment.
  pub env: BTreeMap<String, String>,
  pub output: OutputMode,
}

impl CommandSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
      output: OutputMode::Capture,
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

  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn inherit_output(mut self) -> Self {
    self.output = OutputMode::Inherit;
    self
  }

  /// True if the program or any argument mentions `needle`.
  pub fn mentions(&self, needle: &str) -> bool {
    self.program.contains(needle) || self.args.iter().any(|a| a.contains(needle))
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code, `None` when killed by a signal.
  pub code: Option<i32>,
  /// Empty when output was inherited.
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs external commands.
pub trait CommandRunner {
  fn run(&self, spec: &CommandSpec) -> impl Future<Output = Result<CommandOutput, ExecError>> + Send;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
  async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
    info!(cmd = %spec, "executing command");

    let mut command = Command::new(&spec.program);
    command
      .args(&spec.args)
      .envs(&spec.env)
      .stdin(Stdio::null())
      .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
      command.current_dir(cwd);
    }

    match spec.output {
      OutputMode::Capture => {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
      }
      OutputMode::Inherit => {
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
      }
    }

    let output = command.output().await.map_err(|source| ExecError::Spawn {
      program: spec.program.clone(),
      source,
    })?;

    let result = CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };

    if !result.success() {
      if !result.stderr.is_empty() {
        debug!(stderr = %result.stderr, "command stderr");
      }
      if !result.stdout.is_empty() {
        debug!(stdout = %result.stdout, "command stdout");
      }
    }

    Ok(result)
  }
}
