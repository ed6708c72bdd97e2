//! Test utilities for mtpack-lib.
//!
//! Cross-platform shell helpers and a recording [`CommandRunner`] that lets
//! pipeline tests assert exactly which external commands would run.

use std::sync::Mutex;

use crate::exec::{CommandOutput, CommandRunner, CommandSpec, ExecError};

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

type Responder = Box<dyn Fn(&CommandSpec) -> CommandOutput + Send + Sync>;

/// Records every command instead of running it.
///
/// Each call is answered by the responder; the default responder reports
/// success with empty output.
pub struct RecordingRunner {
  calls: Mutex<Vec<CommandSpec>>,
  responder: Responder,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::with_responder(|_| ok(""))
  }

  pub fn with_responder(responder: impl Fn(&CommandSpec) -> CommandOutput + Send + Sync + 'static) -> Self {
    Self {
      calls: Mutex::new(Vec::new()),
      responder: Box::new(responder),
    }
  }

  pub fn calls(&self) -> Vec<CommandSpec> {
    self.calls.lock().unwrap().clone()
  }

  /// True if any recorded command mentions `needle`.
  pub fn ran(&self, needle: &str) -> bool {
    self.calls().iter().any(|c| c.mentions(needle))
  }
}

impl CommandRunner for RecordingRunner {
  async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
    self.calls.lock().unwrap().push(spec.clone());
    Ok((self.responder)(spec))
  }
}

/// A successful output with the given stdout.
pub fn ok(stdout: &str) -> CommandOutput {
  CommandOutput {
    code: Some(0),
    stdout: stdout.to_string(),
    stderr: String::new(),
  }
}

/// A failed output with the given exit code and stderr.
pub fn failed(code: i32, stderr: &str) -> CommandOutput {
  CommandOutput {
    code: Some(code),
    stdout: String::new(),
    stderr: stderr.to_string(),
  }
}
