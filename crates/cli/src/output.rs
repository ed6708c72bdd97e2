//! Terminal output for mtpack commands.
//!
//! Status lines go to stdout except warnings and errors, which go to stderr
//! next to the tracing log. Field listings and manifest changes are indented
//! under a section heading so a build summary reads as one block.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Severity of a one-line status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Success,
  Info,
  Warning,
  Error,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Self::Success => "✓",
      Self::Info => "•",
      Self::Warning => "⚠",
      Self::Error => "✗",
    }
  }

  fn stream(self) -> Stream {
    match self {
      Self::Success | Self::Info => Stream::Stdout,
      Self::Warning | Self::Error => Stream::Stderr,
    }
  }
}

pub fn print_status(status: Status, message: &str) {
  let stream = status.stream();
  let binding = status.symbol();
  let symbol = binding.if_supports_color(stream, |s| match status {
    Status::Success => s.green().to_string(),
    Status::Info => s.blue().to_string(),
    Status::Warning => s.yellow().to_string(),
    Status::Error => s.red().to_string(),
  });
  match stream {
    Stream::Stdout => println!("{} {}", symbol, message),
    _ => eprintln!("{} {}", symbol, message),
  }
}

/// A section heading such as `Configuration:`.
pub fn print_section(title: &str) {
  println!("{}:", title.if_supports_color(Stream::Stdout, |s| s.bold()));
}

/// An indented `label: value` line under the current section.
pub fn print_field(label: &str, value: impl std::fmt::Display) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// A dependency manifest entry that leaves or enters the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
  Remove,
  Add,
}

pub fn print_change(change: Change, what: &str) {
  match change {
    Change::Remove => println!("  {} {}", "-".if_supports_color(Stream::Stdout, |s| s.red()), what),
    Change::Add => println!("  {} {}", "+".if_supports_color(Stream::Stdout, |s| s.green()), what),
  }
}

/// Archive sizes in binary units with one decimal.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Build times: whole seconds below an hour, `1h 02m` above.
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  match (secs / 3600, (secs % 3600) / 60, secs % 60) {
    (0, 0, 0) => format!("{}ms", elapsed.subsec_millis()),
    (0, 0, s) => format!("{}s", s),
    (0, m, s) => format!("{}m {:02}s", m, s),
    (h, m, _) => format!("{}h {:02}m", h, m),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
