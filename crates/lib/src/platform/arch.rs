use std::fmt;

/// CPU architecture variants a frozen build can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
  X86,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    Self::from_machine(std::env::consts::ARCH)
  }

  /// Map a machine name as reported by the OS or a toolchain to an arch.
  ///
  /// Accepts the spellings used across platforms (`AMD64` on Windows,
  /// `aarch64` on Linux, `arm64` on macOS, `i686`).
  pub fn from_machine(machine: &str) -> Option<Self> {
    match machine.to_ascii_lowercase().as_str() {
      "x86_64" | "amd64" => Some(Self::X86_64),
      "aarch64" | "arm64" => Some(Self::Aarch64),
      "x86" | "i386" | "i686" => Some(Self::X86),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
      Self::X86 => "x86",
    }
  }

  /// Name used in release archive names.
  pub fn release_name(&self) -> &'static str {
    match self {
      Self::X86_64 => "amd64",
      Self::Aarch64 => "arm64",
      Self::X86 => "x86",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
