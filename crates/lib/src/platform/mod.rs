//! Target platform detection and naming.

pub mod arch;
pub mod os;

use std::fmt;

pub use arch::Arch;
pub use os::Os;

/// Platform identifier combining architecture and OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  /// Create a new platform identifier
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the release name used in product directories and archives
  /// (e.g., "Windows_amd64", "Darwin_arm64").
  pub fn release_name(&self) -> String {
    format!("{}_{}", self.os.release_name(), self.arch.release_name())
  }

  /// True on Apple Silicon, where the stock ONNX Runtime ships CoreML.
  pub fn is_apple_silicon(&self) -> bool {
    self.os == Os::MacOs && self.arch == Arch::Aarch64
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.arch, self.os)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn release_name_format() {
    let platform = Platform::new(Arch::X86_64, Os::Windows);
    assert_eq!(platform.release_name(), "Windows_amd64");

    let platform = Platform::new(Arch::Aarch64, Os::MacOs);
    assert_eq!(platform.release_name(), "Darwin_arm64");
  }

  #[test]
  fn apple_silicon_detection() {
    assert!(Platform::new(Arch::Aarch64, Os::MacOs).is_apple_silicon());
    assert!(!Platform::new(Arch::X86_64, Os::MacOs).is_apple_silicon());
    assert!(!Platform::new(Arch::Aarch64, Os::Linux).is_apple_silicon());
  }
}
