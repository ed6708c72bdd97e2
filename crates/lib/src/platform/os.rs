use std::fmt;

/// Operating system variants a frozen build can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "macos",
      Self::Windows => "windows",
    }
  }

  /// Name used in release archive names (`MTools_Darwin_arm64.tar.gz`).
  pub fn release_name(&self) -> &'static str {
    match self {
      Self::Linux => "Linux",
      Self::MacOs => "Darwin",
      Self::Windows => "Windows",
    }
  }

  /// Icon files the frozen app needs on this OS, relative to the assets dir.
  pub fn icon_file(&self) -> &'static str {
    match self {
      Self::Linux => "icon.png",
      Self::MacOs => "icon.icns",
      Self::Windows => "icon.ico",
    }
  }

  /// Icon files shipped in the assets dir that are dead weight on this OS.
  pub fn foreign_icons(&self) -> &'static [&'static str] {
    match self {
      Self::Linux => &["icon.ico", "icon.icns"],
      Self::MacOs => &["icon.ico"],
      Self::Windows => &["icon.icns"],
    }
  }

  /// File name the freezer gives the main executable.
  pub fn executable_name(&self, app_name: &str) -> String {
    match self {
      Self::Linux => format!("{}.bin", app_name),
      Self::MacOs => app_name.to_string(),
      Self::Windows => format!("{}.exe", app_name),
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_returns_supported_os() {
    assert!(Os::current().is_some(), "Current OS should be supported");
  }

  #[test]
  fn macos_releases_as_darwin() {
    assert_eq!(Os::MacOs.release_name(), "Darwin");
  }

  #[test]
  fn executable_names_follow_freezer_conventions() {
    assert_eq!(Os::Windows.executable_name("MTools"), "MTools.exe");
    assert_eq!(Os::Linux.executable_name("MTools"), "MTools.bin");
    assert_eq!(Os::MacOs.executable_name("MTools"), "MTools");
  }

  #[test]
  fn own_icon_is_never_foreign() {
    for os in [Os::Linux, Os::MacOs, Os::Windows] {
      assert!(!os.foreign_icons().contains(&os.icon_file()));
    }
  }
}
