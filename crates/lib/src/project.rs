//! Project configuration.
//!
//! The project file (`mtpack.toml`) lives at the project root and describes
//! the application being frozen. Every key is optional; a missing file means
//! all defaults. App name, version and description left unset here are read
//! from the app's own `APP_TITLE`, `APP_VERSION` and `APP_DESCRIPTION`
//! constants (see [`read_app_metadata`]).
//!
//! ```toml
//! [app]
//! name = "MTools - Multi-purpose toolbox"
//! version = "0.0.2-beta"
//! description = "MTools Desktop App"
//! company = "HG-ha"
//! main_script = "src/main.py"
//!
//! [paths]
//! assets_dir = "src/assets"
//! bin_dir = "bin"
//! app_config = "src/constants/app_config.py"
//!
//! [build]
//! mode = "release"
//! gpu_variant = "cuda"
//! jobs = 4
//!
//! [freeze]
//! exclude_modules = ["tkinter", "unittest"]
//!
//! [runtime]
//! toolkit = "flet"
//! version = "0.28.3"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_EXCLUDED_MODULES, PROJECT_FILENAME};
use crate::exec::CommandRunner;
use crate::toolchain::Launcher;
use crate::variant::{BuildMode, BuildRequest};

const DEFAULT_APP_NAME: &str = "MTools";
const DEFAULT_APP_VERSION: &str = "0.1.0";
const DEFAULT_APP_DESCRIPTION: &str = "MTools Desktop App";

/// Loads the app's config module by path and prints its metadata constants
/// as one JSON object on the last line.
const APP_METADATA_SCRIPT: &str = "\
import importlib.util, json, sys
spec = importlib.util.spec_from_file_location('app_config', sys.argv[1])
module = importlib.util.module_from_spec(spec)
spec.loader.exec_module(module)
keys = ('APP_TITLE', 'APP_VERSION', 'APP_DESCRIPTION')
print(json.dumps({k: getattr(module, k) for k in keys if isinstance(getattr(module, k, None), str)}))
";

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// Application metadata stamped into the frozen executable.
///
/// Unset name, version and description come from the app config module,
/// then from built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
  /// Display title. Only the part before ` - ` is used as the app name.
  pub name: Option<String>,
  pub version: Option<String>,
  pub description: Option<String>,
  pub company: String,
  /// Entry point handed to the freezer, relative to the project root.
  pub main_script: PathBuf,
}

impl Default for AppSection {
  fn default() -> Self {
    Self {
      name: None,
      version: None,
      description: None,
      company: "HG-ha".to_string(),
      main_script: PathBuf::from("src/main.py"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
  pub assets_dir: PathBuf,
  /// Root of the pre-staged third-party tool tree (`bin/<platform>/<tool>`).
  pub bin_dir: PathBuf,
  /// Python module defining `APP_TITLE`, `APP_VERSION` and `APP_DESCRIPTION`.
  pub app_config: PathBuf,
}

impl Default for PathsSection {
  fn default() -> Self {
    Self {
      assets_dir: PathBuf::from("src/assets"),
      bin_dir: PathBuf::from("bin"),
      app_config: PathBuf::from("src/constants/app_config.py"),
    }
  }
}

/// Project-level build defaults. The command line and `CUDA_VARIANT`
/// override every key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
  pub mode: Option<BuildMode>,
  pub gpu_variant: Option<String>,
  pub jobs: Option<u32>,
  pub upx: Option<bool>,
  pub upx_path: Option<PathBuf>,
}

impl BuildSection {
  /// Fill the keys `request` leaves unset from the project file.
  pub fn apply_to(&self, request: &mut BuildRequest) {
    request.mode = request.mode.or(self.mode);
    if request.gpu_variant.is_none() {
      request.gpu_variant = self.gpu_variant.clone();
    }
    request.jobs = request.jobs.or(self.jobs);
    request.upx = request.upx.or(self.upx);
    if request.upx_path.is_none() {
      request.upx_path = self.upx_path.clone();
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezeSection {
  pub exclude_modules: Vec<String>,
}

impl Default for FreezeSection {
  fn default() -> Self {
    Self {
      exclude_modules: DEFAULT_EXCLUDED_MODULES.iter().map(|m| m.to_string()).collect(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
  /// UI toolkit whose desktop client gets bundled.
  pub toolkit: String,
  /// Pin the expected client version. When unset, whatever the active
  /// environment has installed is expected.
  pub version: Option<String>,
}

impl Default for RuntimeSection {
  fn default() -> Self {
    Self {
      toolkit: "flet".to_string(),
      version: None,
    }
  }
}

/// Parsed `mtpack.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
  pub app: AppSection,
  pub paths: PathsSection,
  pub build: BuildSection,
  pub freeze: FreezeSection,
  pub runtime: RuntimeSection,
}

/// A project rooted at a directory, with its configuration resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
  pub root: PathBuf,
  pub file: ProjectFile,
}

impl Project {
  /// Load the project at `root`, falling back to defaults when the
  /// project file doesn't exist.
  pub fn load(root: &Path) -> Result<Self, ProjectError> {
    let root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let path = root.join(PROJECT_FILENAME);

    let file = match fs::read_to_string(&path) {
      Ok(content) => toml::from_str(&content).map_err(|source| ProjectError::Parse {
        path: path.clone(),
        source,
      })?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        warn!(path = %path.display(), "project file not found, using defaults");
        ProjectFile::default()
      }
      Err(source) => return Err(ProjectError::Read { path, source }),
    };

    debug!(root = %root.display(), app = ?file.app.name, "project loaded");
    Ok(Self { root, file })
  }

  /// Build a project from an in-memory configuration.
  pub fn with_file(root: PathBuf, file: ProjectFile) -> Self {
    Self { root, file }
  }

  /// App name without any ` - tagline` suffix.
  pub fn app_name(&self) -> &str {
    let name = self.file.app.name.as_deref().unwrap_or(DEFAULT_APP_NAME);
    name.split(" - ").next().unwrap_or(name)
  }

  pub fn version(&self) -> &str {
    self.file.app.version.as_deref().unwrap_or(DEFAULT_APP_VERSION)
  }

  pub fn description(&self) -> &str {
    self.file.app.description.as_deref().unwrap_or(DEFAULT_APP_DESCRIPTION)
  }

  pub fn app_config(&self) -> PathBuf {
    self.root.join(&self.file.paths.app_config)
  }

  /// Fill the app keys the project file leaves unset.
  pub fn apply_metadata(&mut self, metadata: AppMetadata) {
    let app = &mut self.file.app;
    app.name = app.name.take().or(metadata.title);
    app.version = app.version.take().or(metadata.version);
    app.description = app.description.take().or(metadata.description);
  }

  pub fn assets_dir(&self) -> PathBuf {
    self.root.join(&self.file.paths.assets_dir)
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.root.join(&self.file.paths.bin_dir)
  }

  pub fn main_script(&self) -> PathBuf {
    self.root.join(&self.file.app.main_script)
  }

  pub fn copyright(&self) -> String {
    format!("Copyright (C) 2025 by {}", self.file.app.company)
  }
}

/// Metadata constants defined by the app's own config module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppMetadata {
  #[serde(rename = "APP_TITLE")]
  pub title: Option<String>,
  #[serde(rename = "APP_VERSION")]
  pub version: Option<String>,
  #[serde(rename = "APP_DESCRIPTION")]
  pub description: Option<String>,
}

impl AppMetadata {
  /// Parse the JSON object the metadata script prints last.
  fn parse(stdout: &str) -> Option<Self> {
    let line = stdout.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    serde_json::from_str(line).ok()
  }
}

/// Read the app config module through the project's interpreter.
///
/// Returns `None` when the module doesn't exist or can't be evaluated; the
/// caller keeps its defaults in that case.
pub async fn read_app_metadata<R: CommandRunner>(
  runner: &R,
  launcher: &Launcher,
  project: &Project,
) -> Option<AppMetadata> {
  let path = project.app_config();
  if !path.is_file() {
    debug!(path = %path.display(), "no app config module");
    return None;
  }

  let spec = launcher
    .python(&project.root)
    .args(["-c", APP_METADATA_SCRIPT])
    .arg(path.to_string_lossy());
  let output = match runner.run(&spec).await {
    Ok(output) if output.success() => output,
    Ok(output) => {
      warn!(path = %path.display(), stderr = %output.stderr.trim(), "failed to read app config, using defaults");
      return None;
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "failed to read app config, using defaults");
      return None;
    }
  };

  match AppMetadata::parse(&output.stdout) {
    Some(metadata) => {
      info!(title = ?metadata.title, version = ?metadata.version, "read app config");
      Some(metadata)
    }
    None => {
      warn!(path = %path.display(), "app config printed no metadata, using defaults");
      None
    }
  }
}

/// Convert a version string to the 4-part numeric form Windows resources
/// require: pre-release and build suffixes are dropped, then the result is
/// padded or truncated to four parts.
pub fn file_version(version: &str) -> String {
  let clean = version.split(['-', '+']).next().unwrap_or_default();
  let mut parts: Vec<&str> = clean.split('.').filter(|p| !p.is_empty()).collect();
  while parts.len() < 4 {
    parts.push("0");
  }
  parts.truncate(4);
  parts.join(".")
}
