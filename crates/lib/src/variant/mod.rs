//! Build variant resolution.
//!
//! Turns a build request (mode, GPU variant and tuning knobs) into an
//! immutable [`BuildConfiguration`] and the [`DependencyManifest`] that the
//! Python environment must match. Resolution is pure: it never spawns a
//! process or touches the filesystem, so invalid input fails before any side
//! effect.

pub mod recipes;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::{CUDA_VARIANT_ENV, DEFAULT_JOBS};
use crate::platform::{Os, Platform};

pub use recipes::{BACKEND_DISTRIBUTIONS, Backend, PinnedPackage};

/// Errors in user-supplied build input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
  #[error("unknown GPU variant '{0}', expected one of: standard, cuda, cuda_full")]
  UnknownVariant(String),

  #[error("unknown build mode '{0}', expected one of: release, dev")]
  UnknownMode(String),

  #[error("GPU variant '{variant}' is not supported on {platform}")]
  UnsupportedVariant { variant: GpuVariant, platform: String },

  #[error("job count must be at least 1")]
  ZeroJobs,

  #[error("unsupported host platform: {os}/{arch}")]
  UnsupportedPlatform { os: String, arch: String },
}

/// Release builds are fully optimized with no console; dev builds compile
/// faster and keep the console attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
  #[default]
  Release,
  Dev,
}

impl BuildMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Release => "release",
      Self::Dev => "dev",
    }
  }
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for BuildMode {
  type Err = ConfigurationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "release" => Ok(Self::Release),
      "dev" => Ok(Self::Dev),
      _ => Err(ConfigurationError::UnknownMode(s.to_string())),
    }
  }
}

/// One of the mutually exclusive GPU dependency profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVariant {
  /// Platform-default acceleration (DirectML, CoreML or CPU).
  #[default]
  Standard,
  /// CUDA runtime expected on the user's machine.
  Cuda,
  /// CUDA runtime embedded in the build.
  CudaFull,
}

impl GpuVariant {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Standard => "standard",
      Self::Cuda => "cuda",
      Self::CudaFull => "cuda_full",
    }
  }

  /// Suffix appended to product and archive names so variants never
  /// collide in a release listing.
  pub fn suffix(&self) -> Option<&'static str> {
    match self {
      Self::Standard => None,
      Self::Cuda => Some("CUDA"),
      Self::CudaFull => Some("CUDA_FULL"),
    }
  }

  /// Parse an optional raw selector. Unset or blank means standard; anything
  /// unrecognized is an error, never silently defaulted.
  pub fn parse_selector(raw: Option<&str>) -> Result<Self, ConfigurationError> {
    match raw.map(str::trim) {
      None | Some("") => Ok(Self::Standard),
      Some(value) => value.parse(),
    }
  }

  /// Read the selector from the `CUDA_VARIANT` environment variable.
  pub fn from_env() -> Result<Self, ConfigurationError> {
    let raw = std::env::var(CUDA_VARIANT_ENV).ok();
    Self::parse_selector(raw.as_deref())
  }

  /// The backend this variant links against on `platform`.
  pub fn backend(&self, platform: &Platform) -> Result<Backend, ConfigurationError> {
    match (self, platform.os) {
      (Self::Standard, Os::Windows) => Ok(Backend::DirectMl),
      (Self::Standard, Os::MacOs) if platform.is_apple_silicon() => Ok(Backend::CoreMl),
      (Self::Standard, _) => Ok(Backend::Cpu),
      (Self::Cuda | Self::CudaFull, Os::MacOs) => Err(ConfigurationError::UnsupportedVariant {
        variant: *self,
        platform: platform.release_name(),
      }),
      (Self::Cuda, _) => Ok(Backend::Cuda),
      (Self::CudaFull, _) => Ok(Backend::CudaEmbedded),
    }
  }
}

impl fmt::Display for GpuVariant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for GpuVariant {
  type Err = ConfigurationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "standard" => Ok(Self::Standard),
      "cuda" => Ok(Self::Cuda),
      "cuda_full" => Ok(Self::CudaFull),
      _ => Err(ConfigurationError::UnknownVariant(s.to_string())),
    }
  }
}

/// Raw build input as collected from the command line and environment.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
  pub mode: Option<BuildMode>,
  /// Unparsed GPU variant selector, typically `CUDA_VARIANT`.
  pub gpu_variant: Option<String>,
  /// Freezer job count; defaults to 2 when unset.
  pub jobs: Option<u32>,
  /// UPX compression; off when unset.
  pub upx: Option<bool>,
  pub upx_path: Option<PathBuf>,
  pub mingw_path: Option<PathBuf>,
  /// Target platform; detected from the host when unset.
  pub platform: Option<Platform>,
}

/// Immutable settings for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
  pub mode: BuildMode,
  pub gpu_variant: GpuVariant,
  pub job_count: u32,
  pub upx_enabled: bool,
  pub upx_path: Option<PathBuf>,
  /// Only ever set on Windows.
  pub mingw_path: Option<PathBuf>,
  pub platform: Platform,
}

impl BuildConfiguration {
  /// Dev builds keep a console attached for diagnostics.
  pub fn console_visible(&self) -> bool {
    self.mode == BuildMode::Dev
  }

  /// Interpreter flags baked into the frozen executable.
  pub fn python_flags(&self) -> &'static [&'static str] {
    match self.mode {
      BuildMode::Release => &["-O", "no_site", "no_warnings"],
      BuildMode::Dev => &["no_site"],
    }
  }

  pub fn onefile_compression_disabled(&self) -> bool {
    self.mode == BuildMode::Release
  }

  pub fn variant_suffix(&self) -> Option<&'static str> {
    self.gpu_variant.suffix()
  }
}

/// A requirement the environment must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Requirement {
  pub name: String,
  pub extras: Vec<String>,
  pub version: String,
}

impl Requirement {
  /// Distribution name plus extras, e.g. `onnxruntime-gpu[cuda,cudnn]`.
  pub fn key(&self) -> String {
    if self.extras.is_empty() {
      self.name.clone()
    } else {
      format!("{}[{}]", self.name, self.extras.join(","))
    }
  }

  /// Installer specifier, e.g. `onnxruntime-gpu[cuda,cudnn]==1.22.0`.
  pub fn specifier(&self) -> String {
    format!("{}=={}", self.key(), self.version)
  }
}

impl From<&PinnedPackage> for Requirement {
  fn from(pkg: &PinnedPackage) -> Self {
    Self {
      name: pkg.name.to_string(),
      extras: pkg.extras.iter().map(|e| e.to_string()).collect(),
      version: pkg.version.to_string(),
    }
  }
}

/// The backend dependency set for one build.
///
/// `remove` must be applied in full before any of `packages` is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyManifest {
  pub backend: Backend,
  pub remove: Vec<String>,
  pub packages: Vec<Requirement>,
}

impl DependencyManifest {
  pub fn for_backend(backend: Backend) -> Self {
    let recipe = recipes::recipe_for(backend);
    Self {
      backend,
      remove: recipe.remove.iter().map(|n| n.to_string()).collect(),
      packages: recipe.add.iter().map(Requirement::from).collect(),
    }
  }
}

/// Resolve a build request into its configuration and dependency manifest.
pub fn resolve(request: &BuildRequest) -> Result<(BuildConfiguration, DependencyManifest), ConfigurationError> {
  let gpu_variant = GpuVariant::parse_selector(request.gpu_variant.as_deref())?;
  let mode = request.mode.unwrap_or_default();

  let job_count = request.jobs.unwrap_or(DEFAULT_JOBS);
  if job_count == 0 {
    return Err(ConfigurationError::ZeroJobs);
  }

  let platform = match request.platform {
    Some(platform) => platform,
    None => Platform::current().ok_or_else(|| ConfigurationError::UnsupportedPlatform {
      os: std::env::consts::OS.to_string(),
      arch: std::env::consts::ARCH.to_string(),
    })?,
  };

  let backend = gpu_variant.backend(&platform)?;

  let mingw_path = match (&request.mingw_path, platform.os) {
    (Some(path), Os::Windows) => Some(path.clone()),
    (Some(path), _) => {
      warn!(path = %path.display(), "--mingw64 only applies to Windows builds, ignoring");
      None
    }
    (None, _) => None,
  };

  let config = BuildConfiguration {
    mode,
    gpu_variant,
    job_count,
    upx_enabled: request.upx.unwrap_or(false),
    upx_path: request.upx_path.clone(),
    mingw_path,
    platform,
  };
  let manifest = DependencyManifest::for_backend(backend);

  debug!(
    mode = %config.mode,
    variant = %config.gpu_variant,
    backend = %backend,
    platform = %config.platform,
    "build resolved"
  );

  Ok((config, manifest))
}
