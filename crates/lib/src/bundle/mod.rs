//! Runtime client bundle staging.
//!
//! The UI toolkit needs its desktop client on first launch and would
//! otherwise download it. We archive the client from the active Python
//! environment into the project's assets (`.flet.zip` on Windows,
//! `.flet.tar.gz` elsewhere) so it is embedded in the frozen app.
//!
//! The archive is a versioned cache entry: a [`BundleStamp`] next to it
//! records the client version and a hash of the source directory, and
//! [`inspect`] decides staleness from it. Staging is a local copy, never a
//! network fetch.

pub mod stamp;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::BUNDLE_PARTIAL_SUFFIX;
use crate::exec::{CommandRunner, ExecError};
use crate::platform::Os;
use crate::toolchain::Launcher;
use crate::util::archive::{self, ArchiveError, ArchiveFormat};
use crate::util::hash::{HashError, hash_tree};

pub use stamp::{BundleStamp, StampError};

/// Entries of the client directory that do not count towards its hash.
const HASH_EXCLUDES: &[&str] = &["__pycache__"];

#[derive(Debug, Error)]
pub enum BundleMismatchError {
  #[error("runtime client version mismatch: expected {expected}, environment has {found}")]
  SourceVersion { expected: String, found: String },

  #[error("runtime client directory not found: {0} (run `uv sync` to install the toolkit)")]
  SourceMissing(PathBuf),

  #[error("runtime client directory is empty: {0}")]
  SourceEmpty(PathBuf),

  #[error("could not locate the {toolkit} runtime client in the environment: {message}")]
  Probe { toolkit: String, message: String },

  #[error("staged archive {archive} has no entries under {prefix}")]
  Verify { archive: PathBuf, prefix: String },

  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Stamp(#[from] StampError),

  #[error(transparent)]
  Exec(#[from] ExecError),

  #[error("io error: {0}")]
  Io(#[from] io::Error),
}

/// Where the toolkit's desktop client lives in the active environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSource {
  /// Directory of the toolkit's desktop package (e.g. `site-packages/flet_desktop`).
  pub package_dir: PathBuf,
  pub version: String,
}

impl RuntimeSource {
  /// The client tree to archive: `app/flet` on Windows, `app` elsewhere.
  pub fn client_dir(&self, os: Os, toolkit: &str) -> PathBuf {
    match os {
      Os::Windows => self.package_dir.join("app").join(toolkit),
      Os::Linux | Os::MacOs => self.package_dir.join("app"),
    }
  }
}

/// Ask the project's interpreter where the toolkit's desktop package is
/// installed and which version it is.
pub async fn probe_runtime_source<R: CommandRunner>(
  runner: &R,
  launcher: &Launcher,
  project_root: &Path,
  toolkit: &str,
) -> Result<RuntimeSource, BundleMismatchError> {
  let script = format!(
    "import pathlib, {t}_desktop, {t}.version; print(pathlib.Path({t}_desktop.__file__).parent); print({t}.version.version)",
    t = toolkit
  );
  let spec = launcher.python(project_root).args(["-c", script.as_str()]);
  let output = runner.run(&spec).await?;

  let probe_err = |message: String| BundleMismatchError::Probe {
    toolkit: toolkit.to_string(),
    message,
  };

  if !output.success() {
    return Err(probe_err(output.stderr.trim().to_string()));
  }

  let mut lines = output.stdout.lines().map(str::trim).filter(|l| !l.is_empty());
  match (lines.next(), lines.next()) {
    (Some(dir), Some(version)) => Ok(RuntimeSource {
      package_dir: PathBuf::from(dir),
      version: version.to_string(),
    }),
    _ => Err(probe_err(format!("unexpected probe output: {:?}", output.stdout))),
  }
}

/// Naming of the bundle archive for one project and OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
  pub assets_dir: PathBuf,
  pub toolkit: String,
  pub os: Os,
}

impl BundleLayout {
  pub fn new(assets_dir: impl Into<PathBuf>, toolkit: impl Into<String>, os: Os) -> Self {
    Self {
      assets_dir: assets_dir.into(),
      toolkit: toolkit.into(),
      os,
    }
  }

  pub fn format(&self) -> ArchiveFormat {
    ArchiveFormat::for_os(self.os)
  }

  pub fn archive_name(&self) -> String {
    format!(".{}.{}", self.toolkit, self.format().extension())
  }

  pub fn archive_path(&self) -> PathBuf {
    self.assets_dir.join(self.archive_name())
  }

  /// Every entry of a bundle for `version` lives under this prefix.
  pub fn entry_prefix(&self, version: &str) -> String {
    format!("bin/{}-{}", self.toolkit, version)
  }
}

/// A staged runtime client archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeClientBundle {
  pub archive_path: PathBuf,
  pub version: String,
  pub format: ArchiveFormat,
  /// True if this call wrote the archive, false if the cache was fresh.
  pub staged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleState {
  Missing,
  Stale { reason: String },
  Fresh,
}

fn archive_has_prefix(format: ArchiveFormat, archive: &Path, prefix: &str) -> Result<bool, ArchiveError> {
  let names = archive::list_entries(format, archive)?;
  let dir_prefix = format!("{}/", prefix);
  Ok(names.iter().any(|n| n.starts_with(&dir_prefix)))
}

/// Decide whether the staged archive matches `expected_version` and, when
/// given, the current source hash.
///
/// Without a stamp the archive's entries are checked for the expected
/// version prefix instead.
pub fn inspect(layout: &BundleLayout, expected_version: &str, source_hash: Option<&str>) -> BundleState {
  let archive_path = layout.archive_path();
  if !archive_path.is_file() {
    return BundleState::Missing;
  }

  match BundleStamp::load(&BundleStamp::path_for(&archive_path)) {
    Ok(Some(stamp)) => {
      if stamp.version != expected_version {
        return BundleState::Stale {
          reason: format!("staged {} but {} is installed", stamp.version, expected_version),
        };
      }
      if let Some(hash) = source_hash {
        if stamp.source_hash != hash {
          return BundleState::Stale {
            reason: "client files changed since staging".to_string(),
          };
        }
      }
      BundleState::Fresh
    }
    Ok(None) => match archive_has_prefix(layout.format(), &archive_path, &layout.entry_prefix(expected_version)) {
      Ok(true) => BundleState::Fresh,
      Ok(false) => BundleState::Stale {
        reason: format!("archive does not contain version {}", expected_version),
      },
      Err(e) => BundleState::Stale {
        reason: format!("archive unreadable: {}", e),
      },
    },
    Err(e) => BundleState::Stale {
      reason: e.to_string(),
    },
  }
}

/// Make sure the assets hold a bundle of `expected_version`, staging it from
/// `source` when missing or stale. A fresh bundle is left untouched.
pub fn ensure_runtime_bundle(
  layout: &BundleLayout,
  source: &RuntimeSource,
  expected_version: &str,
) -> Result<RuntimeClientBundle, BundleMismatchError> {
  if source.version != expected_version {
    return Err(BundleMismatchError::SourceVersion {
      expected: expected_version.to_string(),
      found: source.version.clone(),
    });
  }

  let client_dir = source.client_dir(layout.os, &layout.toolkit);
  let source_hash = if client_dir.is_dir() {
    Some(hash_tree(&client_dir, HASH_EXCLUDES)?.to_string())
  } else {
    None
  };

  match inspect(layout, expected_version, source_hash.as_deref()) {
    BundleState::Fresh => {
      info!(archive = %layout.archive_path().display(), version = expected_version, "runtime bundle up to date");
      Ok(RuntimeClientBundle {
        archive_path: layout.archive_path(),
        version: expected_version.to_string(),
        format: layout.format(),
        staged: false,
      })
    }
    BundleState::Missing => {
      info!("runtime bundle not found, staging");
      stage(layout, source)
    }
    BundleState::Stale { reason } => {
      info!(reason = %reason, "runtime bundle stale, restaging");
      stage(layout, source)
    }
  }
}

/// Archive the client tree from `source` into the assets unconditionally.
pub fn stage(layout: &BundleLayout, source: &RuntimeSource) -> Result<RuntimeClientBundle, BundleMismatchError> {
  let client_dir = source.client_dir(layout.os, &layout.toolkit);
  if !client_dir.is_dir() {
    return Err(BundleMismatchError::SourceMissing(client_dir));
  }
  if fs::read_dir(&client_dir)?.next().is_none() {
    return Err(BundleMismatchError::SourceEmpty(client_dir));
  }

  fs::create_dir_all(&layout.assets_dir)?;
  let archive_path = layout.archive_path();
  let stamp_path = BundleStamp::path_for(&archive_path);
  for stale in [&archive_path, &stamp_path] {
    if stale.exists() {
      fs::remove_file(stale)?;
      debug!(path = %stale.display(), "removed previous bundle file");
    }
  }

  let prefix = layout.entry_prefix(&source.version);
  let client_name = client_dir
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_default();
  let entry_root = format!("{}/{}", prefix, client_name);

  // Write next to the target and rename, so an interrupted run never leaves
  // a truncated archive that looks complete.
  let partial = layout.assets_dir.join(format!("{}{}", layout.archive_name(), BUNDLE_PARTIAL_SUFFIX));
  let files = archive::pack_dir(layout.format(), &client_dir, &entry_root, &partial)?;
  fs::rename(&partial, &archive_path)?;

  if !archive_has_prefix(layout.format(), &archive_path, &prefix)? {
    warn!(archive = %archive_path.display(), "staged archive failed verification");
    return Err(BundleMismatchError::Verify {
      archive: archive_path,
      prefix,
    });
  }

  let source_hash = hash_tree(&client_dir, HASH_EXCLUDES)?;
  BundleStamp::new(&source.version, &source_hash.to_string(), &layout.archive_name()).save(&stamp_path)?;

  let size = fs::metadata(&archive_path)?.len();
  info!(
    archive = %archive_path.display(),
    version = %source.version,
    files,
    bytes = size,
    "runtime bundle staged"
  );

  Ok(RuntimeClientBundle {
    archive_path,
    version: source.version.clone(),
    format: layout.format(),
    staged: true,
  })
}
