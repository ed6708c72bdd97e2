//! Stamp file recording what a staged runtime bundle contains.
//!
//! Stored next to the archive as `<archive>.stamp.json`:
//!
//! ```json
//! {
//!   "formatVersion": 1,
//!   "version": "0.28.3",
//!   "sourceHash": "9f2c...",
//!   "archive": ".flet.tar.gz",
//!   "createdAtUnix": 1733667300
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::BUNDLE_STAMP_SUFFIX;

/// Current stamp format version.
pub const STAMP_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleStamp {
  pub format_version: u32,
  /// Runtime client version the archive was staged from.
  pub version: String,
  /// Hash of the source client directory at staging time.
  pub source_hash: String,
  /// Archive file name, relative to the stamp's directory.
  pub archive: String,
  pub created_at_unix: u64,
}

#[derive(Debug, Error)]
pub enum StampError {
  #[error("failed to read stamp: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write stamp: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse stamp: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize stamp: {0}")]
  Serialize(#[source] serde_json::Error),
}

impl BundleStamp {
  pub fn new(version: &str, source_hash: &str, archive: &str) -> Self {
    let created_at_unix = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or(0);
    Self {
      format_version: STAMP_VERSION,
      version: version.to_string(),
      source_hash: source_hash.to_string(),
      archive: archive.to_string(),
      created_at_unix,
    }
  }

  /// Path of the stamp belonging to `archive`.
  pub fn path_for(archive: &Path) -> PathBuf {
    let mut name = archive.file_name().unwrap_or_default().to_os_string();
    name.push(BUNDLE_STAMP_SUFFIX);
    archive.with_file_name(name)
  }

  /// Load a stamp.
  ///
  /// Returns `Ok(None)` if the file doesn't exist or was written by a
  /// different stamp format, which callers treat as stale.
  pub fn load(path: &Path) -> Result<Option<Self>, StampError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(StampError::Read(e)),
    };

    let stamp: BundleStamp = serde_json::from_str(&content).map_err(StampError::Parse)?;
    if stamp.format_version != STAMP_VERSION {
      return Ok(None);
    }
    Ok(Some(stamp))
  }

  pub fn save(&self, path: &Path) -> Result<(), StampError> {
    let content = serde_json::to_string_pretty(self).map_err(StampError::Serialize)?;
    fs::write(path, content).map_err(StampError::Write)
  }
}
