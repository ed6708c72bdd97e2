//! Fingerprinting of the runtime client tree.
//!
//! The bundle stamp records the [`TreeHash`] of the client directory it was
//! staged from. Re-hashing the installed client tells a patched or reinstalled
//! client apart from the staged one even when its version string is unchanged.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to walk client tree: {0}")]
  Walk(#[from] walkdir::Error),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// SHA-256 over the layout and contents of a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeHash([u8; 32]);

impl fmt::Display for TreeHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&hex::encode(self.0))
  }
}

fn read_err(path: &Path) -> impl FnOnce(io::Error) -> HashError + '_ {
  move |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  }
}

fn file_digest(path: &Path) -> Result<[u8; 32], HashError> {
  let mut file = File::open(path).map_err(read_err(path))?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(read_err(path))?;
  Ok(hasher.finalize().into())
}

/// Hash the tree under `root`.
///
/// Each entry contributes its kind, its `/`-separated path relative to
/// `root` and, for files and symlinks, a digest of the contents or the link
/// target. Timestamps and permissions never count. Entries whose file name
/// is in `exclude` are skipped together with everything below them.
pub fn hash_tree(root: &Path, exclude: &[&str]) -> Result<TreeHash, HashError> {
  let walker = WalkDir::new(root)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  let mut tree = Sha256::new();
  for entry in walker {
    let entry = entry?;
    let path = entry.path();
    let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
    let file_type = entry.file_type();

    if file_type.is_dir() {
      tree.update(b"d ");
      tree.update(rel.as_bytes());
    } else if file_type.is_symlink() {
      let target = std::fs::read_link(path).map_err(read_err(path))?;
      tree.update(b"l ");
      tree.update(rel.as_bytes());
      tree.update(b" -> ");
      tree.update(target.to_string_lossy().as_bytes());
    } else if file_type.is_file() {
      tree.update(b"f ");
      tree.update(rel.as_bytes());
      tree.update(b" ");
      tree.update(file_digest(path)?);
    } else {
      continue;
    }
    tree.update(b"\n");
  }

  Ok(TreeHash(tree.finalize().into()))
}
