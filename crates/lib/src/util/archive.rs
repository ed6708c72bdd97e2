//! Archive writing and inspection.
//!
//! Directories are archived under an explicit entry prefix, so callers
//! control the root of the archive exactly: `pack_dir(src, "MTools_Linux_amd64", ..)`
//! yields entries `MTools_Linux_amd64/...` and nothing else.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::platform::Os;

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error("zip error: {0}")]
  Zip(#[from] zip::result::ZipError),

  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
  Zip,
  TarGz,
}

impl ArchiveFormat {
  /// Zip on Windows, gzipped tar everywhere else so Unix permissions survive.
  pub fn for_os(os: Os) -> Self {
    match os {
      Os::Windows => Self::Zip,
      Os::Linux | Os::MacOs => Self::TarGz,
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      Self::Zip => "zip",
      Self::TarGz => "tar.gz",
    }
  }
}

/// Archive every entry under `src` into `dest`, naming each entry
/// `{prefix}/{path relative to src}`.
///
/// Returns the number of files written.
pub fn pack_dir(format: ArchiveFormat, src: &Path, prefix: &str, dest: &Path) -> Result<usize, ArchiveError> {
  let prefix = prefix.trim_end_matches('/');
  let count = match format {
    ArchiveFormat::Zip => pack_zip(src, prefix, dest)?,
    ArchiveFormat::TarGz => pack_tar_gz(src, prefix, dest)?,
  };
  debug!(src = %src.display(), dest = %dest.display(), files = count, "archive written");
  Ok(count)
}

fn entry_name(src: &Path, path: &Path, prefix: &str) -> String {
  let rel = path.strip_prefix(src).unwrap_or(path).to_string_lossy().replace('\\', "/");
  if rel.is_empty() {
    prefix.to_string()
  } else {
    format!("{}/{}", prefix, rel)
  }
}

fn pack_zip(src: &Path, prefix: &str, dest: &Path) -> Result<usize, ArchiveError> {
  let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
  let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
  let mut count = 0;

  for entry in WalkDir::new(src).sort_by_file_name() {
    let entry = entry.map_err(|e| ArchiveError::Walk {
      path: src.display().to_string(),
      message: e.to_string(),
    })?;
    let name = entry_name(src, entry.path(), prefix);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      zip.add_directory(format!("{}/", name), base)?;
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path())?;
      zip.add_symlink(name, target.to_string_lossy().replace('\\', "/"), base)?;
    } else if file_type.is_file() {
      let options = with_permissions(base, entry.path())?;
      zip.start_file(name, options)?;
      io::copy(&mut File::open(entry.path())?, &mut zip)?;
      count += 1;
    }
  }

  finish_file(zip.finish()?)?;
  Ok(count)
}

/// Flush the buffered archive to disk, surfacing errors a drop would swallow.
fn finish_file(writer: BufWriter<File>) -> Result<(), ArchiveError> {
  let file = writer.into_inner().map_err(|e| e.into_error())?;
  file.sync_all()?;
  Ok(())
}

#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, path: &Path) -> io::Result<SimpleFileOptions> {
  use std::os::unix::fs::PermissionsExt;
  let mode = fs::metadata(path)?.permissions().mode();
  Ok(options.unix_permissions(mode))
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _path: &Path) -> io::Result<SimpleFileOptions> {
  Ok(options)
}

fn pack_tar_gz(src: &Path, prefix: &str, dest: &Path) -> Result<usize, ArchiveError> {
  let encoder = GzEncoder::new(BufWriter::new(File::create(dest)?), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  builder.follow_symlinks(false);
  builder.append_dir_all(prefix, src)?;
  finish_file(builder.into_inner()?.finish()?)?;

  let count = WalkDir::new(src)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|e| e.file_type().is_file())
    .count();
  Ok(count)
}

/// List entry names of an archive, directories included.
pub fn list_entries(format: ArchiveFormat, path: &Path) -> Result<Vec<String>, ArchiveError> {
  let file = BufReader::new(File::open(path)?);
  match format {
    ArchiveFormat::Zip => {
      let archive = ZipArchive::new(file)?;
      Ok(archive.file_names().map(str::to_string).collect())
    }
    ArchiveFormat::TarGz => {
      let mut archive = tar::Archive::new(GzDecoder::new(file));
      let mut names = Vec::new();
      for entry in archive.entries()? {
        let entry = entry?;
        names.push(entry.path()?.to_string_lossy().replace('\\', "/"));
      }
      Ok(names)
    }
  }
}

/// Distinct first path components across all entries.
pub fn top_level_entries(names: &[String]) -> Vec<String> {
  let mut roots: Vec<String> = names
    .iter()
    .filter_map(|n| n.trim_start_matches("./").split('/').find(|c| !c.is_empty()))
    .map(str::to_string)
    .collect();
  roots.sort();
  roots.dedup();
  roots
}
