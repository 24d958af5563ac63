//! Filesystem helpers shared by the cache, scheduler and pipeline.

use std::fs;
use std::io;
use std::path::Path;

/// Remove a file, directory tree or symlink. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
  let metadata = match path.symlink_metadata() {
    Ok(m) => m,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(e) => return Err(e),
  };

  let result = if metadata.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };

  match result {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    other => other,
  }
}

/// Copy a file or a directory tree to `dst`. Parents of `dst` are created.
pub fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent)?;
  }

  if !src.is_dir() {
    fs::copy(src, dst)?;
    return Ok(());
  }

  fs::create_dir_all(dst)?;
  for entry in fs::read_dir(src)? {
    let entry = entry?;
    let target = dst.join(entry.file_name());
    if entry.file_type()?.is_dir() {
      copy_path(&entry.path(), &target)?;
    } else {
      fs::copy(entry.path(), target)?;
    }
  }
  Ok(())
}

/// Delete every direct child of `dir`, keeping `dir` itself. Creates `dir` if missing.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
  fs::create_dir_all(dir)?;
  for entry in fs::read_dir(dir)? {
    remove_path(&entry?.path())?;
  }
  Ok(())
}

/// Total size in bytes of the regular files at or below `path`.
pub fn disk_usage(path: &Path) -> u64 {
  walkdir::WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}
