//! Cache inspection and maintenance.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::lock::FileLock;
use crate::util::fs::{disk_usage, remove_path};
use crate::util::hash::ObjectHash;

use super::store::{LOCKS_DIR, TEMP_PREFIX, entry_lock_path, read_marker, verify_entry};

#[derive(Debug, Error)]
pub enum GcError {
  #[error("failed to read cache directory {path}: {source}")]
  ReadCache {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
  pub entries: usize,
  pub incomplete: usize,
  pub temp_dirs: usize,
  pub bytes: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct SweepStats {
  pub scanned: usize,
  pub deleted: usize,
  pub skipped_in_use: usize,
  pub bytes_freed: u64,
}

#[derive(Debug, Serialize)]
pub struct SweepResult {
  pub stats: SweepStats,
  pub deleted_paths: Vec<PathBuf>,
}

enum Slot {
  Entry(ObjectHash),
  Temp(ObjectHash),
}

fn list_slots(root: &Path) -> Result<Vec<(PathBuf, Slot)>, GcError> {
  if !root.exists() {
    return Ok(Vec::new());
  }

  let entries = fs::read_dir(root).map_err(|source| GcError::ReadCache {
    path: root.to_path_buf(),
    source,
  })?;

  let mut slots = Vec::new();
  for entry in entries.flatten() {
    let path = entry.path();
    if !path.is_dir() {
      continue;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
      continue;
    };
    if name == LOCKS_DIR {
      continue;
    }

    let slot = match name.strip_prefix(TEMP_PREFIX) {
      Some(rest) => Slot::Temp(ObjectHash(rest.split('-').next().unwrap_or_default().to_string())),
      None => Slot::Entry(ObjectHash(name)),
    };
    slots.push((path, slot));
  }
  slots.sort_by(|a, b| a.0.cmp(&b.0));
  Ok(slots)
}

/// Count entries and their size. Entries are classified by marker presence only.
pub fn stats(root: &Path) -> Result<CacheStats, GcError> {
  let mut stats = CacheStats::default();

  for (path, slot) in list_slots(root)? {
    match slot {
      Slot::Temp(_) => stats.temp_dirs += 1,
      Slot::Entry(_) if read_marker(&path).is_some() => stats.entries += 1,
      Slot::Entry(_) => stats.incomplete += 1,
    }
    stats.bytes += disk_usage(&path);
  }

  Ok(stats)
}

/// Remove incomplete or corrupted entries and leftover temporary directories.
pub fn sweep(root: &Path, dry_run: bool) -> Result<SweepResult, GcError> {
  remove_matching(root, dry_run, "cache sweep", |path, slot| match slot {
    Slot::Temp(_) => true,
    Slot::Entry(_) => match read_marker(path) {
      Some(marker) => !verify_entry(path, &marker),
      None => true,
    },
  })
}

/// Remove every entry.
pub fn clear(root: &Path, dry_run: bool) -> Result<SweepResult, GcError> {
  remove_matching(root, dry_run, "cache clear", |_, _| true)
}

fn remove_matching(
  root: &Path,
  dry_run: bool,
  purpose: &str,
  should_remove: impl Fn(&Path, &Slot) -> bool,
) -> Result<SweepResult, GcError> {
  let mut stats = SweepStats::default();
  let mut deleted_paths = Vec::new();

  for (path, slot) in list_slots(root)? {
    stats.scanned += 1;

    let digest = match &slot {
      Slot::Entry(d) | Slot::Temp(d) => d.clone(),
    };

    // Producers hold the entry lock while writing; leave their work alone
    let _lock = if dry_run {
      None
    } else {
      match FileLock::try_acquire(&entry_lock_path(root, &digest), purpose) {
        Ok(lock) => Some(lock),
        Err(e) => {
          debug!(path = %path.display(), error = %e, "entry in use, skipping");
          stats.skipped_in_use += 1;
          continue;
        }
      }
    };

    if !should_remove(&path, &slot) {
      continue;
    }

    let size = disk_usage(&path);
    if dry_run {
      stats.deleted += 1;
      stats.bytes_freed += size;
      deleted_paths.push(path);
      continue;
    }

    match remove_path(&path) {
      Ok(()) => {
        debug!(path = %path.display(), "removed cache entry");
        stats.deleted += 1;
        stats.bytes_freed += size;
        deleted_paths.push(path);
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to delete cache entry");
      }
    }
  }

  info!(
    deleted = stats.deleted,
    bytes_freed = stats.bytes_freed,
    skipped = stats.skipped_in_use,
    dry_run,
    "{} complete",
    purpose
  );

  Ok(SweepResult { stats, deleted_paths })
}
