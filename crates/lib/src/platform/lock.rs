//! Advisory file locks for cross-process mutual exclusion.
//!
//! The artifact cache takes one lock file per entry digest so that two build
//! processes sharing a cache root never produce the same entry concurrently.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub purpose: String,
}

#[derive(Debug, Error)]
pub enum FileLockError {
  #[error("{lock_path} is held by PID {pid} ({purpose})")]
  Contention {
    purpose: String,
    pid: u32,
    lock_path: PathBuf,
  },

  #[error("{lock_path} is held by another process")]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct FileLock {
  _file: File,
  lock_path: PathBuf,
}

impl FileLock {
  /// Block until the lock at `lock_path` is held exclusively.
  pub fn acquire(lock_path: &Path, purpose: &str) -> Result<Self, FileLockError> {
    let file = open_lock_file(lock_path)?;
    lock(&file, true).map_err(FileLockError::LockFailed)?;
    Self::write_metadata(&file, purpose)?;
    Ok(FileLock {
      _file: file,
      lock_path: lock_path.to_path_buf(),
    })
  }

  /// Take the lock only if nobody holds it.
  pub fn try_acquire(lock_path: &Path, purpose: &str) -> Result<Self, FileLockError> {
    let file = open_lock_file(lock_path)?;

    if let Err(err) = lock(&file, false) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(lock_path));
      }
      return Err(FileLockError::LockFailed(err));
    }

    Self::write_metadata(&file, purpose)?;
    Ok(FileLock {
      _file: file,
      lock_path: lock_path.to_path_buf(),
    })
  }

  fn write_metadata(file: &File, purpose: &str) -> Result<(), FileLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      purpose: purpose.to_string(),
    };

    file.set_len(0).map_err(FileLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer(&mut writer, &metadata).map_err(|e| FileLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(FileLockError::WriteMetadata)?;

    Ok(())
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn open_lock_file(lock_path: &Path) -> Result<File, FileLockError> {
  if let Some(parent) = lock_path.parent()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).map_err(FileLockError::CreateDir)?;
  }

  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(lock_path)
    .map_err(FileLockError::OpenFile)
}

fn read_contention_error(lock_path: &Path) -> FileLockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return FileLockError::Contention {
        purpose: metadata.purpose,
        pid: metadata.pid,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  FileLockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn lock(file: &File, blocking: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if blocking {
    FlockOperation::LockExclusive
  } else {
    FlockOperation::NonBlockingLockExclusive
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock(file: &File, blocking: bool) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = if blocking {
    LOCKFILE_EXCLUSIVE_LOCK
  } else {
    LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
