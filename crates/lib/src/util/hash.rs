//! Hashing utilities for cache addressing and content fingerprints.
//!
//! - `ObjectHash`: truncated digest naming a cache entry directory
//! - `ContentHash`: full digest of file or tree contents
//! - `hash_tree()`, `hash_file()`, `hash_bytes()`, `hash_path()`

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

/// Digest addressing an object in the artifact cache.
///
/// A lowercase hex string truncated to `OBJ_HASH_PREFIX_LEN` characters of the
/// SHA-256 of the object's JSON serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, serde_json::Error> {
    let serialized = serde_json::to_string(self)?;
    let full = hash_bytes(serialized.as_bytes());
    Ok(ObjectHash(full.0[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// Full 64-character SHA-256 of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// First 12 characters, for log lines.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read symlink {path}: {source}")]
  ReadLink {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Hash a file or a directory tree.
///
/// Files hash their bytes; directories hash their structure and contents.
pub fn hash_path_contents(path: &Path, exclude: &[&str]) -> Result<ContentHash, HashError> {
  if path.is_dir() {
    hash_tree(path, exclude)
  } else {
    hash_file(path)
  }
}

/// Compute a deterministic hash of a directory tree.
///
/// Covers relative paths, file contents and symlink targets. Timestamps and
/// permissions are ignored. Entries whose file name is in `exclude` are skipped
/// together with everything below them.
pub fn hash_tree(path: &Path, exclude: &[&str]) -> Result<ContentHash, HashError> {
  let mut entries: Vec<String> = Vec::new();

  let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
    e.file_name()
      .to_str()
      .map(|name| !exclude.contains(&name))
      .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| HashError::Walk {
      path: path.to_path_buf(),
      message: e.to_string(),
    })?;
    let entry_path = entry.path();

    // Separators are normalized so the hash is stable across platforms
    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .replace('\\', "/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let line = if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?.0)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|source| HashError::ReadLink {
        path: entry_path.to_path_buf(),
        source,
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()).0)
    } else {
      continue;
    };

    entries.push(line);
  }

  entries.sort();

  let mut hasher = Sha256::new();
  for line in entries {
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash a file's bytes.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Hash the textual form of a path (not what it points to).
pub fn hash_path(path: &Path) -> ContentHash {
  hash_bytes(path.to_string_lossy().as_bytes())
}
