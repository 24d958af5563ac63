//! Content-addressable artifact cache.
//!
//! Entries live under the cache root, one directory per key digest:
//!
//! ```text
//! <root>/<digest>/output             the produced artifact (file or directory)
//! <root>/<digest>/inputs.json        the key facts, for inspection
//! <root>/<digest>/.predex-complete   marker with the output hash
//! <root>/locks/<digest>.lock         cross-process producer lock
//! ```
//!
//! Entries are assembled in a temporary directory and renamed into place, so
//! a reader never observes a partial entry.

mod key;
mod store;

pub mod gc;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::platform::lock::FileLockError;
use crate::util::hash::HashError;

pub use key::{
  CONTENT_FACT, CacheKey, EXTRACTED_FILE_FACT, FILE_FACT, JUMBO_MODE_FACT, MULTI_DEX_FACT, OPTIMIZE_FACT,
  TOOL_VERSION_FACT, build_key,
};
pub use store::{ArtifactCache, CacheOutcome, ENTRY_COMPLETE_MARKER, EntryMarker, produce_uncached};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to serialize cache key: {0}")]
  Key(#[source] serde_json::Error),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("failed to fingerprint input: {0}")]
  Fingerprint(#[from] HashError),

  #[error("cache i/o on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to lock cache entry: {0}")]
  Lock(#[from] FileLockError),

  #[error("failed to write entry marker: {0}")]
  WriteMarker(String),

  #[error("cache task failed: {0}")]
  Task(String),
}

impl CacheError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    CacheError::Io {
      path: path.into(),
      source,
    }
  }
}
