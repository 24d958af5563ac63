use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::platform::lock::FileLock;
use crate::util::fs::{copy_path, remove_path};
use crate::util::hash::{ObjectHash, hash_path_contents};

use super::{CacheError, CacheKey};

/// Marker file name indicating an entry was fully written.
pub const ENTRY_COMPLETE_MARKER: &str = ".predex-complete";

pub(crate) const ENTRY_OUTPUT: &str = "output";
pub(crate) const ENTRY_INPUTS: &str = "inputs.json";
pub(crate) const TEMP_PREFIX: &str = ".tmp-";
pub(crate) const LOCKS_DIR: &str = "locks";

const MARKER_VERSION: u32 = 1;

/// Marker file content.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntryMarker {
  pub version: u32,
  pub status: String,
  /// Full SHA-256 of the entry's output.
  pub output_hash: String,
}

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
  /// Copied from an existing entry; nothing was produced.
  Hit,
  /// Produced and stored as a new entry.
  Produced,
  /// Produced without touching the cache.
  Uncached,
}

#[derive(Debug, Default)]
pub struct ArtifactCache {
  root: Option<PathBuf>,
  inflight: Mutex<HashMap<ObjectHash, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: Some(root.into()),
      inflight: Mutex::default(),
    }
  }

  /// A cache that never stores anything; every request produces.
  pub fn disabled() -> Self {
    Self::default()
  }

  pub fn root(&self) -> Option<&Path> {
    self.root.as_deref()
  }

  fn inflight(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectHash, Arc<tokio::sync::Mutex<()>>>> {
    match self.inflight.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }

  fn slot(&self, digest: &ObjectHash) -> Arc<tokio::sync::Mutex<()>> {
    self.inflight().entry(digest.clone()).or_default().clone()
  }

  /// Forget the slot for `digest` once no other request holds it.
  fn release(&self, digest: &ObjectHash, slot: Arc<tokio::sync::Mutex<()>>) {
    let mut inflight = self.inflight();
    // Only the map and `slot` itself left
    if Arc::strong_count(&slot) == 2 {
      inflight.remove(digest);
    }
  }

  /// Materialize the entry for `key` at `output`, producing it on a miss.
  ///
  /// `produce` runs at most once per key at a time, both within this process
  /// and across processes sharing the root. When it fails nothing is stored
  /// and `output` is removed.
  pub async fn get_or_create<F, Fut, E>(&self, output: &Path, key: &CacheKey, produce: F) -> Result<CacheOutcome, E>
  where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: From<CacheError>,
  {
    let Some(root) = self.root.clone() else {
      produce_uncached(output, produce).await?;
      return Ok(CacheOutcome::Uncached);
    };

    let digest = key.digest()?;
    let slot = self.slot(&digest);
    let result = {
      let _in_process = slot.lock().await;
      self.fill(root, &digest, output, key, produce).await
    };
    self.release(&digest, slot);
    result
  }

  /// Lookup or produce under the in-process slot of `digest`.
  async fn fill<F, Fut, E>(
    &self,
    root: PathBuf,
    digest: &ObjectHash,
    output: &Path,
    key: &CacheKey,
    produce: F,
  ) -> Result<CacheOutcome, E>
  where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: From<CacheError>,
  {
    let entry_dir = root.join(&digest.0);
    let _cross_process = {
      let lock_path = entry_lock_path(&root, digest);
      blocking(move || FileLock::acquire(&lock_path, "cache entry").map_err(CacheError::from)).await?
    };

    let hit = {
      let entry_dir = entry_dir.clone();
      blocking(move || lookup_entry(&entry_dir)).await?
    };

    if hit {
      debug!(digest = %digest, output = ?output, "cache hit");
      let source = entry_dir.join(ENTRY_OUTPUT);
      let target = output.to_path_buf();
      blocking(move || {
        remove_path(&target).map_err(|e| CacheError::io(&target, e))?;
        copy_path(&source, &target).map_err(|e| CacheError::io(&target, e))
      })
      .await?;
      return Ok(CacheOutcome::Hit);
    }

    debug!(digest = %digest, output = ?output, "cache miss");
    produce_uncached(output, produce).await?;

    let key = key.clone();
    let digest = digest.clone();
    let output = output.to_path_buf();
    blocking(move || store_entry(&root, &digest, &key, &output)).await?;
    Ok(CacheOutcome::Produced)
  }
}

/// Run `produce` into a clean `output`, removing whatever it left behind on failure.
pub async fn produce_uncached<F, Fut, E>(output: &Path, produce: F) -> Result<(), E>
where
  F: FnOnce(PathBuf) -> Fut,
  Fut: Future<Output = Result<(), E>>,
  E: From<CacheError>,
{
  let target = output.to_path_buf();
  blocking(move || remove_path(&target).map_err(|e| CacheError::io(&target, e))).await?;

  if let Err(err) = produce(output.to_path_buf()).await {
    if let Err(cleanup) = remove_path(output) {
      warn!(output = ?output, error = %cleanup, "failed to remove partial output");
    }
    return Err(err);
  }
  Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, CacheError>
where
  F: FnOnce() -> Result<T, CacheError> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| CacheError::Task(e.to_string()))?
}

pub(crate) fn entry_lock_path(root: &Path, digest: &ObjectHash) -> PathBuf {
  root.join(LOCKS_DIR).join(format!("{}.lock", digest))
}

/// Read an entry's marker. `None` when missing or unreadable.
pub(crate) fn read_marker(entry_dir: &Path) -> Option<EntryMarker> {
  let marker_path = entry_dir.join(ENTRY_COMPLETE_MARKER);
  let content = match fs::read_to_string(&marker_path) {
    Ok(content) => content,
    Err(_) => return None,
  };
  match serde_json::from_str(&content) {
    Ok(marker) => Some(marker),
    Err(e) => {
      debug!(path = ?marker_path, error = %e, "invalid entry marker");
      None
    }
  }
}

/// Check an entry's output against the hash recorded in its marker.
pub(crate) fn verify_entry(entry_dir: &Path, marker: &EntryMarker) -> bool {
  match hash_path_contents(&entry_dir.join(ENTRY_OUTPUT), &[]) {
    Ok(actual) if actual.0 == marker.output_hash => true,
    Ok(actual) => {
      warn!(
        path = ?entry_dir,
        expected = %marker.output_hash,
        actual = %actual.0,
        "cache entry corrupted, discarding"
      );
      false
    }
    Err(e) => {
      warn!(path = ?entry_dir, error = %e, "failed to hash cache entry, discarding");
      false
    }
  }
}

/// Returns whether a valid entry exists. Invalid entries are removed.
fn lookup_entry(entry_dir: &Path) -> Result<bool, CacheError> {
  if !entry_dir.exists() {
    return Ok(false);
  }

  match read_marker(entry_dir) {
    Some(marker) if verify_entry(entry_dir, &marker) => return Ok(true),
    Some(_) => {}
    None => debug!(path = ?entry_dir, "incomplete cache entry, removing"),
  }

  remove_path(entry_dir).map_err(|e| CacheError::io(entry_dir, e))?;
  Ok(false)
}

/// Copy `output` into a fresh entry and rename it into place.
fn store_entry(root: &Path, digest: &ObjectHash, key: &CacheKey, output: &Path) -> Result<(), CacheError> {
  fs::create_dir_all(root).map_err(|e| CacheError::io(root, e))?;

  // Dropping the TempDir cleans up whatever is left if any step fails
  let temp = tempfile::Builder::new()
    .prefix(&format!("{}{}-", TEMP_PREFIX, digest))
    .tempdir_in(root)
    .map_err(|e| CacheError::io(root, e))?;

  let stored_output = temp.path().join(ENTRY_OUTPUT);
  copy_path(output, &stored_output).map_err(|e| CacheError::io(output, e))?;

  let inputs = serde_json::to_string_pretty(key).map_err(CacheError::Key)?;
  fs::write(temp.path().join(ENTRY_INPUTS), inputs).map_err(|e| CacheError::io(temp.path(), e))?;

  let output_hash = hash_path_contents(&stored_output, &[])?;
  let marker = EntryMarker {
    version: MARKER_VERSION,
    status: "complete".to_string(),
    output_hash: output_hash.0,
  };
  let content = serde_json::to_string(&marker).map_err(|e| CacheError::WriteMarker(e.to_string()))?;
  fs::write(temp.path().join(ENTRY_COMPLETE_MARKER), format!("{}\n", content))
    .map_err(|e| CacheError::WriteMarker(e.to_string()))?;

  let entry_dir = root.join(&digest.0);
  remove_path(&entry_dir).map_err(|e| CacheError::io(&entry_dir, e))?;
  fs::rename(temp.path(), &entry_dir).map_err(|e| CacheError::io(&entry_dir, e))?;

  debug!(digest = %digest, "stored cache entry");
  Ok(())
}
