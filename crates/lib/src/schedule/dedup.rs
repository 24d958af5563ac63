use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::util::hash::{ContentHash, HashError, hash_file, hash_path};

/// Fingerprint used to spot identical units within one run.
///
/// Archives hash their bytes; directories hash their path, so two distinct
/// directories never collapse.
pub fn unit_fingerprint(path: &Path) -> Result<ContentHash, HashError> {
  if path.is_file() {
    hash_file(path)
  } else {
    Ok(hash_path(path))
  }
}

#[derive(Debug)]
struct Slot {
  output: PathBuf,
  done: watch::Sender<Option<bool>>,
}

/// Result of claiming a fingerprint.
#[derive(Debug)]
pub enum Claim {
  /// First claim: this job produces the output.
  Owner(OwnerGuard),
  /// Another job already owns identical content.
  Duplicate(DuplicateOf),
}

/// Held by the producing job. Dropping it without [`succeed`](Self::succeed)
/// tells waiting duplicates the owner failed.
#[derive(Debug)]
pub struct OwnerGuard {
  slot: Arc<Slot>,
  succeeded: bool,
}

impl OwnerGuard {
  pub fn succeed(mut self) {
    self.succeeded = true;
  }
}

impl Drop for OwnerGuard {
  fn drop(&mut self) {
    self.slot.done.send_replace(Some(self.succeeded));
  }
}

#[derive(Debug)]
pub struct DuplicateOf {
  slot: Arc<Slot>,
}

impl DuplicateOf {
  /// Output location of the owning job.
  pub fn output(&self) -> &Path {
    &self.slot.output
  }

  /// Wait for the owner to finish; `true` when it succeeded.
  pub async fn wait(&self) -> bool {
    let mut rx = self.slot.done.subscribe();
    match rx.wait_for(Option::is_some).await {
      Ok(state) => matches!(*state, Some(true)),
      Err(_) => false,
    }
  }
}

/// Fingerprints already claimed during the current run.
#[derive(Debug, Default)]
pub struct FingerprintSet {
  seen: Mutex<HashMap<ContentHash, Arc<Slot>>>,
}

impl FingerprintSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Atomically claim `fingerprint` for a job writing to `output`.
  pub fn claim(&self, fingerprint: ContentHash, output: &Path) -> Claim {
    let mut seen = match self.seen.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(slot) = seen.get(&fingerprint) {
      return Claim::Duplicate(DuplicateOf { slot: slot.clone() });
    }

    let (done, _) = watch::channel(None);
    let slot = Arc::new(Slot {
      output: output.to_path_buf(),
      done,
    });
    seen.insert(fingerprint, slot.clone());
    Claim::Owner(OwnerGuard {
      slot,
      succeeded: false,
    })
  }

  pub fn len(&self) -> usize {
    match self.seen.lock() {
      Ok(guard) => guard.len(),
      Err(poisoned) => poisoned.into_inner().len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
