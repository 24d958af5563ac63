use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounded set of job slots.
///
/// Cloning shares the slots, so one pool created at startup bounds every run
/// made through it.
#[derive(Debug, Clone)]
pub struct WorkerPool {
  permits: Arc<Semaphore>,
  size: usize,
}

impl WorkerPool {
  pub fn new(size: usize) -> Self {
    let size = size.max(1);
    Self {
      permits: Arc::new(Semaphore::new(size)),
      size,
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn available(&self) -> usize {
    self.permits.available_permits()
  }

  pub(crate) async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
    self.permits.clone().acquire_owned().await
  }
}

impl Default for WorkerPool {
  fn default() -> Self {
    Self::new(std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4))
  }
}
