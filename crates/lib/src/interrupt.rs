//! Cooperative cancellation.
//!
//! An [`Interrupt`] is shared between the caller and every running job. Once
//! triggered it stays triggered, so the caller still observes it after the
//! pipeline returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
  inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  triggered: AtomicBool,
  notify: Notify,
}

impl Interrupt {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn trigger(&self) {
    self.inner.triggered.store(true, Ordering::SeqCst);
    self.inner.notify.notify_waiters();
  }

  pub fn is_triggered(&self) -> bool {
    self.inner.triggered.load(Ordering::SeqCst)
  }

  /// Resolves once [`trigger`](Self::trigger) has been called.
  pub async fn triggered(&self) {
    loop {
      let notified = self.inner.notify.notified();
      if self.is_triggered() {
        return;
      }
      notified.await;
    }
  }
}
