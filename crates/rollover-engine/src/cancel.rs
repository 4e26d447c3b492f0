//! Cooperative cancellation for promotion runs.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// A cloneable flag checked by the reconciler between batches.
///
/// Cancelling never interrupts a batch in flight; the run stops at the next
/// batch boundary and reports what it finished.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}
