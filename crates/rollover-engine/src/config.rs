//! Engine tuning knobs, deserialisable from the `[engine]` config table.

use std::time::Duration;

use rollover_core::enrollment::ConflictPolicy;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Intents per batch. Batches run strictly one after another.
  pub batch_size:           usize,
  /// Concurrent writes inside one batch.
  pub concurrency:          usize,
  pub conflict_policy:      ConflictPolicy,
  /// Limit for each individual storage call.
  pub operation_timeout_ms: u64,
  /// Highest grade the school teaches. Classes at this grade graduate
  /// instead of advancing.
  pub final_grade:          Option<u32>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      batch_size:           100,
      concurrency:          8,
      conflict_policy:      ConflictPolicy::Skip,
      operation_timeout_ms: 30_000,
      final_grade:          None,
    }
  }
}

impl EngineConfig {
  pub fn operation_timeout(&self) -> Duration {
    Duration::from_millis(self.operation_timeout_ms)
  }

  pub fn validate(&self) -> Result<()> {
    if self.batch_size == 0 {
      return Err(Error::Validation("batch_size must be at least 1".into()));
    }
    if self.concurrency == 0 {
      return Err(Error::Validation("concurrency must be at least 1".into()));
    }
    if self.operation_timeout_ms == 0 {
      return Err(Error::Validation("operation_timeout_ms must be positive".into()));
    }
    Ok(())
  }
}
