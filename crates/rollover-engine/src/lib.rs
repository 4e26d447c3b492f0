//! The promotion engine: moves ACTIVE enrollments of one academic year into
//! the matching classes of the next, idempotently and with an audit trail.
//!
//! Generic over [`rollover_core::store::RolloverStore`]; the engine owns no
//! connection and never touches storage except through that trait.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod mapper;
pub mod merge;
pub mod planner;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod verifier;

#[cfg(test)]
mod tests;

use std::time::Duration;

use rollover_core::store::StoreError;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use engine::{PromoteRequest, PromotionEngine};
pub use error::{Error, Result};
pub use planner::{OverrideKind, PromotionOverride};
pub use report::{ConsistencyReport, MergeReport, PromotionReport};
pub use resolver::YearRef;

/// Run one storage call under `limit`.
pub(crate) async fn timed<T, E: StoreError>(
  limit: Duration,
  op:    impl Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
  match tokio::time::timeout(limit, op).await {
    Ok(result) => result.map_err(Error::store),
    Err(_) => Err(Error::Timeout(limit)),
  }
}
