//! Error type for `rollover-engine`.
//!
//! Only run-level failures surface here. Per-record problems (validation,
//! constraint conflicts, timeouts on a single write) are collected into
//! [`crate::report::PromotionReport::failed`] instead.

use std::time::Duration;

use rollover_core::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::report::PromotionReport;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("school not found: {0}")]
  SchoolNotFound(Uuid),

  #[error("academic year not found: {0}")]
  AcademicYearNotFound(String),

  #[error("invalid request: {0}")]
  Validation(String),

  #[error("a promotion out of academic year {0} is already in progress")]
  PromotionInProgress(Uuid),

  #[error("storage operation timed out after {0:?}")]
  Timeout(Duration),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  /// The backend failed mid-run. Batches before the failing one were fully
  /// applied; `partial` describes them.
  #[error(
    "fatal store error after {} of {} batches: {source}",
    .partial.batches_completed,
    .partial.batches_total
  )]
  Fatal {
    #[source]
    source:  BoxError,
    partial: Box<PromotionReport>,
  },
}

impl Error {
  pub(crate) fn store<E: StoreError>(e: E) -> Self { Self::Store(Box::new(e)) }

  /// Whether the run stopped because a school or year does not exist.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::SchoolNotFound(_) | Self::AcademicYearNotFound(_))
  }

  /// The partial report of a run aborted by a fatal store error.
  pub fn partial_report(&self) -> Option<&PromotionReport> {
    match self {
      Self::Fatal { partial, .. } => Some(partial),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
