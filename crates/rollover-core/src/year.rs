//! Academic years: the bounded calendar periods that own classes and
//! enrollments.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of an academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum YearStatus {
  Planning,
  Active,
  Ended,
  Archived,
}

/// An academic year of one school.
///
/// At most one year per school has `is_current` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicYear {
  pub academic_year_id:      Uuid,
  pub school_id:             Uuid,
  pub name:                  String,
  pub start_date:            NaiveDate,
  pub end_date:              NaiveDate,
  pub status:                YearStatus,
  pub is_current:            bool,
  /// Set once a promotion run out of this year finished without a fatal
  /// error. Never reset by the engine.
  pub is_promotion_done:     bool,
  /// When `is_promotion_done` was last set.
  pub promotion_date:        Option<DateTime<Utc>>,
  /// Advisory lock held for the duration of a promotion run out of this year.
  pub promotion_in_progress: bool,
}

/// How a storage backend locates an academic year within a school.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearSelector {
  /// A specific year. Must belong to the school.
  Id(Uuid),
  /// The year flagged `is_current`.
  Current,
  /// The year with the earliest `start_date` after the given year's.
  Following(Uuid),
}
