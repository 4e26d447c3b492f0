//! Progression records: the append-only promotion audit trail.
//!
//! One record exists per created promotion. Records are never updated or
//! deleted; their natural key is `(student_id, from_class_id, to_class_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionType {
  /// Target class computed by grade advancement.
  Automatic,
  /// Target class supplied by the caller.
  Manual,
  /// Caller-supplied target at the same grade (the student repeats a year).
  Repeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionRecord {
  pub record_id:             Uuid,
  pub student_id:            Uuid,
  pub from_academic_year_id: Uuid,
  pub to_academic_year_id:   Uuid,
  pub from_class_id:         Uuid,
  pub to_class_id:           Uuid,
  pub promotion_type:        PromotionType,
  pub promoted_by:           Option<String>,
  pub notes:                 Option<String>,
  /// Server-assigned; never changes after creation.
  pub created_at:            DateTime<Utc>,
}

/// Input to [`crate::store::RolloverStore::append_progression_record`].
/// `record_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewProgressionRecord {
  pub student_id:            Uuid,
  pub from_academic_year_id: Uuid,
  pub to_academic_year_id:   Uuid,
  pub from_class_id:         Uuid,
  pub to_class_id:           Uuid,
  pub promotion_type:        PromotionType,
  pub promoted_by:           Option<String>,
  pub notes:                 Option<String>,
}
