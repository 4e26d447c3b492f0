//! Enrollments: the (student, class, academic year) relation.
//!
//! The composite key is globally unique. For a given student and academic
//! year at most one enrollment is expected to be ACTIVE; storage backends do
//! not enforce this, the reconciler and the verifier do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
  Active,
  Inactive,
  Transferred,
  Graduated,
}

impl EnrollmentStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// A persisted enrollment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
  pub student_id:       Uuid,
  pub class_id:         Uuid,
  pub academic_year_id: Uuid,
  pub status:           EnrollmentStatus,
  pub enrolled_at:      DateTime<Utc>,
}

/// An ACTIVE enrollment joined with the grade and section of its class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEnrollment {
  pub student_id:       Uuid,
  pub class_id:         Uuid,
  pub academic_year_id: Uuid,
  pub enrolled_at:      DateTime<Utc>,
  pub grade:            String,
  pub section:          Option<String>,
}

/// Input to [`crate::store::RolloverStore::upsert_enrollment`]. New rows are
/// always written ACTIVE; `enrolled_at` is set by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NewEnrollment {
  pub student_id:       Uuid,
  pub class_id:         Uuid,
  pub academic_year_id: Uuid,
}

/// What to do when the student already holds an ACTIVE enrollment in a
/// *different* class of the same academic year.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
  /// The existing enrollment wins; nothing is written.
  #[default]
  Skip,
  /// The existing enrollment is set INACTIVE and the new one is created.
  Overwrite,
}

/// Result of a create-if-absent enrollment write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
  /// No row with the exact key existed; one was created.
  Created,
  /// A row with the exact key already existed (any status); nothing written.
  AlreadyExists,
  /// Created after deactivating the student's other ACTIVE enrollment
  /// ([`ConflictPolicy::Overwrite`]).
  Replaced { previous_class_id: Uuid },
  /// The student is ACTIVE in another class of the year and the policy was
  /// [`ConflictPolicy::Skip`]; nothing written.
  Retained { class_id: Uuid },
}

impl UpsertOutcome {
  /// Whether a new enrollment row now exists because of this write.
  pub fn created(&self) -> bool {
    matches!(self, Self::Created | Self::Replaced { .. })
  }
}

/// A student holding more than one ACTIVE enrollment in one academic year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateEnrollment {
  pub student_id:  Uuid,
  /// The offending ACTIVE rows, ordered by `enrolled_at` then `class_id`.
  pub enrollments: Vec<Enrollment>,
}
