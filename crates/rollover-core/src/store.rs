//! The `RolloverStore` trait and its error classification.
//!
//! The trait is implemented by storage backends (e.g.
//! `rollover-store-sqlite`). The engine depends on this abstraction only; the
//! caller owns the backend's lifecycle and injects it.

use std::future::Future;

use uuid::Uuid;

use crate::{
  class::Class,
  enrollment::{
    ActiveEnrollment, ConflictPolicy, DuplicateEnrollment, NewEnrollment,
    UpsertOutcome,
  },
  progression::{NewProgressionRecord, ProgressionRecord},
  year::{AcademicYear, YearSelector},
};

// ─── Error classification ────────────────────────────────────────────────────

/// How far a storage failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  /// Confined to the row being written (constraint violation, lock
  /// contention, undecodable row). Processing of other records continues.
  Record,
  /// The backend itself is unusable (connection lost, I/O failure).
  Fatal,
}

/// Error type of a [`RolloverStore`] backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn severity(&self) -> Severity;

  fn is_fatal(&self) -> bool { self.severity() == Severity::Fatal }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Data access used by the promotion engine.
///
/// Enrollment and progression writes are create-if-absent: repeating a write
/// with the same key is a no-op reported through the return value, never an
/// error.
///
/// All methods return `Send` futures so the engine can run inside
/// multi-threaded async runtimes.
pub trait RolloverStore: Send + Sync {
  type Error: StoreError;

  // ── Schools and academic years ────────────────────────────────────────

  fn school_exists(
    &self,
    school_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Locate an academic year of `school_id`. Returns `None` if no year
  /// matches (including an id that belongs to another school).
  fn find_academic_year(
    &self,
    school_id: Uuid,
    selector: YearSelector,
  ) -> impl Future<Output = Result<Option<AcademicYear>, Self::Error>> + Send + '_;

  fn get_academic_year(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<Option<AcademicYear>, Self::Error>> + Send + '_;

  /// Set or clear `is_promotion_done`. Setting it also stamps
  /// `promotion_date`.
  fn set_promotion_done(
    &self,
    academic_year_id: Uuid,
    done: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Atomically set `promotion_in_progress` if it is clear. Returns `false`
  /// if another run holds the lock.
  fn try_acquire_promotion_lock(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn release_promotion_lock(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Classes and enrollments ───────────────────────────────────────────

  fn list_classes(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + '_;

  /// All ACTIVE enrollments of the year, joined with class grade/section.
  fn list_active_enrollments(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ActiveEnrollment>, Self::Error>> + Send + '_;

  /// Create an ACTIVE enrollment unless a row with the same
  /// `(student_id, class_id, academic_year_id)` key exists. `policy` decides
  /// what happens when the student is ACTIVE in another class of the year.
  /// The check and the write happen in one storage transaction.
  fn upsert_enrollment(
    &self,
    enrollment: NewEnrollment,
    policy: ConflictPolicy,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Set an enrollment INACTIVE. Returns `false` if no such row exists.
  fn deactivate_enrollment(
    &self,
    student_id: Uuid,
    class_id: Uuid,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn count_active_enrollments(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Number of distinct students with an ACTIVE enrollment in the year.
  fn count_distinct_students(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Students holding more than one ACTIVE enrollment in the year, ordered by
  /// student id.
  fn list_duplicate_active_enrollments(
    &self,
    academic_year_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DuplicateEnrollment>, Self::Error>> + Send + '_;

  // ── Progression records ───────────────────────────────────────────────

  /// Append a record unless one with the same
  /// `(student_id, from_class_id, to_class_id)` exists. Returns whether a
  /// record was created.
  fn append_progression_record(
    &self,
    record: NewProgressionRecord,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All records promoting out of `from_year` into `to_year`, oldest first.
  fn list_progression_records(
    &self,
    from_academic_year_id: Uuid,
    to_academic_year_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ProgressionRecord>, Self::Error>> + Send + '_;
}
