//! Outcome types returned by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Per-student entries ─────────────────────────────────────────────────────

/// Why an ACTIVE source enrollment produced no promotion intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnmatchedReason {
  /// The target year has no class at the next grade.
  NoTargetClass { next_grade: u32 },
  /// The source class is at the school's final grade.
  Graduating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedStudent {
  pub student_id:    Uuid,
  pub from_class_id: Uuid,
  #[serde(flatten)]
  pub reason:        UnmatchedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The intent itself is malformed (non-numeric grade, bad override, …).
  Validation,
  /// The store rejected the write for a reason other than an existing key.
  Conflict,
  /// A storage call for this intent exceeded the operation timeout.
  Timeout,
}

/// A student whose promotion was not applied and needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedIntent {
  pub student_id:    Uuid,
  pub from_class_id: Option<Uuid>,
  pub to_class_id:   Option<Uuid>,
  pub kind:          FailureKind,
  pub message:       String,
}

/// A student left in the class they already held in the target year
/// ([`rollover_core::enrollment::ConflictPolicy::Skip`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedPlacement {
  pub student_id:         Uuid,
  pub requested_class_id: Uuid,
  pub existing_class_id:  Uuid,
}

/// Where one source class is headed, with its ACTIVE headcount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPreview {
  pub from_class_id:   Uuid,
  pub from_class_name: String,
  pub to_class_id:     Option<Uuid>,
  pub to_class_name:   Option<String>,
  /// `None` when the source grade is not a number.
  pub next_grade:      Option<u32>,
  pub graduating:      bool,
  pub students:        usize,
}

// ─── Run report ──────────────────────────────────────────────────────────────

/// Summary of one `promote` invocation.
///
/// Every ACTIVE source enrollment is accounted for exactly once:
/// `created + skipped_duplicate + unmatched + failed + pending` equals
/// `source_enrollments`. `pending` is zero for a run that finished; it counts
/// the intents a dry run, a cancelled run or an aborted run did not apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionReport {
  pub source_year_id:     Uuid,
  pub target_year_id:     Uuid,
  pub dry_run:            bool,
  pub started_at:         DateTime<Utc>,
  pub finished_at:        Option<DateTime<Utc>>,

  pub source_enrollments: usize,
  /// Intents produced by the planner.
  pub planned:            usize,
  pub created:            usize,
  pub skipped_duplicate:  usize,
  pub unmatched:          Vec<UnmatchedStudent>,
  pub failed:             Vec<FailedIntent>,
  pub pending:            usize,

  /// Created intents that deactivated an earlier placement (overwrite policy).
  pub replaced:           usize,
  /// Skipped intents where the student already held another class.
  pub retained:           Vec<RetainedPlacement>,
  /// Progression records written for enrollments that already existed.
  pub ledger_repaired:    usize,
  /// Overrides naming a student without an ACTIVE source enrollment.
  pub ignored_overrides:  Vec<Uuid>,
  /// Per source class: the chosen target class and how many students move.
  pub class_plan:         Vec<ClassPreview>,

  pub batches_total:      usize,
  pub batches_completed:  usize,
  pub cancelled:          bool,
  /// The source year was already promoted and the request asked to skip.
  pub skipped_already_done: bool,
  /// This run set `is_promotion_done` on the source year.
  pub marked_done:        bool,
}

impl PromotionReport {
  pub fn new(source_year_id: Uuid, target_year_id: Uuid, dry_run: bool) -> Self {
    Self {
      source_year_id,
      target_year_id,
      dry_run,
      started_at: Utc::now(),
      finished_at: None,
      source_enrollments: 0,
      planned: 0,
      created: 0,
      skipped_duplicate: 0,
      unmatched: Vec::new(),
      failed: Vec::new(),
      pending: 0,
      replaced: 0,
      retained: Vec::new(),
      ledger_repaired: 0,
      ignored_overrides: Vec::new(),
      class_plan: Vec::new(),
      batches_total: 0,
      batches_completed: 0,
      cancelled: false,
      skipped_already_done: false,
      marked_done: false,
    }
  }

  /// Sum of every outcome bucket; equals `source_enrollments`.
  pub fn accounted(&self) -> usize {
    self.created
      + self.skipped_duplicate
      + self.unmatched.len()
      + self.failed.len()
      + self.pending
  }

  pub fn is_complete(&self) -> bool {
    !self.dry_run && !self.cancelled && self.pending == 0
  }

  /// Sort the per-student lists so reports are reproducible regardless of
  /// write completion order.
  pub(crate) fn finish(&mut self) {
    self.unmatched.sort_by_key(|u| (u.student_id, u.from_class_id));
    self.failed.sort_by_key(|f| (f.student_id, f.from_class_id));
    self.retained.sort_by_key(|r| r.student_id);
    self.ignored_overrides.sort();
    self.finished_at = Some(Utc::now());
  }
}

// ─── Verification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyViolation {
  /// A student is ACTIVE in more than one class of the target year.
  DuplicateActiveEnrollment { student_id: Uuid, class_ids: Vec<Uuid> },
  /// Counts disagree without an identifiable duplicate (e.g. rows changed
  /// between reads).
  CountMismatch { distinct_students: u64, active_enrollments: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
  pub source_year_id:      Uuid,
  pub target_year_id:      Uuid,
  pub distinct_students:   u64,
  pub active_enrollments:  u64,
  pub progression_records: usize,
  pub promotion_done:      bool,
  pub is_consistent:       bool,
  pub violations:          Vec<ConsistencyViolation>,
}

// ─── Duplicate merge ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedStudent {
  pub student_id:             Uuid,
  pub kept_class_id:          Uuid,
  pub deactivated_class_ids:  Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
  pub academic_year_id: Uuid,
  pub dry_run:          bool,
  pub students:         Vec<MergedStudent>,
  /// Enrollment rows set INACTIVE (or that would be, on a dry run).
  pub deactivated:      usize,
}
