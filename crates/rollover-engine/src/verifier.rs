//! Post-promotion consistency check. Read-only.

use std::time::Duration;

use rollover_core::store::RolloverStore;

use crate::{
  Result,
  report::{ConsistencyReport, ConsistencyViolation},
  resolver::ResolvedYears,
  timed,
};

pub struct ConsistencyVerifier<'a, S> {
  store:   &'a S,
  timeout: Duration,
}

impl<'a, S: RolloverStore> ConsistencyVerifier<'a, S> {
  pub fn new(store: &'a S, timeout: Duration) -> Self { Self { store, timeout } }

  /// Check that every student is ACTIVE in at most one class of the target
  /// year, and gather the ledger and done-flag state for the report.
  pub async fn verify(&self, years: &ResolvedYears) -> Result<ConsistencyReport> {
    let pair = years.pair();
    let store = self.store;

    let distinct_students = timed(self.timeout, store.count_distinct_students(pair.target)).await?;
    let active_enrollments = timed(self.timeout, store.count_active_enrollments(pair.target)).await?;
    let duplicates =
      timed(self.timeout, store.list_duplicate_active_enrollments(pair.target)).await?;
    let progression_records =
      timed(self.timeout, store.list_progression_records(pair.source, pair.target))
        .await?
        .len();
    let promotion_done = timed(self.timeout, store.get_academic_year(pair.source))
      .await?
      .map(|y| y.is_promotion_done)
      .unwrap_or(years.source.is_promotion_done);

    let mut violations: Vec<ConsistencyViolation> = duplicates
      .into_iter()
      .map(|d| ConsistencyViolation::DuplicateActiveEnrollment {
        student_id: d.student_id,
        class_ids:  d.enrollments.iter().map(|e| e.class_id).collect(),
      })
      .collect();
    if violations.is_empty() && distinct_students != active_enrollments {
      violations.push(ConsistencyViolation::CountMismatch { distinct_students, active_enrollments });
    }

    let is_consistent = violations.is_empty();
    if is_consistent {
      tracing::info!(
        year = %years.target.name,
        students = distinct_students,
        records = progression_records,
        "target year is consistent",
      );
    } else {
      tracing::warn!(
        year = %years.target.name,
        distinct_students,
        active_enrollments,
        violations = violations.len(),
        "target year has students enrolled in more than one class",
      );
    }

    Ok(ConsistencyReport {
      source_year_id: pair.source,
      target_year_id: pair.target,
      distinct_students,
      active_enrollments,
      progression_records,
      promotion_done,
      is_consistent,
      violations,
    })
  }
}
