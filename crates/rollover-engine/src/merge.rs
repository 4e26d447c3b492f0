//! Repairs students holding more than one ACTIVE enrollment in a year by
//! keeping the earliest placement and setting the rest INACTIVE.

use std::time::Duration;

use rollover_core::{enrollment::DuplicateEnrollment, store::RolloverStore, year::AcademicYear};

use crate::{
  Result,
  report::{MergeReport, MergedStudent},
  timed,
};

pub struct DuplicateMerger<'a, S> {
  store:   &'a S,
  timeout: Duration,
}

impl<'a, S: RolloverStore> DuplicateMerger<'a, S> {
  pub fn new(store: &'a S, timeout: Duration) -> Self { Self { store, timeout } }

  /// Merge duplicates in `year`. With `dry_run` nothing is written and the
  /// report describes what would change.
  pub async fn merge(&self, year: &AcademicYear, dry_run: bool) -> Result<MergeReport> {
    let duplicates =
      timed(self.timeout, self.store.list_duplicate_active_enrollments(year.academic_year_id))
        .await?;

    let mut report = MergeReport {
      academic_year_id: year.academic_year_id,
      dry_run,
      students: Vec::with_capacity(duplicates.len()),
      deactivated: 0,
    };

    for duplicate in duplicates {
      let Some(merged) = plan_merge(&duplicate) else { continue };

      if !dry_run {
        for class_id in &merged.deactivated_class_ids {
          let changed = timed(
            self.timeout,
            self.store.deactivate_enrollment(merged.student_id, *class_id, year.academic_year_id),
          )
          .await?;
          if !changed {
            tracing::warn!(student = %merged.student_id, class = %class_id, "enrollment vanished during merge");
          }
        }
      }

      tracing::info!(
        student = %merged.student_id,
        kept = %merged.kept_class_id,
        removed = merged.deactivated_class_ids.len(),
        dry_run,
        "merged duplicate enrollments",
      );
      report.deactivated += merged.deactivated_class_ids.len();
      report.students.push(merged);
    }

    Ok(report)
  }
}

/// The earliest enrollment (ties broken by class id) is kept.
fn plan_merge(duplicate: &DuplicateEnrollment) -> Option<MergedStudent> {
  let mut rows: Vec<_> = duplicate.enrollments.iter().filter(|e| e.status.is_active()).collect();
  rows.sort_by_key(|e| (e.enrolled_at, e.class_id));
  let (kept, rest) = rows.split_first()?;
  if rest.is_empty() {
    return None;
  }
  Some(MergedStudent {
    student_id:            duplicate.student_id,
    kept_class_id:         kept.class_id,
    deactivated_class_ids: rest.iter().map(|e| e.class_id).collect(),
  })
}
