//! Applies promotion intents to the target year in bounded batches.
//!
//! Batches run one after another; within a batch at most `concurrency`
//! writes are in flight. Each intent is an enrollment upsert followed by a
//! progression record append, both create-if-absent, so re-running a
//! promotion converges instead of duplicating rows.

use std::time::Duration;

use futures::{StreamExt, stream};
use rollover_core::{
  enrollment::{ConflictPolicy, NewEnrollment, UpsertOutcome},
  store::{RolloverStore, StoreError},
};
use tokio::time::timeout;

use crate::{
  cancel::CancelToken,
  error::BoxError,
  ledger::ProgressionLedger,
  planner::PromotionIntent,
  report::{FailedIntent, FailureKind, PromotionReport, RetainedPlacement},
  resolver::YearPair,
};

/// Result of applying one intent.
#[derive(Debug)]
enum IntentOutcome {
  Created { replaced: bool },
  /// The exact enrollment already existed. `ledger_repaired` is set when its
  /// progression record was missing and has now been written.
  Existing { ledger_repaired: bool },
  Retained(RetainedPlacement),
  Failed(FailedIntent),
}

pub struct EnrollmentReconciler<'a, S> {
  store:       &'a S,
  years:       YearPair,
  policy:      ConflictPolicy,
  batch_size:  usize,
  concurrency: usize,
  timeout:     Duration,
  promoted_by: Option<&'a str>,
}

impl<'a, S: RolloverStore> EnrollmentReconciler<'a, S> {
  pub fn new(store: &'a S, years: YearPair) -> Self {
    Self {
      store,
      years,
      policy: ConflictPolicy::default(),
      batch_size: 100,
      concurrency: 8,
      timeout: Duration::from_secs(30),
      promoted_by: None,
    }
  }

  pub fn policy(mut self, policy: ConflictPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn batch_size(mut self, n: usize) -> Self {
    self.batch_size = n.max(1);
    self
  }

  pub fn concurrency(mut self, n: usize) -> Self {
    self.concurrency = n.max(1);
    self
  }

  pub fn timeout(mut self, limit: Duration) -> Self {
    self.timeout = limit;
    self
  }

  pub fn promoted_by(mut self, who: Option<&'a str>) -> Self {
    self.promoted_by = who;
    self
  }

  /// Apply `intents` and tally the outcomes into `report`.
  ///
  /// Stops before the next batch once `cancel` fires. A fatal store error
  /// stops the run after the current batch has drained; the batches already
  /// completed stay applied and unapplied intents remain in
  /// `report.pending`.
  pub async fn run(
    &self,
    intents: &[PromotionIntent],
    report:  &mut PromotionReport,
    cancel:  &CancelToken,
  ) -> Result<(), BoxError> {
    report.pending += intents.len();
    report.batches_total = intents.len().div_ceil(self.batch_size);

    for (index, batch) in intents.chunks(self.batch_size).enumerate() {
      if cancel.is_cancelled() {
        tracing::warn!(
          completed = report.batches_completed,
          total = report.batches_total,
          "promotion cancelled; remaining batches not applied",
        );
        report.cancelled = true;
        return Ok(());
      }

      let results: Vec<Result<IntentOutcome, S::Error>> = stream::iter(batch)
        .map(|intent| self.apply(intent))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

      let mut fatal = None;
      for result in results {
        match result {
          Ok(outcome) => tally(report, outcome),
          Err(e) => {
            if fatal.is_none() {
              fatal = Some(e);
            }
          }
        }
      }

      if let Some(e) = fatal {
        tracing::error!(batch = index + 1, error = %e, "fatal store error; aborting promotion");
        return Err(Box::new(e));
      }

      report.batches_completed += 1;
      tracing::info!(
        batch = index + 1,
        total = report.batches_total,
        created = report.created,
        skipped = report.skipped_duplicate,
        failed = report.failed.len(),
        "batch applied",
      );
    }

    Ok(())
  }

  /// Per-record failures come back as [`IntentOutcome::Failed`]; only fatal
  /// store errors are returned as `Err`.
  async fn apply(&self, intent: &PromotionIntent) -> Result<IntentOutcome, S::Error> {
    let enrollment = NewEnrollment {
      student_id:       intent.student_id,
      class_id:         intent.to_class_id,
      academic_year_id: self.years.target,
    };

    let upsert = match timeout(self.timeout, self.store.upsert_enrollment(enrollment, self.policy)).await {
      Ok(Ok(outcome)) => outcome,
      Ok(Err(e)) if e.is_fatal() => return Err(e),
      Ok(Err(e)) => return Ok(self.failed(intent, FailureKind::Conflict, e.to_string())),
      Err(_) => {
        return Ok(self.failed(
          intent,
          FailureKind::Timeout,
          format!("enrollment write timed out after {:?}", self.timeout),
        ));
      }
    };

    if let UpsertOutcome::Retained { class_id } = upsert {
      return Ok(IntentOutcome::Retained(RetainedPlacement {
        student_id:         intent.student_id,
        requested_class_id: intent.to_class_id,
        existing_class_id:  class_id,
      }));
    }

    let ledger = ProgressionLedger::new(self.store);
    let recorded = match timeout(self.timeout, ledger.record(intent, self.years, self.promoted_by)).await {
      Ok(Ok(recorded)) => recorded,
      Ok(Err(e)) if e.is_fatal() => return Err(e),
      Ok(Err(e)) => {
        return Ok(self.failed(
          intent,
          FailureKind::Conflict,
          format!("enrollment written but progression record failed: {e}"),
        ));
      }
      Err(_) => {
        return Ok(self.failed(
          intent,
          FailureKind::Timeout,
          format!("enrollment written but progression record timed out after {:?}", self.timeout),
        ));
      }
    };

    tracing::debug!(student = %intent.student_id, to_class = %intent.to_class_id, ?upsert, recorded, "intent applied");
    Ok(if upsert.created() {
      IntentOutcome::Created { replaced: matches!(upsert, UpsertOutcome::Replaced { .. }) }
    } else {
      IntentOutcome::Existing { ledger_repaired: recorded }
    })
  }

  fn failed(&self, intent: &PromotionIntent, kind: FailureKind, message: String) -> IntentOutcome {
    tracing::warn!(
      student = %intent.student_id,
      to_class = %intent.to_class_id,
      ?kind,
      %message,
      "promotion intent failed",
    );
    IntentOutcome::Failed(FailedIntent {
      student_id: intent.student_id,
      from_class_id: Some(intent.from_class_id),
      to_class_id: Some(intent.to_class_id),
      kind,
      message,
    })
  }
}

fn tally(report: &mut PromotionReport, outcome: IntentOutcome) {
  report.pending -= 1;
  match outcome {
    IntentOutcome::Created { replaced } => {
      report.created += 1;
      if replaced {
        report.replaced += 1;
      }
    }
    IntentOutcome::Existing { ledger_repaired } => {
      report.skipped_duplicate += 1;
      if ledger_repaired {
        report.ledger_repaired += 1;
      }
    }
    IntentOutcome::Retained(placement) => {
      report.skipped_duplicate += 1;
      report.retained.push(placement);
    }
    IntentOutcome::Failed(failure) => report.failed.push(failure),
  }
}
