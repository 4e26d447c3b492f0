//! `PromotionEngine`: the single entry point tying resolver, mapper,
//! planner, reconciler and verifier together.

use std::sync::Arc;

use rollover_core::{
  progression::ProgressionRecord,
  store::RolloverStore,
  year::AcademicYear,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
  Error,
  Result,
  cancel::CancelToken,
  config::EngineConfig,
  ledger::ProgressionLedger,
  mapper::GradeAdvancementMapper,
  merge::DuplicateMerger,
  planner::{PromotionOverride, PromotionPlanner},
  reconciler::EnrollmentReconciler,
  report::{ConsistencyReport, MergeReport, PromotionReport},
  resolver::{AcademicYearResolver, ResolvedYears, YearPair, YearRef},
  timed,
  verifier::ConsistencyVerifier,
};

// ─── Request ─────────────────────────────────────────────────────────────────

/// Parameters of one promotion run.
#[derive(Debug, Clone)]
pub struct PromoteRequest {
  pub school_id:    Uuid,
  pub source:       YearRef,
  pub target:       YearRef,
  /// Resolve, map and plan only; nothing is written.
  pub dry_run:      bool,
  /// Return immediately if the source year is already marked promoted.
  pub skip_if_done: bool,
  pub overrides:    Vec<PromotionOverride>,
  /// Recorded on every progression record this run writes.
  pub promoted_by:  Option<String>,
}

impl PromoteRequest {
  /// Promote the current year of `school_id` into the year following it.
  pub fn new(school_id: Uuid) -> Self {
    Self {
      school_id,
      source: YearRef::Current,
      target: YearRef::Next,
      dry_run: false,
      skip_if_done: false,
      overrides: Vec::new(),
      promoted_by: None,
    }
  }

  pub fn between(school_id: Uuid, source: YearRef, target: YearRef) -> Self {
    Self { source, target, ..Self::new(school_id) }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct PromotionEngine<S> {
  store:  Arc<S>,
  config: EngineConfig,
}

impl<S: RolloverStore> PromotionEngine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { store, config })
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub async fn promote(&self, request: PromoteRequest) -> Result<PromotionReport> {
    self.promote_with_cancel(request, &CancelToken::new()).await
  }

  /// Run a promotion that stops between batches once `cancel` fires.
  ///
  /// Fails before any write if the school or a year cannot be resolved, or
  /// if another run holds the source year's lock. A fatal store error during
  /// reconciliation yields [`Error::Fatal`] with the partial report.
  #[instrument(
    skip_all,
    fields(school = %request.school_id, source = %request.source, target = %request.target, dry_run = request.dry_run),
  )]
  pub async fn promote_with_cancel(
    &self,
    request: PromoteRequest,
    cancel:  &CancelToken,
  ) -> Result<PromotionReport> {
    let store = self.store.as_ref();
    let limit = self.config.operation_timeout();

    let years = AcademicYearResolver::new(store, limit)
      .resolve(request.school_id, request.source, request.target)
      .await?;
    let pair = years.pair();
    let mut report = PromotionReport::new(pair.source, pair.target, request.dry_run);

    if request.skip_if_done && years.source.is_promotion_done {
      tracing::info!(year = %years.source.name, "source year already promoted; skipping");
      report.skipped_already_done = true;
      report.finish();
      return Ok(report);
    }

    let source_classes = timed(limit, store.list_classes(pair.source)).await?;
    let target_classes = timed(limit, store.list_classes(pair.target)).await?;
    let enrollments = timed(limit, store.list_active_enrollments(pair.source)).await?;

    let mapping =
      GradeAdvancementMapper::new(self.config.final_grade).map(&source_classes, &target_classes);
    for (class, target) in mapping.iter() {
      tracing::debug!(%class, ?target, "class mapping");
    }
    report.class_plan = mapping.preview(&source_classes, &target_classes, &enrollments);
    let plan = PromotionPlanner::new(&mapping, &target_classes).plan(&enrollments, &request.overrides);

    for student in &plan.ignored_overrides {
      tracing::warn!(%student, "override ignored: student has no ACTIVE enrollment in the source year");
    }

    report.source_enrollments = plan.total_enrollments;
    report.planned = plan.intents.len();
    report.unmatched = plan.unmatched;
    report.failed = plan.rejected;
    report.ignored_overrides = plan.ignored_overrides;

    tracing::info!(
      from = %years.source.name,
      to = %years.target.name,
      enrollments = report.source_enrollments,
      classes_mapped = mapping.mapped_count(),
      planned = report.planned,
      unmatched = report.unmatched.len(),
      rejected = report.failed.len(),
      "promotion planned",
    );

    if request.dry_run {
      report.pending = report.planned;
      report.batches_total = report.planned.div_ceil(self.config.batch_size);
      report.finish();
      return Ok(report);
    }

    let acquired = match timed(limit, store.try_acquire_promotion_lock(pair.source)).await {
      Ok(acquired) => acquired,
      Err(Error::Timeout(waited)) => {
        // The write may still land after the deadline; a release queued
        // behind it clears the flag again.
        tracing::warn!(year = %pair.source, "lock acquisition timed out; releasing");
        if let Err(e) = timed(limit, store.release_promotion_lock(pair.source)).await {
          tracing::warn!(error = %e, year = %pair.source, "failed to release promotion lock");
        }
        return Err(Error::Timeout(waited));
      }
      Err(e) => return Err(e),
    };
    if !acquired {
      return Err(Error::PromotionInProgress(pair.source));
    }

    let outcome = EnrollmentReconciler::new(store, pair)
      .policy(self.config.conflict_policy)
      .batch_size(self.config.batch_size)
      .concurrency(self.config.concurrency)
      .timeout(limit)
      .promoted_by(request.promoted_by.as_deref())
      .run(&plan.intents, &mut report, cancel)
      .await;

    if outcome.is_ok() && report.is_complete() {
      match timed(limit, store.set_promotion_done(pair.source, true)).await {
        Ok(()) => report.marked_done = true,
        Err(e) => tracing::warn!(error = %e, "promotion applied but the done flag could not be set"),
      }
    }

    if let Err(e) = timed(limit, store.release_promotion_lock(pair.source)).await {
      tracing::warn!(error = %e, year = %pair.source, "failed to release promotion lock");
    }

    report.finish();
    match outcome {
      Ok(()) => {
        tracing::info!(
          created = report.created,
          skipped_duplicate = report.skipped_duplicate,
          unmatched = report.unmatched.len(),
          failed = report.failed.len(),
          cancelled = report.cancelled,
          "promotion finished",
        );
        Ok(report)
      }
      Err(source) => Err(Error::Fatal { source, partial: Box::new(report) }),
    }
  }

  /// Check the target year for students ACTIVE in more than one class.
  #[instrument(skip_all, fields(source = %source_year_id, target = %target_year_id))]
  pub async fn verify(
    &self,
    source_year_id: Uuid,
    target_year_id: Uuid,
  ) -> Result<ConsistencyReport> {
    let years = ResolvedYears {
      source: self.year(source_year_id).await?,
      target: self.year(target_year_id).await?,
    };
    ConsistencyVerifier::new(self.store.as_ref(), self.config.operation_timeout())
      .verify(&years)
      .await
  }

  /// Keep one ACTIVE enrollment per student in `academic_year_id`.
  pub async fn merge_duplicates(
    &self,
    academic_year_id: Uuid,
    dry_run: bool,
  ) -> Result<MergeReport> {
    let year = self.year(academic_year_id).await?;
    DuplicateMerger::new(self.store.as_ref(), self.config.operation_timeout())
      .merge(&year, dry_run)
      .await
  }

  pub async fn progression_records(
    &self,
    source_year_id: Uuid,
    target_year_id: Uuid,
  ) -> Result<Vec<ProgressionRecord>> {
    let years = YearPair { source: source_year_id, target: target_year_id };
    timed(self.config.operation_timeout(), ProgressionLedger::new(self.store.as_ref()).list(years))
      .await
  }

  /// Clear a lock left behind by a run that died without releasing it.
  pub async fn release_lock(&self, academic_year_id: Uuid) -> Result<()> {
    let year = self.year(academic_year_id).await?;
    if !year.promotion_in_progress {
      tracing::info!(year = %year.name, "no promotion lock held");
    }
    timed(self.config.operation_timeout(), self.store.release_promotion_lock(academic_year_id)).await
  }

  async fn year(&self, academic_year_id: Uuid) -> Result<AcademicYear> {
    timed(self.config.operation_timeout(), self.store.get_academic_year(academic_year_id))
      .await?
      .ok_or_else(|| Error::AcademicYearNotFound(academic_year_id.to_string()))
  }
}
