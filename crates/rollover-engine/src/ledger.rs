//! Progression ledger: the audit trail written alongside created enrollments.

use rollover_core::{
  progression::{NewProgressionRecord, ProgressionRecord},
  store::RolloverStore,
};

use crate::{planner::PromotionIntent, resolver::YearPair};

pub struct ProgressionLedger<'a, S> {
  store: &'a S,
}

impl<'a, S: RolloverStore> ProgressionLedger<'a, S> {
  pub fn new(store: &'a S) -> Self { Self { store } }

  /// Append the record for `intent`. Returns `false` if the record already
  /// existed.
  pub async fn record(
    &self,
    intent:      &PromotionIntent,
    years:       YearPair,
    promoted_by: Option<&str>,
  ) -> Result<bool, S::Error> {
    self
      .store
      .append_progression_record(NewProgressionRecord {
        student_id:            intent.student_id,
        from_academic_year_id: years.source,
        to_academic_year_id:   years.target,
        from_class_id:         intent.from_class_id,
        to_class_id:           intent.to_class_id,
        promotion_type:        intent.promotion_type,
        promoted_by:           promoted_by.map(str::to_owned),
        notes:                 intent.notes.clone(),
      })
      .await
  }

  pub async fn list(&self, years: YearPair) -> Result<Vec<ProgressionRecord>, S::Error> {
    self.store.list_progression_records(years.source, years.target).await
  }
}
