//! End-to-end promotion scenarios against an in-memory SQLite store.


use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use rollover_core::{
  class::Class,
  enrollment::{ConflictPolicy, EnrollmentStatus},
  progression::PromotionType,
  store::RolloverStore,
  year::{AcademicYear, YearStatus},
};
use rollover_store_sqlite::{NewAcademicYear, SqliteStore};
use uuid::Uuid;

use crate::{
  EngineConfig, Error, OverrideKind, PromoteRequest, PromotionEngine, PromotionOverride, YearRef,
  report::{ConsistencyViolation, FailureKind, UnmatchedReason},
};

// ─── Fixture ─────────────────────────────────────────────────────────────────

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

/// A school with a current 2025 year and a planned 2026 year, no classes.
pub(crate) struct School {
  pub store:     SqliteStore,
  pub school_id: Uuid,
  pub source:    AcademicYear,
  pub target:    AcademicYear,
}

impl School {
  pub async fn new() -> Self {
    let store = SqliteStore::open_in_memory().await.expect("in-memory store");
    let school_id = store.add_school("Hillcrest Secondary").await.unwrap();
    let source = add_year(&store, school_id, 2025, true).await;
    let target = add_year(&store, school_id, 2026, false).await;
    Self { store, school_id, source, target }
  }

  pub async fn class(&self, year: &AcademicYear, grade: &str, section: &str) -> Class {
    self
      .store
      .add_class(year, &format!("{grade}{section}"), grade, Some(section))
      .await
      .unwrap()
  }

  /// Enroll `n` new students ACTIVE in `class`.
  pub async fn enroll(&self, class: &Class, n: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
      let id = self
        .store
        .add_student(self.school_id, "Student", &format!("{}-{i}", class.name))
        .await
        .unwrap();
      self.store.add_enrollment(id, class, EnrollmentStatus::Active).await.unwrap();
      ids.push(id);
    }
    ids
  }

  pub fn engine(&self) -> PromotionEngine<SqliteStore> { self.engine_with(EngineConfig::default()) }

  pub fn engine_with(&self, config: EngineConfig) -> PromotionEngine<SqliteStore> {
    PromotionEngine::new(Arc::new(self.store.clone()), config).unwrap()
  }

  pub fn request(&self) -> PromoteRequest { PromoteRequest::new(self.school_id) }

  /// Target-year placement of every ACTIVE student.
  pub async fn placements(&self) -> BTreeMap<Uuid, Uuid> {
    self
      .store
      .list_active_enrollments(self.target.academic_year_id)
      .await
      .unwrap()
      .into_iter()
      .map(|e| (e.student_id, e.class_id))
      .collect()
  }

  pub async fn source_year(&self) -> AcademicYear {
    self
      .store
      .get_academic_year(self.source.academic_year_id)
      .await
      .unwrap()
      .unwrap()
  }
}

async fn add_year(store: &SqliteStore, school_id: Uuid, start: i32, is_current: bool) -> AcademicYear {
  store
    .add_academic_year(NewAcademicYear {
      school_id,
      name: format!("{start}-{}", start + 1),
      start_date: ymd(start, 8, 15),
      end_date: ymd(start + 1, 6, 30),
      status: if is_current { YearStatus::Active } else { YearStatus::Planning },
      is_current,
    })
    .await
    .unwrap()
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn promotes_by_section_and_rerun_is_idempotent() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c7b = s.class(&s.source, "7", "B").await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  let from_a = s.enroll(&c7a, 50).await;
  let from_b = s.enroll(&c7b, 50).await;

  let engine = s.engine_with(EngineConfig { batch_size: 30, ..EngineConfig::default() });
  let first = engine.promote(s.request()).await.unwrap();
  assert_eq!(first.source_enrollments, 100);
  assert_eq!(first.created, 100);
  assert_eq!(first.skipped_duplicate, 0);
  assert!(first.unmatched.is_empty());
  assert!(first.failed.is_empty());
  assert_eq!(first.batches_total, 4);
  assert_eq!(first.batches_completed, 4);
  assert!(first.marked_done);

  let placed = s.placements().await;
  assert!(from_a.iter().all(|id| placed[id] == c8a.class_id));
  assert!(from_b.iter().all(|id| placed[id] == c8b.class_id));

  let records = engine
    .progression_records(s.source.academic_year_id, s.target.academic_year_id)
    .await
    .unwrap();
  assert_eq!(records.len(), 100);
  assert!(records.iter().all(|r| r.promotion_type == PromotionType::Automatic));

  let check = engine
    .verify(s.source.academic_year_id, s.target.academic_year_id)
    .await
    .unwrap();
  assert!(check.is_consistent);
  assert_eq!(check.distinct_students, 100);
  assert_eq!(check.active_enrollments, 100);
  assert_eq!(check.progression_records, 100);
  assert!(check.promotion_done);

  let source = s.source_year().await;
  assert!(source.is_promotion_done);
  assert!(source.promotion_date.is_some());
  assert!(!source.promotion_in_progress);

  // Explicit ids so the rerun does not depend on which year is current.
  let again = engine
    .promote(PromoteRequest::between(
      s.school_id,
      YearRef::Id(s.source.academic_year_id),
      YearRef::Id(s.target.academic_year_id),
    ))
    .await
    .unwrap();
  assert_eq!(again.created, 0);
  assert_eq!(again.skipped_duplicate, 100);
  assert_eq!(again.ledger_repaired, 0);
  assert_eq!(again.accounted(), again.source_enrollments);
  assert_eq!(
    engine
      .progression_records(s.source.academic_year_id, s.target.academic_year_id)
      .await
      .unwrap()
      .len(),
    100
  );
}

#[tokio::test]
async fn falls_back_to_any_class_of_next_grade() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  let students = s.enroll(&c7a, 3).await;

  let report = s.engine().promote(s.request()).await.unwrap();
  assert_eq!(report.created, 3);

  let placed = s.placements().await;
  assert!(students.iter().all(|id| placed[id] == c8b.class_id));
}

#[tokio::test]
async fn missing_next_grade_leaves_students_unmatched() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  s.class(&s.target, "9", "A").await;
  s.enroll(&c7a, 4).await;

  let report = s.engine().promote(s.request()).await.unwrap();
  assert_eq!(report.created, 0);
  assert_eq!(report.unmatched.len(), 4);
  assert!(
    report
      .unmatched
      .iter()
      .all(|u| u.reason == UnmatchedReason::NoTargetClass { next_grade: 8 })
  );
  assert!(s.placements().await.is_empty());
  // Unmatched students do not block the done flag.
  assert!(report.marked_done);
}

#[tokio::test]
async fn final_grade_is_reported_as_graduating() {
  let s = School::new().await;
  let c12 = s.class(&s.source, "12", "A").await;
  s.class(&s.target, "13", "A").await;
  s.enroll(&c12, 2).await;

  let engine = s.engine_with(EngineConfig { final_grade: Some(12), ..EngineConfig::default() });
  let report = engine.promote(s.request()).await.unwrap();
  assert_eq!(report.created, 0);
  assert!(report.unmatched.iter().all(|u| u.reason == UnmatchedReason::Graduating));
}

#[tokio::test]
async fn every_source_enrollment_is_accounted_for() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c9a = s.class(&s.source, "9", "A").await;
  let odd = s.store.add_class(&s.source, "Remedial", "R", None).await.unwrap();
  s.class(&s.target, "8", "A").await;

  s.enroll(&c7a, 5).await;
  s.enroll(&c9a, 2).await;
  s.enroll(&odd, 1).await;

  // One student ACTIVE in two source classes.
  let twice = s.enroll(&c7a, 1).await[0];
  s.store.add_enrollment(twice, &c9a, EnrollmentStatus::Active).await.unwrap();

  // Not ACTIVE, so not part of the promotion.
  let left = s.store.add_student(s.school_id, "Former", "Student").await.unwrap();
  s.store.add_enrollment(left, &c7a, EnrollmentStatus::Transferred).await.unwrap();

  let report = s.engine().promote(s.request()).await.unwrap();
  assert_eq!(report.source_enrollments, 10);
  // The doubly-enrolled student is promoted from whichever class has the
  // lower id; the other enrollment is rejected.
  assert_eq!(report.created + report.unmatched.len(), 8);
  assert!(report.created >= 5);
  assert_eq!(report.failed.len(), 2);
  assert!(report.failed.iter().all(|f| f.kind == FailureKind::Validation));
  assert_eq!(report.accounted(), report.source_enrollments);

  let mut sorted = report.failed.clone();
  sorted.sort_by_key(|f| (f.student_id, f.from_class_id));
  assert_eq!(sorted, report.failed);
}

#[tokio::test]
async fn overrides_bypass_grade_advancement() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c7r = s.class(&s.target, "7", "R").await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  let students = s.enroll(&c7a, 3).await;

  let stranger = Uuid::new_v4();
  let mut request = s.request();
  request.promoted_by = Some("registrar@hillcrest".into());
  request.overrides = vec![
    PromotionOverride {
      student_id:  students[0],
      to_class_id: Some(c8b.class_id),
      kind:        OverrideKind::Manual,
      notes:       Some("sibling in 8B".into()),
    },
    PromotionOverride {
      student_id:  students[1],
      // Resolved to the only grade-7 class of the target year.
      to_class_id: None,
      kind:        OverrideKind::Repeat,
      notes:       None,
    },
    PromotionOverride {
      student_id:  stranger,
      to_class_id: Some(c8a.class_id),
      kind:        OverrideKind::Manual,
      notes:       None,
    },
  ];

  let report = s.engine().promote(request).await.unwrap();
  assert_eq!(report.created, 3);
  assert_eq!(report.ignored_overrides, vec![stranger]);

  let placed = s.placements().await;
  assert_eq!(placed[&students[0]], c8b.class_id);
  assert_eq!(placed[&students[1]], c7r.class_id);
  assert_eq!(placed[&students[2]], c8a.class_id);

  let records = s
    .engine()
    .progression_records(s.source.academic_year_id, s.target.academic_year_id)
    .await
    .unwrap();
  let by_student: BTreeMap<Uuid, _> = records.into_iter().map(|r| (r.student_id, r)).collect();
  assert_eq!(by_student[&students[0]].promotion_type, PromotionType::Manual);
  assert_eq!(by_student[&students[0]].notes.as_deref(), Some("sibling in 8B"));
  assert_eq!(by_student[&students[1]].promotion_type, PromotionType::Repeat);
  assert_eq!(by_student[&students[2]].promotion_type, PromotionType::Automatic);
  assert!(
    by_student
      .values()
      .all(|r| r.promoted_by.as_deref() == Some("registrar@hillcrest"))
  );
}

#[tokio::test]
async fn skip_policy_keeps_existing_placement() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  let students = s.enroll(&c7a, 2).await;
  s.store.add_enrollment(students[0], &c8b, EnrollmentStatus::Active).await.unwrap();

  let report = s.engine().promote(s.request()).await.unwrap();
  assert_eq!(report.created, 1);
  assert_eq!(report.skipped_duplicate, 1);
  assert_eq!(report.retained.len(), 1);
  assert_eq!(report.retained[0].student_id, students[0]);
  assert_eq!(report.retained[0].requested_class_id, c8a.class_id);
  assert_eq!(report.retained[0].existing_class_id, c8b.class_id);

  let placed = s.placements().await;
  assert_eq!(placed[&students[0]], c8b.class_id);
  assert_eq!(placed[&students[1]], c8a.class_id);
}

#[tokio::test]
async fn overwrite_policy_replaces_existing_placement() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  let students = s.enroll(&c7a, 1).await;
  s.store.add_enrollment(students[0], &c8b, EnrollmentStatus::Active).await.unwrap();

  let engine = s.engine_with(EngineConfig {
    conflict_policy: ConflictPolicy::Overwrite,
    ..EngineConfig::default()
  });
  let report = engine.promote(s.request()).await.unwrap();
  assert_eq!(report.created, 1);
  assert_eq!(report.replaced, 1);
  assert!(report.retained.is_empty());

  assert_eq!(s.placements().await[&students[0]], c8a.class_id);
  let check = engine
    .verify(s.source.academic_year_id, s.target.academic_year_id)
    .await
    .unwrap();
  assert!(check.is_consistent);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  s.class(&s.target, "8", "A").await;
  s.enroll(&c7a, 5).await;

  let mut request = s.request();
  request.dry_run = true;
  let report = s.engine().promote(request).await.unwrap();

  assert!(report.dry_run);
  assert_eq!(report.planned, 5);
  assert_eq!(report.pending, 5);
  assert_eq!(report.created, 0);
  assert_eq!(report.accounted(), 5);
  assert!(!report.marked_done);
  assert!(s.placements().await.is_empty());

  let source = s.source_year().await;
  assert!(!source.is_promotion_done);
  assert!(!source.promotion_in_progress);
}

#[tokio::test]
async fn dry_run_previews_each_source_class() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  let c7b = s.class(&s.source, "7", "B").await;
  let c12 = s.class(&s.source, "12", "A").await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  s.enroll(&c7a, 50).await;
  s.enroll(&c7b, 50).await;
  s.enroll(&c12, 3).await;

  let engine = s.engine_with(EngineConfig { final_grade: Some(12), ..EngineConfig::default() });
  let mut request = s.request();
  request.dry_run = true;
  let report = engine.promote(request).await.unwrap();

  // Ordered by class name: "12A", "7A", "7B".
  let plan = &report.class_plan;
  assert_eq!(plan.len(), 3);

  assert_eq!(plan[0].from_class_id, c12.class_id);
  assert!(plan[0].graduating);
  assert_eq!(plan[0].to_class_id, None);
  assert_eq!(plan[0].next_grade, Some(13));
  assert_eq!(plan[0].students, 3);

  assert_eq!(plan[1].from_class_id, c7a.class_id);
  assert_eq!(plan[1].to_class_id, Some(c8a.class_id));
  assert_eq!(plan[1].to_class_name.as_deref(), Some("8A"));
  assert_eq!(plan[1].next_grade, Some(8));
  assert!(!plan[1].graduating);
  assert_eq!(plan[1].students, 50);

  assert_eq!(plan[2].from_class_id, c7b.class_id);
  assert_eq!(plan[2].to_class_id, Some(c8b.class_id));
  assert_eq!(plan[2].students, 50);

  assert!(s.placements().await.is_empty());
}

#[tokio::test]
async fn skip_if_done_returns_early() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  s.class(&s.target, "8", "A").await;
  s.enroll(&c7a, 2).await;
  s.engine().promote(s.request()).await.unwrap();

  let mut request = s.request();
  request.skip_if_done = true;
  let report = s.engine().promote(request).await.unwrap();
  assert!(report.skipped_already_done);
  assert_eq!(report.source_enrollments, 0);
  assert_eq!(report.skipped_duplicate, 0);
}

#[tokio::test]
async fn held_lock_rejects_promotion_until_released() {
  let s = School::new().await;
  let c7a = s.class(&s.source, "7", "A").await;
  s.class(&s.target, "8", "A").await;
  s.enroll(&c7a, 2).await;

  assert!(s.store.try_acquire_promotion_lock(s.source.academic_year_id).await.unwrap());

  let engine = s.engine();
  let err = engine.promote(s.request()).await.unwrap_err();
  assert!(matches!(err, Error::PromotionInProgress(id) if id == s.source.academic_year_id));
  assert!(s.placements().await.is_empty());

  engine.release_lock(s.source.academic_year_id).await.unwrap();
  let report = engine.promote(s.request()).await.unwrap();
  assert_eq!(report.created, 2);
}

// ─── Resolution ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_school_is_not_found() {
  let s = School::new().await;
  let err = s.engine().promote(PromoteRequest::new(Uuid::new_v4())).await.unwrap_err();
  assert!(matches!(err, Error::SchoolNotFound(_)));
  assert!(err.is_not_found());
}

#[tokio::test]
async fn missing_next_year_is_not_found() {
  let s = School::new().await;
  let request = PromoteRequest::between(s.school_id, YearRef::Id(s.target.academic_year_id), YearRef::Next);
  let err = s.engine().promote(request).await.unwrap_err();
  assert!(matches!(err, Error::AcademicYearNotFound(_)));
}

#[tokio::test]
async fn same_source_and_target_is_rejected() {
  let s = School::new().await;
  let id = YearRef::Id(s.source.academic_year_id);
  let err = s.engine().promote(PromoteRequest::between(s.school_id, id, id)).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn next_follows_an_explicit_source() {
  let s = School::new().await;
  let later = add_year(&s.store, s.school_id, 2027, false).await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c9a = s.class(&later, "9", "A").await;
  let students = s.enroll(&c8a, 2).await;

  let request = PromoteRequest::between(s.school_id, YearRef::Id(s.target.academic_year_id), YearRef::Next);
  let report = s.engine().promote(request).await.unwrap();
  assert_eq!(report.target_year_id, later.academic_year_id);
  assert_eq!(report.created, 2);

  let placed = s.store.list_active_enrollments(later.academic_year_id).await.unwrap();
  assert!(placed.iter().all(|e| e.class_id == c9a.class_id && students.contains(&e.student_id)));
}

#[tokio::test]
async fn engine_rejects_invalid_config() {
  let s = School::new().await;
  let config = EngineConfig { concurrency: 0, ..EngineConfig::default() };
  let result = PromotionEngine::new(Arc::new(s.store.clone()), config);
  assert!(matches!(result, Err(Error::Validation(_))));
}

// ─── Verification and merge ──────────────────────────────────────────────────

#[tokio::test]
async fn verify_reports_duplicates_and_merge_repairs_them() {
  let s = School::new().await;
  let c8a = s.class(&s.target, "8", "A").await;
  let c8b = s.class(&s.target, "8", "B").await;
  let students = s.enroll(&c8a, 2).await;
  let doubled = students[0];
  let second = s.store.add_enrollment(doubled, &c8b, EnrollmentStatus::Active).await.unwrap();

  let engine = s.engine();
  let (src, tgt) = (s.source.academic_year_id, s.target.academic_year_id);

  let check = engine.verify(src, tgt).await.unwrap();
  assert!(!check.is_consistent);
  assert_eq!(check.distinct_students, 2);
  assert_eq!(check.active_enrollments, 3);
  assert!(!check.promotion_done);
  assert_eq!(check.violations.len(), 1);
  let ConsistencyViolation::DuplicateActiveEnrollment { student_id, class_ids } = &check.violations[0]
  else {
    panic!("expected a duplicate violation, got {:?}", check.violations[0]);
  };
  assert_eq!(*student_id, doubled);
  assert_eq!(class_ids.len(), 2);

  let preview = engine.merge_duplicates(tgt, true).await.unwrap();
  assert_eq!(preview.deactivated, 1);
  assert!(!engine.verify(src, tgt).await.unwrap().is_consistent);

  let merged = engine.merge_duplicates(tgt, false).await.unwrap();
  assert_eq!(merged.students.len(), 1);
  assert_eq!(merged.students[0].student_id, doubled);
  assert_eq!(merged.students[0].deactivated_class_ids.len(), 1);
  // The later enrollment loses.
  assert_eq!(merged.students[0].deactivated_class_ids[0], second.class_id);

  let after = engine.verify(src, tgt).await.unwrap();
  assert!(after.is_consistent);
  assert_eq!(after.active_enrollments, 2);
}

#[tokio::test]
async fn verify_unknown_year_is_not_found() {
  let s = School::new().await;
  let err = s
    .engine()
    .verify(s.source.academic_year_id, Uuid::new_v4())
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}
