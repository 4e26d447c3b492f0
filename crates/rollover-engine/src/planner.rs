//! Turns ACTIVE source enrollments and a class mapping into an ordered list of
//! promotion intents.

use std::collections::{BTreeMap, BTreeSet};

use rollover_core::{
  class::{Class, parse_grade},
  enrollment::ActiveEnrollment,
  progression::PromotionType,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  mapper::{ClassMapping, ClassTarget},
  report::{FailedIntent, FailureKind, UnmatchedStudent},
};

/// One enrollment the reconciler should write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionIntent {
  pub student_id:     Uuid,
  pub from_class_id:  Uuid,
  pub to_class_id:    Uuid,
  pub promotion_type: PromotionType,
  pub notes:          Option<String>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideKind {
  /// Place the student in a specific class.
  #[default]
  Manual,
  /// Keep the student at the same grade; the target class must be at the
  /// student's current grade.
  Repeat,
}

impl From<OverrideKind> for PromotionType {
  fn from(k: OverrideKind) -> Self {
    match k {
      OverrideKind::Manual => PromotionType::Manual,
      OverrideKind::Repeat => PromotionType::Repeat,
    }
  }
}

/// A caller-chosen target class for one student, bypassing grade
/// advancement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionOverride {
  pub student_id:  Uuid,
  /// Required for [`OverrideKind::Manual`]. A repeat without a class goes to
  /// the lowest-id target class at the student's current grade.
  #[serde(default)]
  pub to_class_id: Option<Uuid>,
  #[serde(default)]
  pub kind:        OverrideKind,
  #[serde(default)]
  pub notes:       Option<String>,
}

/// Planner output. Every input enrollment lands in exactly one of `intents`,
/// `unmatched` or `rejected`.
#[derive(Debug, Clone, Default)]
pub struct PromotionPlan {
  pub total_enrollments: usize,
  /// Sorted by `(student_id, from_class_id)`, at most one per student.
  pub intents:           Vec<PromotionIntent>,
  pub unmatched:         Vec<UnmatchedStudent>,
  /// Validation failures.
  pub rejected:          Vec<FailedIntent>,
  /// Students named by an override but without an ACTIVE source enrollment.
  pub ignored_overrides: Vec<Uuid>,
}

pub struct PromotionPlanner<'a> {
  mapping:        &'a ClassMapping,
  target_classes: BTreeMap<Uuid, &'a Class>,
}

impl<'a> PromotionPlanner<'a> {
  pub fn new(mapping: &'a ClassMapping, target_classes: &'a [Class]) -> Self {
    Self {
      mapping,
      target_classes: target_classes.iter().map(|c| (c.class_id, c)).collect(),
    }
  }

  /// Build the plan. When several overrides name the same student the last
  /// one wins.
  pub fn plan(
    &self,
    enrollments: &[ActiveEnrollment],
    overrides:   &[PromotionOverride],
  ) -> PromotionPlan {
    let mut ordered: Vec<&ActiveEnrollment> = enrollments.iter().collect();
    ordered.sort_by_key(|e| (e.student_id, e.class_id));

    let by_student: BTreeMap<Uuid, &PromotionOverride> =
      overrides.iter().map(|o| (o.student_id, o)).collect();

    let mut plan = PromotionPlan {
      total_enrollments: enrollments.len(),
      ..PromotionPlan::default()
    };
    let mut seen: BTreeSet<Uuid> = BTreeSet::new();

    for enrollment in ordered {
      if !seen.insert(enrollment.student_id) {
        plan.rejected.push(reject(
          enrollment,
          None,
          "student has more than one ACTIVE enrollment in the source year".into(),
        ));
        continue;
      }

      if let Some(ov) = by_student.get(&enrollment.student_id) {
        match self.check_override(enrollment, ov) {
          Ok(to_class_id) => plan.intents.push(PromotionIntent {
            student_id: enrollment.student_id,
            from_class_id: enrollment.class_id,
            to_class_id,
            promotion_type: ov.kind.into(),
            notes: ov.notes.clone(),
          }),
          Err(message) => plan.rejected.push(reject(enrollment, ov.to_class_id, message)),
        }
        continue;
      }

      match self.mapping.get(enrollment.class_id) {
        Some(ClassTarget::Mapped(to)) => plan.intents.push(PromotionIntent {
          student_id:     enrollment.student_id,
          from_class_id:  enrollment.class_id,
          to_class_id:    *to,
          promotion_type: PromotionType::Automatic,
          notes:          None,
        }),
        Some(ClassTarget::Unmapped(reason)) => plan.unmatched.push(UnmatchedStudent {
          student_id:    enrollment.student_id,
          from_class_id: enrollment.class_id,
          reason:        reason.clone(),
        }),
        Some(ClassTarget::Invalid(message)) => {
          plan.rejected.push(reject(enrollment, None, message.clone()))
        }
        None => plan.rejected.push(reject(
          enrollment,
          None,
          format!("class {} is not part of the source year", enrollment.class_id),
        )),
      }
    }

    plan.ignored_overrides = by_student
      .keys()
      .filter(|id| !seen.contains(id))
      .copied()
      .collect();

    plan
  }

  /// Resolve the override's target class, checking it belongs to the target
  /// year and, for a repeat, sits at the student's current grade.
  fn check_override(
    &self,
    enrollment: &ActiveEnrollment,
    ov:         &PromotionOverride,
  ) -> Result<Uuid, String> {
    let Some(to_class_id) = ov.to_class_id else {
      if ov.kind != OverrideKind::Repeat {
        return Err("manual override names no target class".into());
      }
      let grade = parse_grade(&enrollment.grade).map_err(|e| e.to_string())?;
      return self
        .target_classes
        .values()
        .find(|c| c.grade_level().is_ok_and(|g| g == grade))
        .map(|c| c.class_id)
        .ok_or_else(|| format!("no class at grade {grade} in the target year to repeat in"));
    };

    let Some(target) = self.target_classes.get(&to_class_id) else {
      return Err(format!("override class {to_class_id} is not part of the target year"));
    };
    if ov.kind == OverrideKind::Repeat {
      let from = parse_grade(&enrollment.grade).map_err(|e| e.to_string())?;
      let to = target.grade_level().map_err(|e| e.to_string())?;
      if from != to {
        return Err(format!(
          "repeat override targets grade {to} but the student is in grade {from}"
        ));
      }
    }
    Ok(to_class_id)
  }
}

fn reject(enrollment: &ActiveEnrollment, to_class_id: Option<Uuid>, message: String) -> FailedIntent {
  FailedIntent {
    student_id: enrollment.student_id,
    from_class_id: Some(enrollment.class_id),
    to_class_id,
    kind: FailureKind::Validation,
    message,
  }
}
