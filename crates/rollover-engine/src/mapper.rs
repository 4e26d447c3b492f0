//! Grade advancement: pairs every source class with a class one grade up in
//! the target year.
//!
//! Matching order for a source class at grade `g`, section `s`:
//!
//! 1. a target class at grade `g + 1` with section `s`;
//! 2. otherwise any target class at grade `g + 1`;
//! 3. otherwise the class stays unmapped.
//!
//! Ties are broken by the lowest class id so that the mapping is stable.

use std::collections::BTreeMap;

use rollover_core::{class::Class, enrollment::ActiveEnrollment};
use uuid::Uuid;

use crate::report::{ClassPreview, UnmatchedReason};

/// Where the students of one source class go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassTarget {
  Mapped(Uuid),
  Unmapped(UnmatchedReason),
  /// The source class cannot be mapped because its own data is malformed.
  Invalid(String),
}

/// `source class id → target`, covering every source class.
#[derive(Debug, Clone, Default)]
pub struct ClassMapping {
  targets: BTreeMap<Uuid, ClassTarget>,
}

impl ClassMapping {
  /// The target for a source class, or `None` if the class was not part of
  /// the source year handed to the mapper.
  pub fn get(&self, source_class_id: Uuid) -> Option<&ClassTarget> {
    self.targets.get(&source_class_id)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &ClassTarget)> { self.targets.iter() }

  pub fn mapped_count(&self) -> usize {
    self
      .targets
      .values()
      .filter(|t| matches!(t, ClassTarget::Mapped(_)))
      .count()
  }

  /// One row per source class, ordered by class name.
  pub fn preview(
    &self,
    source:      &[Class],
    target:      &[Class],
    enrollments: &[ActiveEnrollment],
  ) -> Vec<ClassPreview> {
    let names: BTreeMap<Uuid, &str> = target.iter().map(|c| (c.class_id, c.name.as_str())).collect();
    let mut headcount: BTreeMap<Uuid, usize> = BTreeMap::new();
    for e in enrollments {
      *headcount.entry(e.class_id).or_default() += 1;
    }

    let mut rows: Vec<ClassPreview> = source
      .iter()
      .map(|class| {
        let to_class_id = match self.get(class.class_id) {
          Some(ClassTarget::Mapped(id)) => Some(*id),
          _ => None,
        };
        ClassPreview {
          from_class_id: class.class_id,
          from_class_name: class.name.clone(),
          to_class_id,
          to_class_name: to_class_id.and_then(|id| names.get(&id)).map(|n| (*n).to_owned()),
          next_grade: class.grade_level().ok().and_then(|g| g.checked_add(1)),
          graduating: matches!(
            self.get(class.class_id),
            Some(ClassTarget::Unmapped(UnmatchedReason::Graduating))
          ),
          students: headcount.get(&class.class_id).copied().unwrap_or(0),
        }
      })
      .collect();
    rows.sort_by(|a, b| {
      a.from_class_name
        .cmp(&b.from_class_name)
        .then(a.from_class_id.cmp(&b.from_class_id))
    });
    rows
  }
}

#[derive(Debug, Clone, Default)]
pub struct GradeAdvancementMapper {
  final_grade: Option<u32>,
}

impl GradeAdvancementMapper {
  pub fn new(final_grade: Option<u32>) -> Self { Self { final_grade } }

  pub fn map(&self, source: &[Class], target: &[Class]) -> ClassMapping {
    // grade → classes at that grade, lowest id first.
    let mut by_grade: BTreeMap<u32, Vec<&Class>> = BTreeMap::new();
    for class in target {
      match class.grade_level() {
        Ok(g) => by_grade.entry(g).or_default().push(class),
        Err(e) => tracing::debug!(class_id = %class.class_id, "ignoring target class: {e}"),
      }
    }
    for classes in by_grade.values_mut() {
      classes.sort_by_key(|c| c.class_id);
    }

    let targets = source
      .iter()
      .map(|class| (class.class_id, self.target_for(class, &by_grade)))
      .collect();

    ClassMapping { targets }
  }

  fn target_for(&self, class: &Class, by_grade: &BTreeMap<u32, Vec<&Class>>) -> ClassTarget {
    let grade = match class.grade_level() {
      Ok(g) => g,
      Err(e) => return ClassTarget::Invalid(format!("class {}: {e}", class.name)),
    };

    if self.final_grade.is_some_and(|last| grade >= last) {
      return ClassTarget::Unmapped(UnmatchedReason::Graduating);
    }

    let Some(next_grade) = grade.checked_add(1) else {
      return ClassTarget::Invalid(format!("class {}: grade {grade} cannot advance", class.name));
    };

    let Some(candidates) = by_grade.get(&next_grade) else {
      return ClassTarget::Unmapped(UnmatchedReason::NoTargetClass { next_grade });
    };

    let chosen = candidates
      .iter()
      .find(|c| c.section == class.section)
      .or_else(|| candidates.first());

    match chosen {
      Some(c) => ClassTarget::Mapped(c.class_id),
      None => ClassTarget::Unmapped(UnmatchedReason::NoTargetClass { next_grade }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn class(id: u128, year: u128, grade: &str, section: Option<&str>) -> Class {
    Class {
      class_id:         Uuid::from_u128(id),
      school_id:        Uuid::from_u128(1),
      academic_year_id: Uuid::from_u128(year),
      name:             format!("{grade}{}", section.unwrap_or("")),
      grade:            grade.into(),
      section:          section.map(str::to_owned),
    }
  }

  #[test]
  fn same_section_is_preferred() {
    let source = vec![class(10, 1, "7", Some("A")), class(11, 1, "7", Some("B"))];
    let target = vec![class(20, 2, "8", Some("B")), class(21, 2, "8", Some("A"))];

    let m = GradeAdvancementMapper::default().map(&source, &target);
    assert_eq!(m.get(Uuid::from_u128(10)), Some(&ClassTarget::Mapped(Uuid::from_u128(21))));
    assert_eq!(m.get(Uuid::from_u128(11)), Some(&ClassTarget::Mapped(Uuid::from_u128(20))));
    assert_eq!(m.mapped_count(), 2);
  }

  #[test]
  fn falls_back_to_lowest_id_at_next_grade() {
    let source = vec![class(10, 1, "7", Some("A"))];
    let target = vec![
      class(32, 2, "8", Some("C")),
      class(31, 2, "8", Some("B")),
      class(30, 2, "9", Some("A")),
    ];

    let m = GradeAdvancementMapper::default().map(&source, &target);
    assert_eq!(m.get(Uuid::from_u128(10)), Some(&ClassTarget::Mapped(Uuid::from_u128(31))));
  }

  #[test]
  fn missing_next_grade_is_unmapped() {
    let source = vec![class(10, 1, "7", Some("A"))];
    let target = vec![class(20, 2, "7", Some("A")), class(21, 2, "9", Some("A"))];

    let m = GradeAdvancementMapper::default().map(&source, &target);
    assert_eq!(
      m.get(Uuid::from_u128(10)),
      Some(&ClassTarget::Unmapped(UnmatchedReason::NoTargetClass { next_grade: 8 }))
    );
  }

  #[test]
  fn final_grade_graduates() {
    let source = vec![class(10, 1, "12", None), class(11, 1, "11", None)];
    let target = vec![class(20, 2, "12", None), class(21, 2, "13", None)];

    let m = GradeAdvancementMapper::new(Some(12)).map(&source, &target);
    assert_eq!(
      m.get(Uuid::from_u128(10)),
      Some(&ClassTarget::Unmapped(UnmatchedReason::Graduating))
    );
    assert_eq!(m.get(Uuid::from_u128(11)), Some(&ClassTarget::Mapped(Uuid::from_u128(20))));
  }

  #[test]
  fn non_numeric_grades() {
    let source = vec![class(10, 1, "K", None), class(11, 1, " 1 ", None)];
    let target = vec![class(20, 2, "one", None), class(21, 2, "2", None)];

    let m = GradeAdvancementMapper::default().map(&source, &target);
    assert!(matches!(m.get(Uuid::from_u128(10)), Some(ClassTarget::Invalid(_))));
    assert_eq!(m.get(Uuid::from_u128(11)), Some(&ClassTarget::Mapped(Uuid::from_u128(21))));
  }

  #[test]
  fn sectionless_classes_match_each_other() {
    let source = vec![class(10, 1, "3", None)];
    let target = vec![class(20, 2, "4", Some("A")), class(21, 2, "4", None)];

    let m = GradeAdvancementMapper::default().map(&source, &target);
    assert_eq!(m.get(Uuid::from_u128(10)), Some(&ClassTarget::Mapped(Uuid::from_u128(21))));
  }
}
