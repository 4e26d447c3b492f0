//! Classes: grade + section groupings inside one academic year.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
  pub class_id:         Uuid,
  pub school_id:        Uuid,
  pub academic_year_id: Uuid,
  /// Display label, e.g. "7A".
  pub name:             String,
  /// Grade ordinal as stored; expected to hold a whole number.
  pub grade:            String,
  pub section:          Option<String>,
}

impl Class {
  /// The numeric grade level of this class.
  pub fn grade_level(&self) -> Result<u32> { parse_grade(&self.grade) }
}

/// Parse a stored grade string (surrounding whitespace is ignored).
pub fn parse_grade(raw: &str) -> Result<u32> {
  raw
    .trim()
    .parse::<u32>()
    .map_err(|_| Error::NonNumericGrade(raw.to_owned()))
}
