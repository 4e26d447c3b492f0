//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are ISO 8601 `YYYY-MM-DD`
//! and UUIDs are hyphenated lowercase strings, so text ordering matches
//! value ordering for all three.

use chrono::{DateTime, NaiveDate, Utc};
use rollover_core::{
  class::Class,
  enrollment::{ActiveEnrollment, Enrollment, EnrollmentStatus},
  progression::{ProgressionRecord, PromotionType},
  year::{AcademicYear, YearStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_year_status(s: YearStatus) -> &'static str {
  match s {
    YearStatus::Planning => "PLANNING",
    YearStatus::Active => "ACTIVE",
    YearStatus::Ended => "ENDED",
    YearStatus::Archived => "ARCHIVED",
  }
}

pub fn decode_year_status(s: &str) -> Result<YearStatus> {
  match s {
    "PLANNING" => Ok(YearStatus::Planning),
    "ACTIVE" => Ok(YearStatus::Active),
    "ENDED" => Ok(YearStatus::Ended),
    "ARCHIVED" => Ok(YearStatus::Archived),
    other => Err(Error::Decode { column: "academic_years.status", value: other.to_owned() }),
  }
}

pub fn encode_enrollment_status(s: EnrollmentStatus) -> &'static str {
  match s {
    EnrollmentStatus::Active => "ACTIVE",
    EnrollmentStatus::Inactive => "INACTIVE",
    EnrollmentStatus::Transferred => "TRANSFERRED",
    EnrollmentStatus::Graduated => "GRADUATED",
  }
}

pub fn decode_enrollment_status(s: &str) -> Result<EnrollmentStatus> {
  match s {
    "ACTIVE" => Ok(EnrollmentStatus::Active),
    "INACTIVE" => Ok(EnrollmentStatus::Inactive),
    "TRANSFERRED" => Ok(EnrollmentStatus::Transferred),
    "GRADUATED" => Ok(EnrollmentStatus::Graduated),
    other => Err(Error::Decode { column: "student_classes.status", value: other.to_owned() }),
  }
}

pub fn encode_promotion_type(t: PromotionType) -> &'static str {
  match t {
    PromotionType::Automatic => "AUTOMATIC",
    PromotionType::Manual => "MANUAL",
    PromotionType::Repeat => "REPEAT",
  }
}

pub fn decode_promotion_type(s: &str) -> Result<PromotionType> {
  match s {
    "AUTOMATIC" => Ok(PromotionType::Automatic),
    "MANUAL" => Ok(PromotionType::Manual),
    "REPEAT" => Ok(PromotionType::Repeat),
    other => Err(Error::Decode {
      column: "progression_records.promotion_type",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `academic_years` row.
pub struct RawAcademicYear {
  pub academic_year_id:      String,
  pub school_id:             String,
  pub name:                  String,
  pub start_date:            String,
  pub end_date:              String,
  pub status:                String,
  pub is_current:            bool,
  pub is_promotion_done:     bool,
  pub promotion_date:        Option<String>,
  pub promotion_in_progress: bool,
}

/// Column list matching [`RawAcademicYear::from_row`].
pub const ACADEMIC_YEAR_COLUMNS: &str = "academic_year_id, school_id, name, \
  start_date, end_date, status, is_current, is_promotion_done, promotion_date, \
  promotion_in_progress";

impl RawAcademicYear {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      academic_year_id:      row.get(0)?,
      school_id:             row.get(1)?,
      name:                  row.get(2)?,
      start_date:            row.get(3)?,
      end_date:              row.get(4)?,
      status:                row.get(5)?,
      is_current:            row.get(6)?,
      is_promotion_done:     row.get(7)?,
      promotion_date:        row.get(8)?,
      promotion_in_progress: row.get(9)?,
    })
  }

  pub fn into_academic_year(self) -> Result<AcademicYear> {
    Ok(AcademicYear {
      academic_year_id:      decode_uuid(&self.academic_year_id)?,
      school_id:             decode_uuid(&self.school_id)?,
      name:                  self.name,
      start_date:            decode_date(&self.start_date)?,
      end_date:              decode_date(&self.end_date)?,
      status:                decode_year_status(&self.status)?,
      is_current:            self.is_current,
      is_promotion_done:     self.is_promotion_done,
      promotion_date:        self.promotion_date.as_deref().map(decode_dt).transpose()?,
      promotion_in_progress: self.promotion_in_progress,
    })
  }
}

/// Raw values read directly from a `classes` row.
pub struct RawClass {
  pub class_id:         String,
  pub school_id:        String,
  pub academic_year_id: String,
  pub name:             String,
  pub grade:            String,
  pub section:          Option<String>,
}

impl RawClass {
  pub fn into_class(self) -> Result<Class> {
    Ok(Class {
      class_id:         decode_uuid(&self.class_id)?,
      school_id:        decode_uuid(&self.school_id)?,
      academic_year_id: decode_uuid(&self.academic_year_id)?,
      name:             self.name,
      grade:            self.grade,
      section:          self.section,
    })
  }
}

/// Raw values from a `student_classes` row.
pub struct RawEnrollment {
  pub student_id:       String,
  pub class_id:         String,
  pub academic_year_id: String,
  pub status:           String,
  pub enrolled_at:      String,
}

impl RawEnrollment {
  pub fn into_enrollment(self) -> Result<Enrollment> {
    Ok(Enrollment {
      student_id:       decode_uuid(&self.student_id)?,
      class_id:         decode_uuid(&self.class_id)?,
      academic_year_id: decode_uuid(&self.academic_year_id)?,
      status:           decode_enrollment_status(&self.status)?,
      enrolled_at:      decode_dt(&self.enrolled_at)?,
    })
  }
}

/// Raw values from a `student_classes` row joined with its class.
pub struct RawActiveEnrollment {
  pub student_id:       String,
  pub class_id:         String,
  pub academic_year_id: String,
  pub enrolled_at:      String,
  pub grade:            String,
  pub section:          Option<String>,
}

impl RawActiveEnrollment {
  pub fn into_active_enrollment(self) -> Result<ActiveEnrollment> {
    Ok(ActiveEnrollment {
      student_id:       decode_uuid(&self.student_id)?,
      class_id:         decode_uuid(&self.class_id)?,
      academic_year_id: decode_uuid(&self.academic_year_id)?,
      enrolled_at:      decode_dt(&self.enrolled_at)?,
      grade:            self.grade,
      section:          self.section,
    })
  }
}

/// Raw values from a `progression_records` row.
pub struct RawProgressionRecord {
  pub record_id:             String,
  pub student_id:            String,
  pub from_academic_year_id: String,
  pub to_academic_year_id:   String,
  pub from_class_id:         String,
  pub to_class_id:           String,
  pub promotion_type:        String,
  pub promoted_by:           Option<String>,
  pub notes:                 Option<String>,
  pub created_at:            String,
}

impl RawProgressionRecord {
  pub fn into_record(self) -> Result<ProgressionRecord> {
    Ok(ProgressionRecord {
      record_id:             decode_uuid(&self.record_id)?,
      student_id:            decode_uuid(&self.student_id)?,
      from_academic_year_id: decode_uuid(&self.from_academic_year_id)?,
      to_academic_year_id:   decode_uuid(&self.to_academic_year_id)?,
      from_class_id:         decode_uuid(&self.from_class_id)?,
      to_class_id:           decode_uuid(&self.to_class_id)?,
      promotion_type:        decode_promotion_type(&self.promotion_type)?,
      promoted_by:           self.promoted_by,
      notes:                 self.notes,
      created_at:            decode_dt(&self.created_at)?,
    })
  }
}
