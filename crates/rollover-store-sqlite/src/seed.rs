//! Direct inserts for schools, years, classes, students and enrollments.
//!
//! School and roster management is owned by other services; these helpers
//! exist so tests and local tooling can stage data without going through the
//! promotion engine. They perform no policy checks.

use chrono::{NaiveDate, Utc};
use rollover_core::{
  class::Class,
  enrollment::{Enrollment, EnrollmentStatus},
  year::{AcademicYear, YearStatus},
};
use uuid::Uuid;

use crate::{
  encode::{encode_date, encode_dt, encode_enrollment_status, encode_uuid, encode_year_status},
  Result, SqliteStore,
};

/// Input to [`SqliteStore::add_academic_year`].
#[derive(Debug, Clone)]
pub struct NewAcademicYear {
  pub school_id:  Uuid,
  pub name:       String,
  pub start_date: NaiveDate,
  pub end_date:   NaiveDate,
  pub status:     YearStatus,
  pub is_current: bool,
}

impl SqliteStore {
  pub async fn add_school(&self, name: &str) -> Result<Uuid> {
    let school_id = Uuid::new_v4();
    let id_str    = encode_uuid(school_id);
    let name      = name.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO schools (school_id, name) VALUES (?1, ?2)",
          rusqlite::params![id_str, name],
        )?;
        Ok(())
      })
      .await?;
    Ok(school_id)
  }

  pub async fn add_academic_year(&self, input: NewAcademicYear) -> Result<AcademicYear> {
    let year = AcademicYear {
      academic_year_id:      Uuid::new_v4(),
      school_id:             input.school_id,
      name:                  input.name,
      start_date:            input.start_date,
      end_date:              input.end_date,
      status:                input.status,
      is_current:            input.is_current,
      is_promotion_done:     false,
      promotion_date:        None,
      promotion_in_progress: false,
    };

    let id_str     = encode_uuid(year.academic_year_id);
    let school_str = encode_uuid(year.school_id);
    let name       = year.name.clone();
    let start_str  = encode_date(year.start_date);
    let end_str    = encode_date(year.end_date);
    let status_str = encode_year_status(year.status);
    let is_current = year.is_current;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO academic_years (
             academic_year_id, school_id, name, start_date, end_date, status, is_current
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, school_str, name, start_str, end_str, status_str, is_current],
        )?;
        Ok(())
      })
      .await?;
    Ok(year)
  }

  pub async fn add_class(
    &self,
    academic_year: &AcademicYear,
    name:          &str,
    grade:         &str,
    section:       Option<&str>,
  ) -> Result<Class> {
    let class = Class {
      class_id:         Uuid::new_v4(),
      school_id:        academic_year.school_id,
      academic_year_id: academic_year.academic_year_id,
      name:             name.to_owned(),
      grade:            grade.to_owned(),
      section:          section.map(str::to_owned),
    };

    let id_str     = encode_uuid(class.class_id);
    let school_str = encode_uuid(class.school_id);
    let year_str   = encode_uuid(class.academic_year_id);
    let name       = class.name.clone();
    let grade      = class.grade.clone();
    let section    = class.section.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO classes (class_id, school_id, academic_year_id, name, grade, section)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, school_str, year_str, name, grade, section],
        )?;
        Ok(())
      })
      .await?;
    Ok(class)
  }

  pub async fn add_student(&self, school_id: Uuid, first_name: &str, last_name: &str) -> Result<Uuid> {
    let student_id = Uuid::new_v4();
    let id_str     = encode_uuid(student_id);
    let school_str = encode_uuid(school_id);
    let first      = first_name.to_owned();
    let last       = last_name.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, school_id, first_name, last_name)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, school_str, first, last],
        )?;
        Ok(())
      })
      .await?;
    Ok(student_id)
  }

  /// Insert an enrollment row as-is, bypassing the conflict checks of
  /// [`rollover_core::store::RolloverStore::upsert_enrollment`].
  pub async fn add_enrollment(
    &self,
    student_id: Uuid,
    class:      &Class,
    status:     EnrollmentStatus,
  ) -> Result<Enrollment> {
    let enrollment = Enrollment {
      student_id,
      class_id: class.class_id,
      academic_year_id: class.academic_year_id,
      status,
      enrolled_at: Utc::now(),
    };

    let student_str = encode_uuid(enrollment.student_id);
    let class_str   = encode_uuid(enrollment.class_id);
    let year_str    = encode_uuid(enrollment.academic_year_id);
    let status_str  = encode_enrollment_status(status);
    let at_str      = encode_dt(enrollment.enrolled_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO student_classes (student_id, class_id, academic_year_id, status, enrolled_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![student_str, class_str, year_str, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(enrollment)
  }
}
