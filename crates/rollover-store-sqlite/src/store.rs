//! [`SqliteStore`]: the SQLite implementation of [`RolloverStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use rollover_core::{
  class::Class,
  enrollment::{
    ActiveEnrollment, ConflictPolicy, DuplicateEnrollment, NewEnrollment,
    UpsertOutcome,
  },
  progression::{NewProgressionRecord, ProgressionRecord},
  store::RolloverStore,
  year::{AcademicYear, YearSelector},
};

use crate::{
  encode::{
    decode_uuid, encode_dt, encode_promotion_type, encode_uuid,
    RawAcademicYear, RawActiveEnrollment, RawClass, RawEnrollment,
    RawProgressionRecord, ACADEMIC_YEAR_COLUMNS,
  },
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rollover store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All
/// statements run on the connection's dedicated thread, so writes are
/// serialised even when the engine issues them concurrently.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// Outcome of the enrollment transaction before ids are decoded.
enum RawUpsert {
  Created,
  AlreadyExists,
  Replaced(String),
  Retained(String),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-value `COUNT` query bound to one academic year.
  async fn count_for_year(&self, sql: &'static str, academic_year_id: Uuid) -> Result<u64> {
    let year_str = encode_uuid(academic_year_id);
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(sql, rusqlite::params![year_str], |r| r.get(0))?))
      .await?;
    Ok(count.max(0) as u64)
  }
}

// ─── RolloverStore impl ──────────────────────────────────────────────────────

impl RolloverStore for SqliteStore {
  type Error = crate::Error;

  // ── Schools and academic years ──────────────────────────────────────────

  async fn school_exists(&self, school_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(school_id);
    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM schools WHERE school_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(found)
  }

  async fn find_academic_year(
    &self,
    school_id: Uuid,
    selector:  YearSelector,
  ) -> Result<Option<AcademicYear>> {
    let school_str = encode_uuid(school_id);

    let (sql, other) = match selector {
      YearSelector::Id(id) => (
        format!(
          "SELECT {ACADEMIC_YEAR_COLUMNS} FROM academic_years
           WHERE school_id = ?1 AND academic_year_id = ?2"
        ),
        Some(encode_uuid(id)),
      ),
      YearSelector::Current => (
        format!(
          "SELECT {ACADEMIC_YEAR_COLUMNS} FROM academic_years
           WHERE school_id = ?1 AND is_current = 1"
        ),
        None,
      ),
      YearSelector::Following(id) => (
        format!(
          "SELECT {ACADEMIC_YEAR_COLUMNS} FROM academic_years
           WHERE school_id = ?1
             AND start_date > (
               SELECT start_date FROM academic_years
               WHERE academic_year_id = ?2 AND school_id = ?1
             )
           ORDER BY start_date, academic_year_id
           LIMIT 1"
        ),
        Some(encode_uuid(id)),
      ),
    };

    let raw: Option<RawAcademicYear> = self
      .conn
      .call(move |conn| {
        let row = match other {
          Some(o) => conn
            .query_row(&sql, rusqlite::params![school_str, o], RawAcademicYear::from_row)
            .optional()?,
          None => conn
            .query_row(&sql, rusqlite::params![school_str], RawAcademicYear::from_row)
            .optional()?,
        };
        Ok(row)
      })
      .await?;

    raw.map(RawAcademicYear::into_academic_year).transpose()
  }

  async fn get_academic_year(&self, academic_year_id: Uuid) -> Result<Option<AcademicYear>> {
    let id_str = encode_uuid(academic_year_id);
    let raw: Option<RawAcademicYear> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ACADEMIC_YEAR_COLUMNS} FROM academic_years WHERE academic_year_id = ?1"
              ),
              rusqlite::params![id_str],
              RawAcademicYear::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAcademicYear::into_academic_year).transpose()
  }

  async fn set_promotion_done(&self, academic_year_id: Uuid, done: bool) -> Result<()> {
    let id_str = encode_uuid(academic_year_id);
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        if done {
          conn.execute(
            "UPDATE academic_years
             SET is_promotion_done = 1, promotion_date = ?2
             WHERE academic_year_id = ?1",
            rusqlite::params![id_str, at_str],
          )?;
        } else {
          conn.execute(
            "UPDATE academic_years SET is_promotion_done = 0 WHERE academic_year_id = ?1",
            rusqlite::params![id_str],
          )?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn try_acquire_promotion_lock(&self, academic_year_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(academic_year_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE academic_years SET promotion_in_progress = 1
           WHERE academic_year_id = ?1 AND promotion_in_progress = 0",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }

  async fn release_promotion_lock(&self, academic_year_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(academic_year_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE academic_years SET promotion_in_progress = 0 WHERE academic_year_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Classes and enrollments ─────────────────────────────────────────────

  async fn list_classes(&self, academic_year_id: Uuid) -> Result<Vec<Class>> {
    let year_str = encode_uuid(academic_year_id);

    let raws: Vec<RawClass> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT class_id, school_id, academic_year_id, name, grade, section
           FROM classes WHERE academic_year_id = ?1
           ORDER BY class_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![year_str], |row| {
            Ok(RawClass {
              class_id:         row.get(0)?,
              school_id:        row.get(1)?,
              academic_year_id: row.get(2)?,
              name:             row.get(3)?,
              grade:            row.get(4)?,
              section:          row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClass::into_class).collect()
  }

  async fn list_active_enrollments(
    &self,
    academic_year_id: Uuid,
  ) -> Result<Vec<ActiveEnrollment>> {
    let year_str = encode_uuid(academic_year_id);

    let raws: Vec<RawActiveEnrollment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT sc.student_id, sc.class_id, sc.academic_year_id, sc.enrolled_at,
                  c.grade, c.section
           FROM student_classes sc
           JOIN classes c ON c.class_id = sc.class_id
           WHERE sc.academic_year_id = ?1 AND sc.status = 'ACTIVE'
           ORDER BY sc.student_id, sc.class_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![year_str], |row| {
            Ok(RawActiveEnrollment {
              student_id:       row.get(0)?,
              class_id:         row.get(1)?,
              academic_year_id: row.get(2)?,
              enrolled_at:      row.get(3)?,
              grade:            row.get(4)?,
              section:          row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawActiveEnrollment::into_active_enrollment)
      .collect()
  }

  async fn upsert_enrollment(
    &self,
    enrollment: NewEnrollment,
    policy:     ConflictPolicy,
  ) -> Result<UpsertOutcome> {
    let student_str = encode_uuid(enrollment.student_id);
    let class_str   = encode_uuid(enrollment.class_id);
    let year_str    = encode_uuid(enrollment.academic_year_id);
    let at_str      = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM student_classes
             WHERE student_id = ?1 AND class_id = ?2 AND academic_year_id = ?3",
            rusqlite::params![student_str, class_str, year_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if exists {
          return Ok(RawUpsert::AlreadyExists);
        }

        let held_elsewhere: Option<String> = tx
          .query_row(
            "SELECT class_id FROM student_classes
             WHERE student_id = ?1 AND academic_year_id = ?2 AND status = 'ACTIVE'
             ORDER BY enrolled_at, class_id
             LIMIT 1",
            rusqlite::params![student_str, year_str],
            |r| r.get(0),
          )
          .optional()?;

        if let Some(previous) = &held_elsewhere {
          if policy == ConflictPolicy::Skip {
            return Ok(RawUpsert::Retained(previous.clone()));
          }
          tx.execute(
            "UPDATE student_classes SET status = 'INACTIVE'
             WHERE student_id = ?1 AND academic_year_id = ?2 AND status = 'ACTIVE'",
            rusqlite::params![student_str, year_str],
          )?;
        }

        tx.execute(
          "INSERT INTO student_classes (student_id, class_id, academic_year_id, status, enrolled_at)
           VALUES (?1, ?2, ?3, 'ACTIVE', ?4)",
          rusqlite::params![student_str, class_str, year_str, at_str],
        )?;
        tx.commit()?;

        Ok(match held_elsewhere {
          Some(previous) => RawUpsert::Replaced(previous),
          None => RawUpsert::Created,
        })
      })
      .await?;

    Ok(match raw {
      RawUpsert::Created => UpsertOutcome::Created,
      RawUpsert::AlreadyExists => UpsertOutcome::AlreadyExists,
      RawUpsert::Replaced(c) => UpsertOutcome::Replaced { previous_class_id: decode_uuid(&c)? },
      RawUpsert::Retained(c) => UpsertOutcome::Retained { class_id: decode_uuid(&c)? },
    })
  }

  async fn deactivate_enrollment(
    &self,
    student_id:       Uuid,
    class_id:         Uuid,
    academic_year_id: Uuid,
  ) -> Result<bool> {
    let student_str = encode_uuid(student_id);
    let class_str   = encode_uuid(class_id);
    let year_str    = encode_uuid(academic_year_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE student_classes SET status = 'INACTIVE'
           WHERE student_id = ?1 AND class_id = ?2 AND academic_year_id = ?3",
          rusqlite::params![student_str, class_str, year_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn count_active_enrollments(&self, academic_year_id: Uuid) -> Result<u64> {
    self
      .count_for_year(
        "SELECT COUNT(*) FROM student_classes
         WHERE academic_year_id = ?1 AND status = 'ACTIVE'",
        academic_year_id,
      )
      .await
  }

  async fn count_distinct_students(&self, academic_year_id: Uuid) -> Result<u64> {
    self
      .count_for_year(
        "SELECT COUNT(DISTINCT student_id) FROM student_classes
         WHERE academic_year_id = ?1 AND status = 'ACTIVE'",
        academic_year_id,
      )
      .await
  }

  async fn list_duplicate_active_enrollments(
    &self,
    academic_year_id: Uuid,
  ) -> Result<Vec<DuplicateEnrollment>> {
    let year_str = encode_uuid(academic_year_id);

    let raws: Vec<RawEnrollment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT student_id, class_id, academic_year_id, status, enrolled_at
           FROM student_classes
           WHERE academic_year_id = ?1 AND status = 'ACTIVE'
             AND student_id IN (
               SELECT student_id FROM student_classes
               WHERE academic_year_id = ?1 AND status = 'ACTIVE'
               GROUP BY student_id
               HAVING COUNT(*) > 1
             )
           ORDER BY student_id, enrolled_at, class_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![year_str], |row| {
            Ok(RawEnrollment {
              student_id:       row.get(0)?,
              class_id:         row.get(1)?,
              academic_year_id: row.get(2)?,
              status:           row.get(3)?,
              enrolled_at:      row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Rows arrive grouped by student.
    let mut groups: Vec<DuplicateEnrollment> = Vec::new();
    for raw in raws {
      let enrollment = raw.into_enrollment()?;
      match groups.last_mut() {
        Some(group) if group.student_id == enrollment.student_id => {
          group.enrollments.push(enrollment);
        }
        _ => groups.push(DuplicateEnrollment {
          student_id:  enrollment.student_id,
          enrollments: vec![enrollment],
        }),
      }
    }
    Ok(groups)
  }

  // ── Progression records ─────────────────────────────────────────────────

  async fn append_progression_record(&self, record: NewProgressionRecord) -> Result<bool> {
    let record_id_str = encode_uuid(Uuid::new_v4());
    let student_str   = encode_uuid(record.student_id);
    let from_year_str = encode_uuid(record.from_academic_year_id);
    let to_year_str   = encode_uuid(record.to_academic_year_id);
    let from_cls_str  = encode_uuid(record.from_class_id);
    let to_cls_str    = encode_uuid(record.to_class_id);
    let type_str      = encode_promotion_type(record.promotion_type);
    let at_str        = encode_dt(Utc::now());
    let promoted_by   = record.promoted_by;
    let notes         = record.notes;

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO progression_records (
             record_id, student_id, from_academic_year_id, to_academic_year_id,
             from_class_id, to_class_id, promotion_type, promoted_by, notes, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT (student_id, from_class_id, to_class_id) DO NOTHING",
          rusqlite::params![
            record_id_str,
            student_str,
            from_year_str,
            to_year_str,
            from_cls_str,
            to_cls_str,
            type_str,
            promoted_by,
            notes,
            at_str,
          ],
        )?)
      })
      .await?;
    Ok(inserted == 1)
  }

  async fn list_progression_records(
    &self,
    from_academic_year_id: Uuid,
    to_academic_year_id:   Uuid,
  ) -> Result<Vec<ProgressionRecord>> {
    let from_str = encode_uuid(from_academic_year_id);
    let to_str   = encode_uuid(to_academic_year_id);

    let raws: Vec<RawProgressionRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT record_id, student_id, from_academic_year_id, to_academic_year_id,
                  from_class_id, to_class_id, promotion_type, promoted_by, notes, created_at
           FROM progression_records
           WHERE from_academic_year_id = ?1 AND to_academic_year_id = ?2
           ORDER BY created_at, student_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![from_str, to_str], |row| {
            Ok(RawProgressionRecord {
              record_id:             row.get(0)?,
              student_id:            row.get(1)?,
              from_academic_year_id: row.get(2)?,
              to_academic_year_id:   row.get(3)?,
              from_class_id:         row.get(4)?,
              to_class_id:           row.get(5)?,
              promotion_type:        row.get(6)?,
              promoted_by:           row.get(7)?,
              notes:                 row.get(8)?,
              created_at:            row.get(9)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProgressionRecord::into_record).collect()
  }
}
