//! SQL schema for the Rollover SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schools (
    school_id  TEXT PRIMARY KEY,
    name       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS academic_years (
    academic_year_id      TEXT PRIMARY KEY,
    school_id             TEXT NOT NULL REFERENCES schools(school_id),
    name                  TEXT NOT NULL,
    start_date            TEXT NOT NULL,   -- ISO 8601 date
    end_date              TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'PLANNING',
    is_current            INTEGER NOT NULL DEFAULT 0,
    is_promotion_done     INTEGER NOT NULL DEFAULT 0,
    promotion_date        TEXT,            -- RFC 3339 UTC or NULL
    promotion_in_progress INTEGER NOT NULL DEFAULT 0
);

-- One current year per school.
CREATE UNIQUE INDEX IF NOT EXISTS academic_years_current_idx
    ON academic_years(school_id) WHERE is_current = 1;

CREATE TABLE IF NOT EXISTS classes (
    class_id         TEXT PRIMARY KEY,
    school_id        TEXT NOT NULL REFERENCES schools(school_id),
    academic_year_id TEXT NOT NULL REFERENCES academic_years(academic_year_id),
    name             TEXT NOT NULL,
    grade            TEXT NOT NULL,
    section          TEXT,
    UNIQUE (class_id, academic_year_id)
);

CREATE TABLE IF NOT EXISTS students (
    student_id TEXT PRIMARY KEY,
    school_id  TEXT NOT NULL REFERENCES schools(school_id),
    first_name TEXT NOT NULL,
    last_name  TEXT NOT NULL
);

-- Enrollments. The composite foreign key rejects a class that belongs to a
-- different academic year than the row claims.
CREATE TABLE IF NOT EXISTS student_classes (
    student_id       TEXT NOT NULL REFERENCES students(student_id),
    class_id         TEXT NOT NULL,
    academic_year_id TEXT NOT NULL,
    status           TEXT NOT NULL DEFAULT 'ACTIVE',
    enrolled_at      TEXT NOT NULL,
    PRIMARY KEY (student_id, class_id, academic_year_id),
    FOREIGN KEY (class_id, academic_year_id)
        REFERENCES classes(class_id, academic_year_id)
);

-- Append-only audit trail; no UPDATE or DELETE is ever issued against it.
CREATE TABLE IF NOT EXISTS progression_records (
    record_id             TEXT PRIMARY KEY,
    student_id            TEXT NOT NULL REFERENCES students(student_id),
    from_academic_year_id TEXT NOT NULL REFERENCES academic_years(academic_year_id),
    to_academic_year_id   TEXT NOT NULL REFERENCES academic_years(academic_year_id),
    from_class_id         TEXT NOT NULL REFERENCES classes(class_id),
    to_class_id           TEXT NOT NULL REFERENCES classes(class_id),
    promotion_type        TEXT NOT NULL,   -- 'AUTOMATIC' | 'MANUAL' | 'REPEAT'
    promoted_by           TEXT,
    notes                 TEXT,
    created_at            TEXT NOT NULL,
    UNIQUE (student_id, from_class_id, to_class_id)
);

CREATE INDEX IF NOT EXISTS classes_year_idx          ON classes(academic_year_id);
CREATE INDEX IF NOT EXISTS student_classes_year_idx  ON student_classes(academic_year_id, status);
CREATE INDEX IF NOT EXISTS progression_years_idx
    ON progression_records(from_academic_year_id, to_academic_year_id);

PRAGMA user_version = 1;
";
