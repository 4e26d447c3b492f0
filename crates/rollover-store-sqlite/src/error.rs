//! Error type for `rollover-store-sqlite`.

use rollover_core::store::{Severity, StoreError};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] rollover_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside the set the domain type accepts.
  #[error("unrecognised {column} value: {value:?}")]
  Decode { column: &'static str, value: String },
}

impl StoreError for Error {
  fn severity(&self) -> Severity {
    match self {
      Error::Database(e) => database_severity(e),
      Error::Core(_) | Error::Uuid(_) | Error::DateParse(_) | Error::Decode { .. } => {
        Severity::Record
      }
    }
  }
}

/// Constraint violations, lock contention and bad row data only affect the
/// statement that hit them. Anything else means the connection is unusable.
fn database_severity(e: &tokio_rusqlite::Error) -> Severity {
  let tokio_rusqlite::Error::Rusqlite(inner) = e else {
    return Severity::Fatal;
  };
  match inner {
    rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
      ErrorCode::ConstraintViolation
      | ErrorCode::DatabaseBusy
      | ErrorCode::DatabaseLocked
      | ErrorCode::TooBig
      | ErrorCode::TypeMismatch => Severity::Record,
      _ => Severity::Fatal,
    },
    rusqlite::Error::QueryReturnedNoRows
    | rusqlite::Error::FromSqlConversionFailure(..)
    | rusqlite::Error::InvalidColumnType(..)
    | rusqlite::Error::IntegralValueOutOfRange(..) => Severity::Record,
    _ => Severity::Fatal,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
