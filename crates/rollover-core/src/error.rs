//! Error types for `rollover-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("grade {0:?} is not a whole number")]
  NonNumericGrade(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
