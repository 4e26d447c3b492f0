//! Resolution of the source and target academic years of a run.

use std::{fmt, str::FromStr, time::Duration};

use rollover_core::{
  store::RolloverStore,
  year::{AcademicYear, YearSelector},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, timed};

/// Caller-side reference to an academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearRef {
  Id(Uuid),
  /// The school's current year.
  Current,
  /// For a source: the year after the current one. For a target: the year
  /// after the resolved source.
  Next,
}

impl FromStr for YearRef {
  type Err = Error;

  /// Accepts `current`, `next` or a UUID.
  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "current" => Ok(Self::Current),
      "next" => Ok(Self::Next),
      other => Uuid::parse_str(other)
        .map(Self::Id)
        .map_err(|_| Error::Validation(format!("not a year reference: {s:?}"))),
    }
  }
}

impl fmt::Display for YearRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "{id}"),
      Self::Current => f.write_str("current"),
      Self::Next => f.write_str("next"),
    }
  }
}

/// The two years a promotion moves between.
#[derive(Debug, Clone)]
pub struct ResolvedYears {
  pub source: AcademicYear,
  pub target: AcademicYear,
}

impl ResolvedYears {
  pub fn pair(&self) -> YearPair {
    YearPair {
      source: self.source.academic_year_id,
      target: self.target.academic_year_id,
    }
  }
}

/// Ids of the source and target years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearPair {
  pub source: Uuid,
  pub target: Uuid,
}

/// Looks up the academic years of a school. Never writes.
pub struct AcademicYearResolver<'a, S> {
  store:   &'a S,
  timeout: Duration,
}

impl<'a, S: RolloverStore> AcademicYearResolver<'a, S> {
  pub fn new(store: &'a S, timeout: Duration) -> Self { Self { store, timeout } }

  pub async fn resolve(
    &self,
    school_id: Uuid,
    source:    YearRef,
    target:    YearRef,
  ) -> Result<ResolvedYears> {
    if !timed(self.timeout, self.store.school_exists(school_id)).await? {
      return Err(Error::SchoolNotFound(school_id));
    }

    let source_year = self.lookup(school_id, source, None).await?;
    let target_year = self.lookup(school_id, target, Some(&source_year)).await?;

    if source_year.academic_year_id == target_year.academic_year_id {
      return Err(Error::Validation(format!(
        "source and target are the same academic year ({})",
        source_year.name
      )));
    }
    if target_year.start_date <= source_year.start_date {
      tracing::warn!(
        source = %source_year.name,
        target = %target_year.name,
        "target academic year does not start after the source year",
      );
    }

    Ok(ResolvedYears { source: source_year, target: target_year })
  }

  /// `Next` is relative to `after` when given, otherwise to the current year.
  async fn lookup(
    &self,
    school_id: Uuid,
    r:         YearRef,
    after:     Option<&AcademicYear>,
  ) -> Result<AcademicYear> {
    match r {
      YearRef::Id(id) => {
        self.find(school_id, YearSelector::Id(id), &format!("year {id}")).await
      }
      YearRef::Current => self.find(school_id, YearSelector::Current, "current year").await,
      YearRef::Next => {
        let base = match after {
          Some(year) => year.academic_year_id,
          None => {
            self
              .find(school_id, YearSelector::Current, "current year")
              .await?
              .academic_year_id
          }
        };
        self
          .find(school_id, YearSelector::Following(base), &format!("year following {base}"))
          .await
      }
    }
  }

  async fn find(
    &self,
    school_id:   Uuid,
    selector:    YearSelector,
    description: &str,
  ) -> Result<AcademicYear> {
    timed(self.timeout, self.store.find_academic_year(school_id, selector))
      .await?
      .ok_or_else(|| {
        Error::AcademicYearNotFound(format!("{description} (school {school_id})"))
      })
  }
}
