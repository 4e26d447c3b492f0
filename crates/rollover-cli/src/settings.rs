//! Layered configuration: optional TOML file, then `ROLLOVER_*` environment
//! variables. Command-line flags are applied on top by `main`.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use rollover_engine::EngineConfig;
use serde::Deserialize;

/// ```toml
/// database_path = "~/.local/share/rollover/school.db"
///
/// [engine]
/// batch_size           = 200
/// concurrency          = 4
/// conflict_policy      = "overwrite"
/// operation_timeout_ms = 10000
/// final_grade          = 12
/// ```
///
/// Nested keys come from the environment with a double underscore, e.g.
/// `ROLLOVER_ENGINE__BATCH_SIZE=50`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
  pub database_path: PathBuf,
  pub engine:        EngineConfig,
}

impl Default for CliConfig {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from("rollover.db"),
      engine:        EngineConfig::default(),
    }
  }
}

impl CliConfig {
  /// Read `path` if it exists, then the environment.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    Self::from_builder(Config::builder().add_source(File::from(path).required(false)))
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> Result<Self, ConfigError> {
    builder
      .add_source(
        Environment::with_prefix("ROLLOVER")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }
}

#[cfg(test)]
mod tests {
  use config::FileFormat;
  use rollover_core::enrollment::ConflictPolicy;

  use super::*;

  fn parse(toml: &str) -> CliConfig {
    CliConfig::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.database_path, PathBuf::from("rollover.db"));
    assert_eq!(cfg.engine, EngineConfig::default());
  }

  #[test]
  fn engine_table_overrides_defaults() {
    let cfg = parse(
      r#"
        database_path = "/var/lib/rollover/school.db"

        [engine]
        batch_size      = 250
        conflict_policy = "overwrite"
        final_grade     = 12
      "#,
    );
    assert_eq!(cfg.database_path, PathBuf::from("/var/lib/rollover/school.db"));
    assert_eq!(cfg.engine.batch_size, 250);
    assert_eq!(cfg.engine.conflict_policy, ConflictPolicy::Overwrite);
    assert_eq!(cfg.engine.final_grade, Some(12));
    assert_eq!(cfg.engine.concurrency, EngineConfig::default().concurrency);
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = CliConfig::load(Path::new("/nonexistent/rollover.toml")).unwrap();
    assert_eq!(cfg.engine.batch_size, EngineConfig::default().batch_size);
  }
}
