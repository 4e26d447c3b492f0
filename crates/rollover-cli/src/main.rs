//! `rollover`: promote a school's students into the next academic year.
//!
//! Reads `rollover.toml` (or the path given with `--config`) and
//! `ROLLOVER_*` environment variables, opens the SQLite store and runs one
//! engine operation.
//!
//! ```
//! rollover init
//! rollover promote --school <uuid> --dry-run
//! rollover promote --school <uuid> --from <uuid> --to next --verify
//! rollover verify --from <uuid> --to <uuid> --json
//! rollover merge --year <uuid>
//! ```

mod output;
mod settings;

use std::{
  future::Future,
  path::{Path, PathBuf},
  process::ExitCode,
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rollover_core::enrollment::ConflictPolicy;
use rollover_engine::{
  CancelToken, PromoteRequest, PromotionEngine, PromotionOverride, YearRef,
};
use rollover_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::settings::CliConfig;

/// Exit status for a run that completed but left the target year
/// inconsistent.
const EXIT_INCONSISTENT: u8 = 2;

/// Exit status when a second interrupt abandons the run mid-batch.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(author, version, about = "Promote students into the next academic year")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rollover.toml")]
  config: PathBuf,

  /// SQLite database; overrides `database_path` from the configuration.
  #[arg(long, global = true)]
  database: Option<PathBuf>,

  /// Print reports as JSON.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the database schema.
  Init,
  /// Promote ACTIVE enrollments from one academic year into the next.
  Promote(PromoteArgs),
  /// Check that no student is ACTIVE in two classes of the target year.
  Verify {
    #[arg(long)]
    from: Uuid,
    #[arg(long)]
    to:   Uuid,
  },
  /// Keep one ACTIVE enrollment per student in a year.
  Merge {
    #[arg(long)]
    year:    Uuid,
    #[arg(long)]
    dry_run: bool,
  },
  /// Release a promotion lock left behind by an interrupted run.
  Unlock {
    #[arg(long)]
    year: Uuid,
  },
}

#[derive(Args)]
struct PromoteArgs {
  #[arg(long)]
  school: Uuid,

  /// Source year: an id or `current`.
  #[arg(long, default_value = "current")]
  from: YearRef,

  /// Target year: an id or `next`.
  #[arg(long, default_value = "next")]
  to: YearRef,

  #[arg(long)]
  batch_size: Option<usize>,

  #[arg(long)]
  concurrency: Option<usize>,

  /// What to do when a student already holds another class in the target
  /// year.
  #[arg(long, value_enum)]
  policy: Option<Policy>,

  /// Plan only; write nothing.
  #[arg(long)]
  dry_run: bool,

  /// Run even if the source year is already marked promoted.
  #[arg(long)]
  force: bool,

  /// JSON array of `{ "student_id", "to_class_id", "kind", "notes" }`;
  /// `to_class_id` may be left out of a `REPEAT`.
  #[arg(long, value_name = "FILE")]
  overrides: Option<PathBuf>,

  /// Recorded on each progression record.
  #[arg(long)]
  promoted_by: Option<String>,

  /// Run a consistency check after the promotion.
  #[arg(long)]
  verify: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
  Skip,
  Overwrite,
}

impl From<Policy> for ConflictPolicy {
  fn from(p: Policy) -> Self {
    match p {
      Policy::Skip => ConflictPolicy::Skip,
      Policy::Overwrite => ConflictPolicy::Overwrite,
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  // Logs go to stderr so `--json` output stays parseable.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = CliConfig::load(&cli.config)
    .with_context(|| format!("failed to read config {}", cli.config.display()))?;
  if let Some(path) = cli.database {
    cfg.database_path = path;
  }

  let db_path = expand_tilde(&cfg.database_path);
  let store = SqliteStore::open(&db_path)
    .await
    .with_context(|| format!("failed to open store at {db_path:?}"))?;

  if let Command::Promote(args) = &cli.command {
    if let Some(n) = args.batch_size {
      cfg.engine.batch_size = n;
    }
    if let Some(n) = args.concurrency {
      cfg.engine.concurrency = n;
    }
    if let Some(p) = args.policy {
      cfg.engine.conflict_policy = p.into();
    }
  }

  let engine =
    PromotionEngine::new(Arc::new(store), cfg.engine).context("invalid engine configuration")?;

  match cli.command {
    Command::Init => {
      tracing::info!(path = %db_path.display(), "database ready");
      Ok(ExitCode::SUCCESS)
    }
    Command::Promote(args) => promote(&engine, args, cli.json).await,
    Command::Verify { from, to } => {
      let report = engine.verify(from, to).await.context("verification failed")?;
      output::consistency(&report, cli.json)?;
      Ok(if report.is_consistent { ExitCode::SUCCESS } else { ExitCode::from(EXIT_INCONSISTENT) })
    }
    Command::Merge { year, dry_run } => {
      let report = engine.merge_duplicates(year, dry_run).await.context("merge failed")?;
      output::merge(&report, cli.json)?;
      Ok(ExitCode::SUCCESS)
    }
    Command::Unlock { year } => {
      engine.release_lock(year).await.context("failed to release lock")?;
      tracing::info!(%year, "promotion lock released");
      Ok(ExitCode::SUCCESS)
    }
  }
}

async fn promote(
  engine: &PromotionEngine<SqliteStore>,
  args:   PromoteArgs,
  json:   bool,
) -> anyhow::Result<ExitCode> {
  let overrides = match &args.overrides {
    Some(path) => read_overrides(path)?,
    None => Vec::new(),
  };

  let request = PromoteRequest {
    dry_run: args.dry_run,
    skip_if_done: !args.force,
    overrides,
    promoted_by: args.promoted_by,
    ..PromoteRequest::between(args.school, args.from, args.to)
  };

  let cancel = CancelToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if let Some(code) = watch_interrupts(on_signal, tokio::signal::ctrl_c).await {
      std::process::exit(code.into());
    }
  });

  let report = match engine.promote_with_cancel(request, &cancel).await {
    Ok(report) => report,
    Err(e) => {
      if let Some(partial) = e.partial_report() {
        output::promotion(partial, json)?;
      }
      return Err(e).context("promotion failed");
    }
  };
  output::promotion(&report, json)?;

  if args.verify && !report.dry_run && !report.skipped_already_done {
    let check = engine
      .verify(report.source_year_id, report.target_year_id)
      .await
      .context("verification failed")?;
    output::consistency(&check, json)?;
    if !check.is_consistent {
      return Ok(ExitCode::from(EXIT_INCONSISTENT));
    }
  }

  Ok(if report.cancelled { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// First interrupt stops the run after the current batch; a second one
/// returns the exit status to abandon it with. `None` if the signal stream
/// fails.
async fn watch_interrupts<F, Fut>(cancel: CancelToken, mut next_signal: F) -> Option<u8>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = std::io::Result<()>>,
{
  if let Err(e) = next_signal().await {
    tracing::warn!(error = %e, "cannot listen for interrupts");
    return None;
  }
  tracing::warn!("interrupt received; finishing the current batch (interrupt again to abort)");
  cancel.cancel();

  if let Err(e) = next_signal().await {
    tracing::warn!(error = %e, "cannot listen for interrupts");
    return None;
  }
  tracing::error!("second interrupt; aborting, rerun to resume");
  Some(EXIT_INTERRUPTED)
}

fn read_overrides(path: &Path) -> anyhow::Result<Vec<PromotionOverride>> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading overrides file {}", path.display()))?;
  serde_json::from_str(&raw).with_context(|| format!("parsing overrides file {}", path.display()))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
