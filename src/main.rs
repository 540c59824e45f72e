mod app;
mod cache;
mod config;
mod error;
mod hours;
mod records;
mod store;
mod sync;
mod upstream;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hours::Period;
use sync::SyncMode;

#[derive(Parser, Debug)]
#[command(name = "urenteller")]
#[command(about = "Mirrors a project-management service into SQLite and reports hours")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/urenteller/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this directory instead of stderr
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pull entity collections from upstream into the local mirror
  Sync {
    /// Entity to sync (employees, contracts, hours, absence_requests,
    /// holidays, projects, invoices); all of them when omitted
    entity: Option<String>,

    /// Only fetch rows changed since the last successful sync
    #[arg(long)]
    incremental: bool,
  },

  /// List mirrored rows for an entity
  List {
    /// Entity to list (employees, projects, invoices)
    entity: String,
  },

  /// Report hours for a week or month
  Report {
    /// Employee id; the whole staff when omitted
    employee: Option<i64>,

    /// ISO week, e.g. 2024-W10
    #[arg(long, conflicts_with = "month")]
    week: Option<String>,

    /// Calendar month, e.g. 2024-03
    #[arg(long)]
    month: Option<String>,

    /// Bypass the cache and recompute
    #[arg(long)]
    fresh: bool,
  },

  /// Inspect or clear the caches
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },

  /// Run the periodic auto-sync loop
  Watch {
    /// Seconds between sync rounds (default from config)
    #[arg(long)]
    interval: Option<u64>,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Show cache and sync state
  Status,
  /// Drop cached entries, for one entity or all of them
  Clear { entity: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(args.log_dir.as_deref());

  let config = config::Config::load(args.config.as_deref())?;
  let app = app::App::new(config)?;

  match args.command {
    Command::Sync {
      entity,
      incremental,
    } => {
      let mode = if incremental {
        SyncMode::Incremental
      } else {
        SyncMode::Full
      };
      app.sync(entity.as_deref(), mode).await
    }
    Command::List { entity } => app.list(&entity),
    Command::Report {
      employee,
      week,
      month,
      fresh,
    } => {
      let period = match (week, month) {
        (Some(w), _) => Period::parse_week(&w)?,
        (None, Some(m)) => Period::parse_month(&m)?,
        (None, None) => return Err(eyre!("Pass --week YYYY-WW or --month YYYY-MM")),
      };
      app.report(employee, period, fresh)
    }
    Command::Cache { action } => match action {
      CacheAction::Status => app.cache_status(),
      CacheAction::Clear { entity } => app.cache_clear(entity.as_deref()),
    },
    Command::Watch { interval } => app.watch(interval).await,
  }
}

/// Set up tracing: env-filtered, to stderr or a daily log file.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "urenteller.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}
