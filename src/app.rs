//! Application wiring: config in, constructed components out.
//!
//! Every component is built here and injected explicitly; nothing holds a
//! process-global. The CLI subcommands in `main.rs` are thin calls into
//! this struct.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::hours::{HoursEngine, Period};
use crate::records::EntityKind;
use crate::store::Database;
use crate::sync::{SyncEngine, SyncMode};
use crate::upstream::UpstreamClient;

pub struct App {
  config: Config,
  db: Arc<Database>,
  sync: SyncEngine<UpstreamClient>,
  hours: HoursEngine,
  entity_cache: TtlCache,
  hours_cache: TtlCache,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;

    let db = Arc::new(Database::open(config.database_path.as_deref())?);
    let client = Arc::new(UpstreamClient::new(&config.upstream, api_key)?);

    let ttl = Duration::from_secs(config.cache.ttl_secs);
    let global_ttl = Duration::from_secs(config.cache.global_ttl_secs);

    let mut entity_cache = TtlCache::new("entities", ttl);
    let mut hours_cache =
      TtlCache::new("hours", ttl).with_global_key("hours:global", global_ttl);
    if let Some(dir) = &config.cache.snapshot_dir {
      entity_cache = entity_cache.with_snapshot_dir(dir);
      hours_cache = hours_cache.with_snapshot_dir(dir);
    }

    let sync = SyncEngine::new(
      Arc::clone(&db),
      client,
      entity_cache.clone(),
      hours_cache.clone(),
    );
    let hours = HoursEngine::new(Arc::clone(&db), hours_cache.clone(), &config.hours);

    Ok(Self {
      config,
      db,
      sync,
      hours,
      entity_cache,
      hours_cache,
    })
  }

  /// Sync one entity, or all of them in dependency order.
  pub async fn sync(&self, entity: Option<&str>, mode: SyncMode) -> Result<()> {
    let results = match entity {
      Some(name) => {
        let kind = EntityKind::parse(name)
          .ok_or_else(|| eyre!("Unknown entity: {} (try e.g. employees, hours)", name))?;
        vec![(kind, self.sync.sync_entity(kind, mode).await)]
      }
      None => self.sync.sync_all(mode).await,
    };

    let mut failed = 0;
    for (kind, result) in results {
      match result {
        Ok(report) => {
          println!(
            "{:<18} saved {:>5}  skipped {:>4}  errors {:>4}",
            kind,
            report.saved,
            report.skipped,
            report.errors.len()
          );
          for error in report.errors.iter().take(5) {
            println!("  - {}", error);
          }
        }
        Err(err) => {
          failed += 1;
          println!("{:<18} FAILED: {}", kind, err);
        }
      }
    }

    if failed > 0 {
      Err(eyre!("{} entity sync(s) failed", failed))
    } else {
      Ok(())
    }
  }

  /// Print the mirrored rows for an entity.
  pub fn list(&self, entity: &str) -> Result<()> {
    let kind = EntityKind::parse(entity).ok_or_else(|| eyre!("Unknown entity: {}", entity))?;

    match kind {
      EntityKind::Employees => {
        for e in self.db.list_employees()? {
          println!(
            "{:>6}  {:<28} {:<24} {}",
            e.id,
            e.full_name(),
            e.function.as_deref().unwrap_or("-"),
            if e.active { "active" } else { "inactive" }
          );
        }
      }
      EntityKind::Projects => {
        for p in self.db.list_projects()? {
          println!(
            "{:>6}  {:<32} {}",
            p.id,
            p.name,
            if p.active { "active" } else { "inactive" }
          );
        }
      }
      EntityKind::Invoices => {
        for i in self.db.list_invoices()? {
          println!(
            "{:>6}  {:<16} {:<12} {:>10.2}  {}",
            i.id,
            i.number,
            i.date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            i.total,
            if i.paid { "paid" } else { "open" }
          );
        }
      }
      other => {
        return Err(eyre!(
          "Listing {} is not supported; use report for hours-related entities",
          other
        ));
      }
    }
    Ok(())
  }

  /// Print the hours report for one employee or the whole staff.
  pub fn report(&self, employee: Option<i64>, period: Period, fresh: bool) -> Result<()> {
    match employee {
      Some(employee_id) => {
        let employee = self
          .db
          .get_employee(employee_id)?
          .ok_or_else(|| eyre!("No employee with id {}", employee_id))?;
        let summary = self.hours.compute_for_period(employee_id, period)?;

        println!("{} ({})", employee.full_name(), period.cache_key());
        println!("  contract  {:>7.2}", summary.contract_hours);
        println!("  holiday   {:>7.2}", summary.holiday_hours);
        println!("  expected  {:>7.2}", summary.expected_hours);
        println!("  leave     {:>7.2}", summary.leave_hours);
        println!("  written   {:>7.2}", summary.written_hours);
        println!("  actual    {:>7.2}  ({}%)", summary.actual_hours, summary.percentage);
      }
      None => {
        let (rows, stale) = self.hours.report(period, fresh)?;
        if stale {
          println!("(stale: served from the global cache fallback)");
        }
        println!(
          "{:<28} {:>9} {:>9} {:>7} {:>8} {:>7}",
          "employee", "expected", "written", "leave", "actual", "%"
        );
        for row in rows {
          println!(
            "{:<28} {:>9.2} {:>9.2} {:>7.2} {:>8.2} {:>6}%",
            row.employee.full_name(),
            row.summary.expected_hours,
            row.summary.written_hours,
            row.summary.leave_hours,
            row.summary.actual_hours,
            row.summary.percentage
          );
        }
      }
    }
    Ok(())
  }

  pub fn cache_status(&self) -> Result<()> {
    for cache in [&self.entity_cache, &self.hours_cache] {
      let status = cache.status();
      println!(
        "{:<10} entries {:>4}  expired {:>4}  snapshot {}",
        status.name,
        status.entries,
        status.expired,
        status.snapshot_path.as_deref().unwrap_or("-")
      );
    }
    for status in self.db.sync_statuses()? {
      println!(
        "{:<18} {:<8} last sync: {}",
        status.entity,
        status.status,
        status
          .last_sync
          .map(|t| t.to_rfc3339())
          .unwrap_or_else(|| "never".to_string())
      );
    }
    Ok(())
  }

  pub fn cache_clear(&self, entity: Option<&str>) -> Result<()> {
    let dropped = match entity {
      Some(name) => {
        let kind = EntityKind::parse(name).ok_or_else(|| eyre!("Unknown entity: {}", name))?;
        let prefix = format!("{}:", kind.as_str());
        self.entity_cache.clear(&prefix) + self.hours_cache.clear(&prefix)
      }
      None => self.entity_cache.clear_all() + self.hours_cache.clear_all(),
    };
    println!("dropped {} cache entries", dropped);
    Ok(())
  }

  /// Periodic auto-sync loop. Runs until interrupted.
  pub async fn watch(&self, interval_override: Option<u64>) -> Result<()> {
    let secs = interval_override.unwrap_or(self.config.sync.interval_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    info!(interval_secs = secs, "starting auto-sync loop");

    loop {
      ticker.tick().await;
      for (kind, result) in self.sync.sync_all(SyncMode::Incremental).await {
        if let Err(err) = result {
          error!(entity = %kind, error = %err, "auto-sync failed");
        }
      }
    }
  }
}
