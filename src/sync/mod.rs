//! Sync orchestrator: pulls entity collections from upstream and replaces
//! the mirrored tables transactionally.
//!
//! A full sync of one entity is an atomic unit: snapshot protected fields,
//! fetch every page, validate, then delete-and-reinsert inside a single
//! transaction that only commits when at least one row was saved. Readers
//! never see the half-replaced table; a failed sync leaves the previous
//! data intact.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::error::{SyncError, UpstreamError, ValidationError};
use crate::records::{EntityKind, Record};
use crate::store::{write, Database};
use crate::upstream::UpstreamClient;

/// Source of upstream rows. The production implementation is
/// [`UpstreamClient`]; tests substitute canned rows.
pub trait FetchRows: Send + Sync {
  fn fetch_all(
    &self,
    method: &str,
    filters: &[Value],
  ) -> impl Future<Output = Result<Vec<Value>, UpstreamError>> + Send;
}

impl FetchRows for UpstreamClient {
  async fn fetch_all(&self, method: &str, filters: &[Value]) -> Result<Vec<Value>, UpstreamError> {
    UpstreamClient::fetch_all(self, method, filters).await
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
  /// Replace the whole table.
  Full,
  /// Upsert rows changed since the last successful sync.
  Incremental,
}

/// Outcome of one entity sync.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
  pub saved: usize,
  pub skipped: usize,
  pub errors: Vec<String>,
}

pub struct SyncEngine<F: FetchRows> {
  db: Arc<Database>,
  fetcher: Arc<F>,
  /// Cache over entity list reads, invalidated per entity prefix.
  entity_cache: TtlCache,
  /// Cache over derived metrics, dropped wholesale when inputs change.
  hours_cache: TtlCache,
  in_flight: Mutex<HashSet<EntityKind>>,
}

impl<F: FetchRows> SyncEngine<F> {
  pub fn new(db: Arc<Database>, fetcher: Arc<F>, entity_cache: TtlCache, hours_cache: TtlCache) -> Self {
    Self {
      db,
      fetcher,
      entity_cache,
      hours_cache,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// Sync every entity kind in dependency order (employees first, so the
  /// orphan checks for time entries and absences see fresh ids).
  pub async fn sync_all(&self, mode: SyncMode) -> Vec<(EntityKind, Result<SyncReport, SyncError>)> {
    let mut results = Vec::new();
    for kind in EntityKind::ALL {
      let result = self.sync_entity(kind, mode).await;
      if let Err(err) = &result {
        warn!(entity = %kind, error = %err, "entity sync failed");
      }
      results.push((kind, result));
    }
    results
  }

  /// Sync one entity kind.
  pub async fn sync_entity(&self, kind: EntityKind, mode: SyncMode) -> Result<SyncReport, SyncError> {
    let _guard = self.claim(kind)?;

    let result = self.run_sync(kind, mode).await;

    match &result {
      Ok(report) => {
        info!(
          entity = %kind,
          saved = report.saved,
          skipped = report.skipped,
          errors = report.errors.len(),
          "sync finished"
        );
        self.record_status(kind, "ok", None);
        self.invalidate_caches(kind);
      }
      Err(err) => {
        self.record_status(kind, "failed", Some(&err.to_string()));
      }
    }

    result
  }

  async fn run_sync(&self, kind: EntityKind, mode: SyncMode) -> Result<SyncReport, SyncError> {
    // 1. Snapshot protected fields before anything else touches the table.
    let snapshot = {
      let conn = self.lock_db()?;
      write::snapshot_protected(&conn, kind)?
    };

    // 2. Fetch all pages. A failure here aborts the sync with previous
    //    data intact: no transaction has been opened yet.
    let filters = self.filters_for(kind, mode);
    let rows = self.fetcher.fetch_all(kind.upstream_method(), &filters).await?;

    if rows.is_empty() && mode == SyncMode::Incremental {
      // Nothing changed upstream; that is a successful no-op.
      return Ok(SyncReport::default());
    }

    // 3. Validate. Records without identifiers and orphans referencing
    //    unknown employees are skipped, never fatal.
    let employee_ids = if kind == EntityKind::TimeEntries || kind == EntityKind::AbsenceRequests {
      self
        .db
        .employee_ids()
        .map_err(|e| SyncError::Internal(e.to_string()))?
    } else {
      HashSet::new()
    };

    let mut report = SyncReport::default();
    let mut records = Vec::new();
    for row in &rows {
      match Record::decode(kind, row) {
        Ok(record) => {
          if let Some(employee_id) = record.employee_ref() {
            if !employee_ids.contains(&employee_id) {
              warn!(entity = %kind, employee_id, "dropping orphan record");
              report.skipped += 1;
              report
                .errors
                .push(format!("orphan record references employee {}", employee_id));
              continue;
            }
          }
          records.push(record);
        }
        Err(err) => {
          warn!(entity = %kind, error = %err, "dropping invalid record");
          report.skipped += 1;
          report.errors.push(err.to_string());
        }
      }
    }

    // 4. Replace (or upsert) inside one transaction.
    let errors = {
      let mut conn = self.lock_db()?;
      let tx = conn.transaction()?;

      if mode == SyncMode::Full {
        write::delete_all(&tx, kind)?;
      }

      for record in &records {
        match write::insert(&tx, record) {
          Ok(()) => report.saved += 1,
          Err(err) => {
            report.skipped += 1;
            report.errors.push(err.to_string());
          }
        }
      }

      write::reapply_protected(&tx, kind, &snapshot)?;

      // 5. Commit only when something was actually saved; otherwise the
      //    rollback leaves the table exactly as it was.
      if report.saved > 0 {
        tx.commit()?;
        None
      } else {
        tx.rollback()?;
        Some(validation_errors(&report))
      }
    };

    match errors {
      Some(errors) => Err(SyncError::NothingSaved { errors }),
      None => Ok(report),
    }
  }

  fn filters_for(&self, kind: EntityKind, mode: SyncMode) -> Vec<Value> {
    if mode != SyncMode::Incremental {
      return Vec::new();
    }
    let since = self
      .db
      .sync_status(kind)
      .ok()
      .flatten()
      .and_then(|status| status.last_sync);
    match since {
      Some(since) => vec![json!({"updated_since": since.to_rfc3339()})],
      None => Vec::new(),
    }
  }

  fn record_status(&self, kind: EntityKind, status: &str, error: Option<&str>) {
    let last_sync = (status == "ok").then(Utc::now);
    let result = self
      .lock_db()
      .and_then(|conn| write::set_sync_status(&conn, kind, status, error, last_sync).map_err(SyncError::from));
    if let Err(err) = result {
      warn!(entity = %kind, error = %err, "failed to record sync status");
    }
  }

  fn invalidate_caches(&self, kind: EntityKind) {
    self.entity_cache.clear(&format!("{}:", kind.as_str()));
    // Derived metrics read employees, contracts, hours, absences and
    // holidays; any of those changing invalidates every hours key.
    if !matches!(kind, EntityKind::Projects | EntityKind::Invoices) {
      self.hours_cache.clear("hours:");
    }
  }

  fn lock_db(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, SyncError> {
    self.db.lock().map_err(|e| SyncError::Internal(e.to_string()))
  }

  /// Claim the per-entity in-flight slot. A second sync for the same kind
  /// while one runs is rejected, never interleaved.
  fn claim(&self, kind: EntityKind) -> Result<InFlightGuard<'_>, SyncError> {
    let mut in_flight = self
      .in_flight
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if !in_flight.insert(kind) {
      return Err(SyncError::AlreadyRunning(kind.as_str()));
    }
    Ok(InFlightGuard {
      set: &self.in_flight,
      kind,
    })
  }
}

struct InFlightGuard<'a> {
  set: &'a Mutex<HashSet<EntityKind>>,
  kind: EntityKind,
}

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    let mut in_flight = self
      .set
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    in_flight.remove(&self.kind);
  }
}

fn validation_errors(report: &SyncReport) -> Vec<ValidationError> {
  report
    .errors
    .iter()
    .map(|detail| ValidationError {
      entity: "sync",
      detail: detail.clone(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::time::Duration;

  /// Fetcher returning canned rows per method, or an error.
  struct StubFetcher {
    rows: std::collections::HashMap<&'static str, Vec<Value>>,
    fail_with: Option<fn() -> UpstreamError>,
  }

  impl StubFetcher {
    fn with(method: &'static str, rows: Vec<Value>) -> Self {
      let mut map = std::collections::HashMap::new();
      map.insert(method, rows);
      Self {
        rows: map,
        fail_with: None,
      }
    }

    fn failing(err: fn() -> UpstreamError) -> Self {
      Self {
        rows: std::collections::HashMap::new(),
        fail_with: Some(err),
      }
    }
  }

  impl FetchRows for StubFetcher {
    async fn fetch_all(&self, method: &str, _filters: &[Value]) -> Result<Vec<Value>, UpstreamError> {
      if let Some(fail) = self.fail_with {
        return Err(fail());
      }
      Ok(self.rows.get(method).cloned().unwrap_or_default())
    }
  }

  fn engine(fetcher: StubFetcher) -> SyncEngine<StubFetcher> {
    engine_on(Database::in_memory().unwrap(), fetcher)
  }

  fn engine_on(db: Database, fetcher: StubFetcher) -> SyncEngine<StubFetcher> {
    SyncEngine::new(
      Arc::new(db),
      Arc::new(fetcher),
      TtlCache::new("entities-test", Duration::from_secs(60)),
      TtlCache::new("hours-test", Duration::from_secs(60)),
    )
  }

  fn employee_row(id: i64, function: &str) -> Value {
    json!({
      "id": id,
      "firstname": "Test",
      "lastname": format!("Employee{}", id),
      "function": function,
      "active": 1
    })
  }

  #[tokio::test]
  async fn test_full_sync_replaces_table() {
    let engine = engine(StubFetcher::with(
      "getEmployees",
      vec![employee_row(1, "Developer"), employee_row(2, "Designer")],
    ));

    let report = engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();

    assert_eq!(report.saved, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(engine.db.row_count(EntityKind::Employees).unwrap(), 2);

    let status = engine.db.sync_status(EntityKind::Employees).unwrap().unwrap();
    assert_eq!(status.status, "ok");
    assert!(status.last_sync.is_some());
  }

  #[tokio::test]
  async fn test_resync_is_idempotent() {
    let fetcher = StubFetcher::with(
      "getEmployees",
      vec![employee_row(1, "Developer"), employee_row(2, "Designer")],
    );
    let engine = engine(fetcher);

    engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();
    let first = engine.db.list_employees().unwrap();

    engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();
    let second = engine.db.list_employees().unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
      assert_eq!(a.id, b.id);
      assert_eq!(a.function, b.function);
    }
  }

  #[tokio::test]
  async fn test_invalid_rows_are_skipped_not_fatal() {
    let engine = engine(StubFetcher::with(
      "getEmployees",
      vec![
        employee_row(1, "Developer"),
        json!({"firstname": "Geen", "lastname": "Id"}),
      ],
    ));

    let report = engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();

    assert_eq!(report.saved, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.len(), 1);
  }

  #[tokio::test]
  async fn test_zero_success_rolls_back_and_keeps_old_rows() {
    let db = Database::in_memory().unwrap();
    {
      let conn = db.lock().unwrap();
      write::insert(
        &conn,
        &Record::Employee(crate::records::Employee {
          id: 99,
          firstname: "Old".into(),
          lastname: "Row".into(),
          function: None,
          active: true,
        }),
      )
      .unwrap();
    }

    let engine = engine_on(
      db,
      StubFetcher::with("getEmployees", vec![json!({"no": "id"}), json!({"also": "no id"})]),
    );

    let result = engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await;

    assert!(matches!(result, Err(SyncError::NothingSaved { .. })));
    // The pre-sync row survived the rollback.
    assert_eq!(engine.db.row_count(EntityKind::Employees).unwrap(), 1);

    let status = engine.db.sync_status(EntityKind::Employees).unwrap().unwrap();
    assert_eq!(status.status, "failed");
  }

  #[tokio::test]
  async fn test_protected_function_survives_empty_upstream_value() {
    let db = Database::in_memory().unwrap();
    {
      let conn = db.lock().unwrap();
      write::insert(
        &conn,
        &Record::Employee(crate::records::Employee {
          id: 1,
          firstname: "Test".into(),
          lastname: "Employee1".into(),
          function: Some("Lead Developer".into()),
          active: true,
        }),
      )
      .unwrap();
    }

    let engine = engine_on(db, StubFetcher::with("getEmployees", vec![employee_row(1, "")]));
    engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();

    let employee = engine.db.get_employee(1).unwrap().unwrap();
    assert_eq!(employee.function.as_deref(), Some("Lead Developer"));
  }

  #[tokio::test]
  async fn test_non_empty_upstream_function_wins() {
    let db = Database::in_memory().unwrap();
    {
      let conn = db.lock().unwrap();
      write::insert(
        &conn,
        &Record::Employee(crate::records::Employee {
          id: 1,
          firstname: "Test".into(),
          lastname: "Employee1".into(),
          function: Some("Lead Developer".into()),
          active: true,
        }),
      )
      .unwrap();
    }

    let engine = engine_on(
      db,
      StubFetcher::with("getEmployees", vec![employee_row(1, "Engineering Manager")]),
    );
    engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();

    let employee = engine.db.get_employee(1).unwrap().unwrap();
    assert_eq!(employee.function.as_deref(), Some("Engineering Manager"));
  }

  #[tokio::test]
  async fn test_orphan_time_entries_are_dropped() {
    let db = Database::in_memory().unwrap();
    {
      let conn = db.lock().unwrap();
      write::insert(
        &conn,
        &Record::Employee(crate::records::Employee {
          id: 1,
          firstname: "Test".into(),
          lastname: "Employee1".into(),
          function: None,
          active: true,
        }),
      )
      .unwrap();
    }

    let engine = engine_on(
      db,
      StubFetcher::with(
        "getHours",
        vec![
          json!({"id": 1, "employee_id": 1, "date": "2024-03-04", "amount": 8}),
          json!({"id": 2, "employee_id": 777, "date": "2024-03-04", "amount": 8}),
        ],
      ),
    );

    let report = engine
      .sync_entity(EntityKind::TimeEntries, SyncMode::Full)
      .await
      .unwrap();

    assert_eq!(report.saved, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(engine.db.row_count(EntityKind::TimeEntries).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_upstream_failure_aborts_without_touching_data() {
    let db = Database::in_memory().unwrap();
    {
      let conn = db.lock().unwrap();
      write::insert(
        &conn,
        &Record::Employee(crate::records::Employee {
          id: 1,
          firstname: "Test".into(),
          lastname: "Employee1".into(),
          function: None,
          active: true,
        }),
      )
      .unwrap();
    }

    let engine = engine_on(
      db,
      StubFetcher::failing(|| UpstreamError::Network("connection refused".into())),
    );

    let result = engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await;
    assert!(matches!(result, Err(SyncError::Upstream(_))));
    assert_eq!(engine.db.row_count(EntityKind::Employees).unwrap(), 1);
  }

  #[tokio::test]
  async fn test_incremental_upserts_without_deleting() {
    let db = Database::in_memory().unwrap();
    {
      let conn = db.lock().unwrap();
      for id in [1, 2] {
        write::insert(
          &conn,
          &Record::Employee(crate::records::Employee {
            id,
            firstname: "Test".into(),
            lastname: format!("Employee{}", id),
            function: None,
            active: true,
          }),
        )
        .unwrap();
      }
    }

    // Only employee 2 changed upstream.
    let engine = engine_on(
      db,
      StubFetcher::with("getEmployees", vec![employee_row(2, "Designer")]),
    );
    let report = engine
      .sync_entity(EntityKind::Employees, SyncMode::Incremental)
      .await
      .unwrap();

    assert_eq!(report.saved, 1);
    assert_eq!(engine.db.row_count(EntityKind::Employees).unwrap(), 2);
    let updated = engine.db.get_employee(2).unwrap().unwrap();
    assert_eq!(updated.function.as_deref(), Some("Designer"));
  }

  #[tokio::test]
  async fn test_incremental_with_no_changes_is_a_noop() {
    let engine = engine(StubFetcher::with("getEmployees", Vec::new()));
    let report = engine
      .sync_entity(EntityKind::Employees, SyncMode::Incremental)
      .await
      .unwrap();
    assert_eq!(report.saved, 0);
    assert!(report.errors.is_empty());
  }

  #[tokio::test]
  async fn test_concurrent_sync_of_same_entity_rejected() {
    let engine = engine(StubFetcher::with("getEmployees", vec![employee_row(1, "")]));

    let _guard = engine.claim(EntityKind::Employees).unwrap();
    let result = engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await;
    assert!(matches!(result, Err(SyncError::AlreadyRunning(_))));

    drop(_guard);
    assert!(engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .is_ok());
  }

  #[tokio::test]
  async fn test_successful_sync_invalidates_caches() {
    let engine = engine(StubFetcher::with("getEmployees", vec![employee_row(1, "")]));
    engine
      .entity_cache
      .set("employees:list", json!([1]), None);
    engine.hours_cache.set("hours:week:2024-10", json!({}), None);

    engine
      .sync_entity(EntityKind::Employees, SyncMode::Full)
      .await
      .unwrap();

    assert!(engine.entity_cache.get("employees:list").is_none());
    assert!(engine.hours_cache.get("hours:week:2024-10").is_none());
  }

  #[tokio::test]
  async fn test_project_sync_keeps_hours_cache() {
    let engine = engine(StubFetcher::with(
      "getProjects",
      vec![json!({"id": 1, "name": "Intern", "active": 1})],
    ));
    engine.hours_cache.set("hours:week:2024-10", json!({}), None);

    engine
      .sync_entity(EntityKind::Projects, SyncMode::Full)
      .await
      .unwrap();

    assert!(engine.hours_cache.get("hours:week:2024-10").is_some());
  }
}
