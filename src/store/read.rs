//! Fixed per-entity read operations. No general query surface: every read
//! the rest of the system needs is a named method here.

use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde::Serialize;

use crate::records::{
  AbsenceLine, Contract, Employee, EntityKind, Holiday, Invoice, Project, TimeEntry,
};

use super::rows;
use super::Database;

/// One row of the `sync_status` table.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusRow {
  pub entity: String,
  pub last_sync: Option<DateTime<Utc>>,
  pub status: String,
  pub error: Option<String>,
}

impl Database {
  pub fn list_employees(&self) -> Result<Vec<Employee>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, firstname, lastname, function, active FROM employees
         ORDER BY lastname, firstname",
      )
      .map_err(|e| eyre!("Failed to prepare employee query: {}", e))?;

    let employees = stmt
      .query_map([], rows::employee_from_row)
      .map_err(|e| eyre!("Failed to query employees: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read employee row: {}", e))?;

    Ok(employees)
  }

  pub fn get_employee(&self, id: i64) -> Result<Option<Employee>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, firstname, lastname, function, active FROM employees WHERE id = ?")
      .map_err(|e| eyre!("Failed to prepare employee query: {}", e))?;

    let employee = stmt
      .query_row(params![id], rows::employee_from_row)
      .map(Some)
      .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(eyre!("Failed to get employee {}: {}", id, other)),
      })?;

    Ok(employee)
  }

  pub fn contracts_for(&self, employee_id: i64) -> Result<Vec<Contract>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, employee_id,
                hours_monday_even, hours_tuesday_even, hours_wednesday_even,
                hours_thursday_even, hours_friday_even,
                hours_monday_odd, hours_tuesday_odd, hours_wednesday_odd,
                hours_thursday_odd, hours_friday_odd,
                startdate, enddate
         FROM contracts WHERE employee_id = ? ORDER BY startdate",
      )
      .map_err(|e| eyre!("Failed to prepare contract query: {}", e))?;

    let contracts = stmt
      .query_map(params![employee_id], rows::contract_from_row)
      .map_err(|e| eyre!("Failed to query contracts: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read contract row: {}", e))?;

    Ok(contracts)
  }

  pub fn time_entries_between(
    &self,
    employee_id: i64,
    from: NaiveDate,
    to: NaiveDate,
  ) -> Result<Vec<TimeEntry>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, employee_id, date, amount, status FROM hours
         WHERE employee_id = ? AND date >= ? AND date <= ?
         ORDER BY date",
      )
      .map_err(|e| eyre!("Failed to prepare time entry query: {}", e))?;

    let entries = stmt
      .query_map(
        params![employee_id, rows::date_to_sql(from), rows::date_to_sql(to)],
        rows::time_entry_from_row,
      )
      .map_err(|e| eyre!("Failed to query time entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read time entry row: {}", e))?;

    Ok(entries)
  }

  /// Absence lines for an employee in a date range, via the parent request.
  pub fn absence_lines_between(
    &self,
    employee_id: i64,
    from: NaiveDate,
    to: NaiveDate,
  ) -> Result<Vec<AbsenceLine>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT l.id, l.date, l.amount, l.status_id, l.status_name
         FROM absence_request_lines l
         INNER JOIN absence_requests r ON r.id = l.absencerequest_id
         WHERE r.employee_id = ? AND l.date >= ? AND l.date <= ?
         ORDER BY l.date",
      )
      .map_err(|e| eyre!("Failed to prepare absence line query: {}", e))?;

    let lines = stmt
      .query_map(
        params![employee_id, rows::date_to_sql(from), rows::date_to_sql(to)],
        rows::absence_line_from_row,
      )
      .map_err(|e| eyre!("Failed to query absence lines: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read absence line row: {}", e))?;

    Ok(lines)
  }

  pub fn holidays_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Holiday>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT date, name FROM holidays WHERE date >= ? AND date <= ? ORDER BY date")
      .map_err(|e| eyre!("Failed to prepare holiday query: {}", e))?;

    let holidays = stmt
      .query_map(
        params![rows::date_to_sql(from), rows::date_to_sql(to)],
        rows::holiday_from_row,
      )
      .map_err(|e| eyre!("Failed to query holidays: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read holiday row: {}", e))?;

    Ok(holidays)
  }

  pub fn list_projects(&self) -> Result<Vec<Project>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, name, active FROM projects ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare project query: {}", e))?;

    let projects = stmt
      .query_map([], rows::project_from_row)
      .map_err(|e| eyre!("Failed to query projects: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read project row: {}", e))?;

    Ok(projects)
  }

  pub fn list_invoices(&self) -> Result<Vec<Invoice>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, number, date, total, paid FROM invoices ORDER BY date")
      .map_err(|e| eyre!("Failed to prepare invoice query: {}", e))?;

    let invoices = stmt
      .query_map([], rows::invoice_from_row)
      .map_err(|e| eyre!("Failed to query invoices: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read invoice row: {}", e))?;

    Ok(invoices)
  }

  pub fn sync_status(&self, kind: EntityKind) -> Result<Option<SyncStatusRow>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT entity, last_sync, status, error FROM sync_status WHERE entity = ?")
      .map_err(|e| eyre!("Failed to prepare sync status query: {}", e))?;

    let row = stmt
      .query_row(params![kind.as_str()], sync_status_from_row)
      .map(Some)
      .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(eyre!("Failed to get sync status: {}", other)),
      })?;

    Ok(row)
  }

  pub fn sync_statuses(&self) -> Result<Vec<SyncStatusRow>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT entity, last_sync, status, error FROM sync_status ORDER BY entity")
      .map_err(|e| eyre!("Failed to prepare sync status query: {}", e))?;

    let statuses = stmt
      .query_map([], sync_status_from_row)
      .map_err(|e| eyre!("Failed to query sync statuses: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read sync status row: {}", e))?;

    Ok(statuses)
  }

  /// Row count for an entity's primary table.
  pub fn row_count(&self, kind: EntityKind) -> Result<i64> {
    let conn = self.lock()?;
    let table = super::write::table_name(kind);
    let count = conn
      .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
      })
      .map_err(|e| eyre!("Failed to count {} rows: {}", table, e))?;
    Ok(count)
  }

  /// Ids of all known employees, for orphan checks during sync.
  pub fn employee_ids(&self) -> Result<std::collections::HashSet<i64>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id FROM employees")
      .map_err(|e| eyre!("Failed to prepare employee id query: {}", e))?;

    let ids = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query employee ids: {}", e))?
      .collect::<rusqlite::Result<std::collections::HashSet<i64>>>()
      .map_err(|e| eyre!("Failed to read employee id: {}", e))?;

    Ok(ids)
  }
}

fn sync_status_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncStatusRow> {
  let last_sync: Option<String> = row.get(1)?;
  Ok(SyncStatusRow {
    entity: row.get(0)?,
    last_sync: last_sync.and_then(|s| {
      DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
    }),
    status: row.get(2)?,
    error: row.get(3)?,
  })
}
