//! Write operations for the mirrored tables.
//!
//! Only the sync engine calls these, always inside a transaction it
//! controls. The functions take a plain `&Connection` so they work on a
//! `rusqlite::Transaction` through deref.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::records::{
  AbsenceRequest, Contract, Employee, EntityKind, Holiday, Invoice, Project, Record, TimeEntry,
};

use super::rows::date_to_sql;

/// Primary table for an entity.
pub fn table_name(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::Employees => "employees",
    EntityKind::Contracts => "contracts",
    EntityKind::TimeEntries => "hours",
    EntityKind::AbsenceRequests => "absence_requests",
    EntityKind::Holidays => "holidays",
    EntityKind::Projects => "projects",
    EntityKind::Invoices => "invoices",
  }
}

/// Columns whose non-empty local value survives a full resync. The list is
/// the whole policy: snapshot before the replace, re-apply after.
pub fn protected_columns(kind: EntityKind) -> &'static [&'static str] {
  match kind {
    EntityKind::Employees => &["function"],
    _ => &[],
  }
}

/// Delete every row for an entity. Lines go with their absence requests.
pub fn delete_all(conn: &Connection, kind: EntityKind) -> rusqlite::Result<()> {
  if kind == EntityKind::AbsenceRequests {
    conn.execute("DELETE FROM absence_request_lines", [])?;
  }
  conn.execute(&format!("DELETE FROM {}", table_name(kind)), [])?;
  Ok(())
}

/// Insert (or replace) one validated record.
pub fn insert(conn: &Connection, record: &Record) -> rusqlite::Result<()> {
  match record {
    Record::Employee(e) => insert_employee(conn, e),
    Record::Contract(c) => insert_contract(conn, c),
    Record::TimeEntry(t) => insert_time_entry(conn, t),
    Record::AbsenceRequest(r) => insert_absence_request(conn, r),
    Record::Holiday(h) => insert_holiday(conn, h),
    Record::Project(p) => insert_project(conn, p),
    Record::Invoice(i) => insert_invoice(conn, i),
  }
}

fn insert_employee(conn: &Connection, e: &Employee) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO employees (id, firstname, lastname, function, active)
     VALUES (?, ?, ?, ?, ?)",
    params![e.id, e.firstname, e.lastname, e.function, e.active as i64],
  )?;
  Ok(())
}

fn insert_contract(conn: &Connection, c: &Contract) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO contracts (
       id, employee_id,
       hours_monday_even, hours_tuesday_even, hours_wednesday_even,
       hours_thursday_even, hours_friday_even,
       hours_monday_odd, hours_tuesday_odd, hours_wednesday_odd,
       hours_thursday_odd, hours_friday_odd,
       startdate, enddate
     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    params![
      c.id,
      c.employee_id,
      c.hours_even[0],
      c.hours_even[1],
      c.hours_even[2],
      c.hours_even[3],
      c.hours_even[4],
      c.hours_odd[0],
      c.hours_odd[1],
      c.hours_odd[2],
      c.hours_odd[3],
      c.hours_odd[4],
      date_to_sql(c.startdate),
      c.enddate.map(date_to_sql),
    ],
  )?;
  Ok(())
}

fn insert_time_entry(conn: &Connection, t: &TimeEntry) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO hours (id, employee_id, date, amount, status)
     VALUES (?, ?, ?, ?, ?)",
    params![t.id, t.employee_id, date_to_sql(t.date), t.amount, t.status],
  )?;
  Ok(())
}

fn insert_absence_request(conn: &Connection, r: &AbsenceRequest) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO absence_requests (id, employee_id, absencetype)
     VALUES (?, ?, ?)",
    params![r.id, r.employee_id, r.absencetype],
  )?;

  // Replacing a request replaces its lines wholesale, so lines removed
  // upstream do not linger after an incremental sync.
  conn.execute(
    "DELETE FROM absence_request_lines WHERE absencerequest_id = ?",
    params![r.id],
  )?;
  for line in &r.lines {
    conn.execute(
      "INSERT OR REPLACE INTO absence_request_lines
         (id, absencerequest_id, date, amount, status_id, status_name)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        line.id,
        r.id,
        date_to_sql(line.date),
        line.amount,
        line.status_id,
        line.status_name
      ],
    )?;
  }
  Ok(())
}

fn insert_holiday(conn: &Connection, h: &Holiday) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO holidays (date, name) VALUES (?, ?)",
    params![date_to_sql(h.date), h.name],
  )?;
  Ok(())
}

fn insert_project(conn: &Connection, p: &Project) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO projects (id, name, active) VALUES (?, ?, ?)",
    params![p.id, p.name, p.active as i64],
  )?;
  Ok(())
}

fn insert_invoice(conn: &Connection, i: &Invoice) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR REPLACE INTO invoices (id, number, date, total, paid)
     VALUES (?, ?, ?, ?, ?)",
    params![
      i.id,
      i.number,
      i.date.map(date_to_sql),
      i.total,
      i.paid as i64
    ],
  )?;
  Ok(())
}

// ============================================================================
// Protected fields
// ============================================================================

/// A locally curated value snapshotted before a full replace.
#[derive(Debug, Clone)]
pub struct ProtectedValue {
  pub id: i64,
  pub column: &'static str,
  pub value: String,
}

/// Snapshot all non-empty protected values for an entity.
pub fn snapshot_protected(
  conn: &Connection,
  kind: EntityKind,
) -> rusqlite::Result<Vec<ProtectedValue>> {
  let table = table_name(kind);
  let mut snapshot = Vec::new();

  for &column in protected_columns(kind) {
    let mut stmt = conn.prepare(&format!(
      "SELECT id, {col} FROM {table} WHERE {col} IS NOT NULL",
      col = column,
      table = table,
    ))?;
    let values = stmt.query_map([], |row| {
      Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for value in values {
      let (id, value) = value?;
      if !value.trim().is_empty() {
        snapshot.push(ProtectedValue {
          id,
          column,
          value,
        });
      }
    }
  }

  Ok(snapshot)
}

/// Re-apply snapshotted values where the fresh upstream row left the field
/// empty. Upstream wins when it supplied something non-empty.
pub fn reapply_protected(
  conn: &Connection,
  kind: EntityKind,
  snapshot: &[ProtectedValue],
) -> rusqlite::Result<usize> {
  let table = table_name(kind);
  let mut applied = 0;

  for entry in snapshot {
    applied += conn.execute(
      &format!(
        "UPDATE {table} SET {col} = ?1
         WHERE id = ?2 AND ({col} IS NULL OR TRIM({col}) = '')",
        table = table,
        col = entry.column,
      ),
      params![entry.value, entry.id],
    )?;
  }

  Ok(applied)
}

// ============================================================================
// Sync status
// ============================================================================

pub fn set_sync_status(
  conn: &Connection,
  kind: EntityKind,
  status: &str,
  error: Option<&str>,
  last_sync: Option<DateTime<Utc>>,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO sync_status (entity, last_sync, status, error)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(entity) DO UPDATE SET
       last_sync = COALESCE(?2, last_sync),
       status = ?3,
       error = ?4",
    params![
      kind.as_str(),
      last_sync.map(|t| t.to_rfc3339()),
      status,
      error
    ],
  )?;
  Ok(())
}
