//! Domain records mirrored from the upstream service, plus the decoding
//! from raw upstream rows into typed records.
//!
//! Decoding is deliberately tolerant: upstream rows come from an old RPC
//! API that serializes numbers as strings as often as not, and a row
//! missing its identifier is a skippable validation failure, never a fatal
//! one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

// ============================================================================
// Entity kinds
// ============================================================================

/// The entity collections mirrored from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Employees,
  Contracts,
  TimeEntries,
  AbsenceRequests,
  Holidays,
  Projects,
  Invoices,
}

impl EntityKind {
  pub const ALL: [EntityKind; 7] = [
    EntityKind::Employees,
    EntityKind::Contracts,
    EntityKind::TimeEntries,
    EntityKind::AbsenceRequests,
    EntityKind::Holidays,
    EntityKind::Projects,
    EntityKind::Invoices,
  ];

  /// Stable name used for sync_status rows and cache key prefixes.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Employees => "employees",
      Self::Contracts => "contracts",
      Self::TimeEntries => "hours",
      Self::AbsenceRequests => "absence_requests",
      Self::Holidays => "holidays",
      Self::Projects => "projects",
      Self::Invoices => "invoices",
    }
  }

  /// RPC method name on the upstream service.
  pub fn upstream_method(&self) -> &'static str {
    match self {
      Self::Employees => "getEmployees",
      Self::Contracts => "getContracts",
      Self::TimeEntries => "getHours",
      Self::AbsenceRequests => "getAbsenceRequests",
      Self::Holidays => "getHolidays",
      Self::Projects => "getProjects",
      Self::Invoices => "getInvoices",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "employees" => Some(Self::Employees),
      "contracts" => Some(Self::Contracts),
      "hours" | "time_entries" => Some(Self::TimeEntries),
      "absence_requests" | "absences" => Some(Self::AbsenceRequests),
      "holidays" => Some(Self::Holidays),
      "projects" => Some(Self::Projects),
      "invoices" => Some(Self::Invoices),
      _ => None,
    }
  }
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// Domain records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
  pub id: i64,
  pub firstname: String,
  pub lastname: String,
  /// Function title. Protected: a manually set value survives a resync
  /// unless upstream supplies a non-empty replacement.
  pub function: Option<String>,
  pub active: bool,
}

impl Employee {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.firstname, self.lastname)
  }
}

/// Weekday-hour vector, Monday through Friday.
pub type WeekHours = [f64; 5];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
  pub id: i64,
  pub employee_id: i64,
  /// Hours per weekday in even ISO weeks.
  pub hours_even: WeekHours,
  /// Hours per weekday in odd ISO weeks.
  pub hours_odd: WeekHours,
  pub startdate: NaiveDate,
  pub enddate: Option<NaiveDate>,
}

impl Contract {
  /// Whether the contract covers the given date.
  pub fn covers(&self, date: NaiveDate) -> bool {
    date >= self.startdate && self.enddate.map_or(true, |end| date <= end)
  }

  /// Hour value for a weekday (0 = Monday .. 4 = Friday) and week parity.
  pub fn hours_for(&self, weekday: usize, even_week: bool) -> f64 {
    let vector = if even_week {
      &self.hours_even
    } else {
      &self.hours_odd
    };
    vector.get(weekday).copied().unwrap_or(0.0)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
  pub id: i64,
  pub employee_id: i64,
  pub date: NaiveDate,
  pub amount: f64,
  pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsenceRequest {
  pub id: i64,
  pub employee_id: i64,
  pub absencetype: String,
  pub lines: Vec<AbsenceLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsenceLine {
  pub id: i64,
  pub date: NaiveDate,
  /// Hours of absence on this day.
  pub amount: f64,
  pub status_id: Option<i64>,
  pub status_name: Option<String>,
}

impl AbsenceLine {
  pub fn status(&self) -> AbsenceStatus {
    AbsenceStatus::resolve(self.status_id, self.status_name.as_deref())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
  pub date: NaiveDate,
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub id: i64,
  pub name: String,
  pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
  pub id: i64,
  pub number: String,
  pub date: Option<NaiveDate>,
  pub total: f64,
  pub paid: bool,
}

// ============================================================================
// Absence status resolution
// ============================================================================

/// Approval status of an absence line. The upstream mixes Dutch and English
/// spellings and sometimes only sends the numeric status id, so both inputs
/// are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsenceStatus {
  Submitted,
  Approved,
  Rejected,
  Unknown,
}

impl AbsenceStatus {
  pub fn resolve(status_id: Option<i64>, status_name: Option<&str>) -> Self {
    if let Some(name) = status_name {
      match name.trim().to_lowercase().as_str() {
        "goedgekeurd" | "approved" | "akkoord" => return Self::Approved,
        "ingediend" | "submitted" | "aangevraagd" => return Self::Submitted,
        "afgekeurd" | "rejected" | "geweigerd" => return Self::Rejected,
        _ => {}
      }
    }

    match status_id {
      Some(1) => Self::Submitted,
      Some(2) => Self::Approved,
      Some(3) => Self::Rejected,
      _ => Self::Unknown,
    }
  }

  pub fn is_approved(&self) -> bool {
    matches!(self, Self::Approved)
  }
}

// ============================================================================
// Upstream row decoding
// ============================================================================

/// Read a field that may be a JSON number or a numeric string.
fn field_i64(row: &Value, key: &str) -> Option<i64> {
  match row.get(key)? {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn field_f64(row: &Value, key: &str) -> Option<f64> {
  match row.get(key)? {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().replace(',', ".").parse().ok(),
    _ => None,
  }
}

fn field_str(row: &Value, key: &str) -> Option<String> {
  match row.get(key)? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn field_bool(row: &Value, key: &str) -> Option<bool> {
  match row.get(key)? {
    Value::Bool(b) => Some(*b),
    Value::Number(n) => Some(n.as_i64() == Some(1)),
    Value::String(s) => match s.trim() {
      "1" | "true" | "yes" => Some(true),
      "0" | "false" | "no" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

fn field_date(row: &Value, key: &str) -> Option<NaiveDate> {
  let s = field_str(row, key)?;
  // Dates arrive as "2024-03-04" or "2024-03-04 00:00:00".
  let date_part = s.split_whitespace().next()?;
  NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn missing(entity: &'static str, row: &Value, what: &str) -> ValidationError {
  ValidationError {
    entity,
    detail: format!(
      "{} missing or invalid in row {}",
      what,
      field_str(row, "id").unwrap_or_else(|| "<no id>".to_string())
    ),
  }
}

impl Employee {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let id = field_i64(row, "id").ok_or_else(|| missing("employee", row, "id"))?;
    let function = field_str(row, "function").filter(|f| !f.trim().is_empty());

    Ok(Self {
      id,
      firstname: field_str(row, "firstname").unwrap_or_default(),
      lastname: field_str(row, "lastname").unwrap_or_default(),
      function,
      active: field_bool(row, "active").unwrap_or(true),
    })
  }
}

const WEEKDAYS: [&str; 5] = ["monday", "tuesday", "wednesday", "thursday", "friday"];

impl Contract {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let id = field_i64(row, "id").ok_or_else(|| missing("contract", row, "id"))?;
    let employee_id =
      field_i64(row, "employee_id").ok_or_else(|| missing("contract", row, "employee_id"))?;
    let startdate =
      field_date(row, "startdate").ok_or_else(|| missing("contract", row, "startdate"))?;

    let mut hours_even = [0.0; 5];
    let mut hours_odd = [0.0; 5];
    for (i, day) in WEEKDAYS.iter().enumerate() {
      hours_even[i] = field_f64(row, &format!("hours_{}_even", day)).unwrap_or(0.0);
      hours_odd[i] = field_f64(row, &format!("hours_{}_odd", day)).unwrap_or(0.0);
    }

    Ok(Self {
      id,
      employee_id,
      hours_even,
      hours_odd,
      startdate,
      enddate: field_date(row, "enddate"),
    })
  }
}

impl TimeEntry {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let id = field_i64(row, "id").ok_or_else(|| missing("time entry", row, "id"))?;
    let employee_id =
      field_i64(row, "employee_id").ok_or_else(|| missing("time entry", row, "employee_id"))?;
    let date = field_date(row, "date").ok_or_else(|| missing("time entry", row, "date"))?;

    Ok(Self {
      id,
      employee_id,
      date,
      amount: field_f64(row, "amount").unwrap_or(0.0),
      status: field_str(row, "status").unwrap_or_default(),
    })
  }
}

impl AbsenceRequest {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let id = field_i64(row, "id").ok_or_else(|| missing("absence request", row, "id"))?;
    let employee_id = field_i64(row, "employee_id")
      .ok_or_else(|| missing("absence request", row, "employee_id"))?;

    let mut lines = Vec::new();
    if let Some(Value::Array(raw_lines)) = row.get("lines") {
      for raw in raw_lines {
        // A line without its own id or date is dropped silently with the
        // row kept; the request itself is still valid.
        let (Some(line_id), Some(date)) = (field_i64(raw, "id"), field_date(raw, "date")) else {
          continue;
        };
        lines.push(AbsenceLine {
          id: line_id,
          date,
          amount: field_f64(raw, "amount").unwrap_or(0.0),
          status_id: field_i64(raw, "status_id"),
          status_name: field_str(raw, "status_name"),
        });
      }
    }

    Ok(Self {
      id,
      employee_id,
      absencetype: field_str(row, "absencetype").unwrap_or_default(),
      lines,
    })
  }
}

impl Holiday {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let date = field_date(row, "date").ok_or_else(|| missing("holiday", row, "date"))?;

    Ok(Self {
      date,
      name: field_str(row, "name").unwrap_or_default(),
    })
  }
}

impl Project {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let id = field_i64(row, "id").ok_or_else(|| missing("project", row, "id"))?;

    Ok(Self {
      id,
      name: field_str(row, "name").unwrap_or_default(),
      active: field_bool(row, "active").unwrap_or(true),
    })
  }
}

impl Invoice {
  pub fn from_upstream(row: &Value) -> Result<Self, ValidationError> {
    let id = field_i64(row, "id").ok_or_else(|| missing("invoice", row, "id"))?;

    Ok(Self {
      id,
      number: field_str(row, "number").unwrap_or_default(),
      date: field_date(row, "date"),
      total: field_f64(row, "total").unwrap_or(0.0),
      paid: field_bool(row, "paid").unwrap_or(false),
    })
  }
}

// ============================================================================
// Record dispatch
// ============================================================================

/// A validated record of any entity kind, ready for the store.
#[derive(Debug, Clone)]
pub enum Record {
  Employee(Employee),
  Contract(Contract),
  TimeEntry(TimeEntry),
  AbsenceRequest(AbsenceRequest),
  Holiday(Holiday),
  Project(Project),
  Invoice(Invoice),
}

impl Record {
  /// Decode one upstream row for the given entity kind.
  pub fn decode(kind: EntityKind, row: &Value) -> Result<Self, ValidationError> {
    Ok(match kind {
      EntityKind::Employees => Self::Employee(Employee::from_upstream(row)?),
      EntityKind::Contracts => Self::Contract(Contract::from_upstream(row)?),
      EntityKind::TimeEntries => Self::TimeEntry(TimeEntry::from_upstream(row)?),
      EntityKind::AbsenceRequests => Self::AbsenceRequest(AbsenceRequest::from_upstream(row)?),
      EntityKind::Holidays => Self::Holiday(Holiday::from_upstream(row)?),
      EntityKind::Projects => Self::Project(Project::from_upstream(row)?),
      EntityKind::Invoices => Self::Invoice(Invoice::from_upstream(row)?),
    })
  }

  /// Employee id this record must reference, where the orphan invariant
  /// applies (time entries and absence requests).
  pub fn employee_ref(&self) -> Option<i64> {
    match self {
      Self::TimeEntry(t) => Some(t.employee_id),
      Self::AbsenceRequest(r) => Some(r.employee_id),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_status_resolves_dutch_and_english_spellings() {
    assert_eq!(
      AbsenceStatus::resolve(None, Some("GOEDGEKEURD")),
      AbsenceStatus::Approved
    );
    assert_eq!(
      AbsenceStatus::resolve(None, Some("Approved")),
      AbsenceStatus::Approved
    );
    assert_eq!(
      AbsenceStatus::resolve(None, Some("ingediend")),
      AbsenceStatus::Submitted
    );
    assert_eq!(
      AbsenceStatus::resolve(None, Some("afgekeurd")),
      AbsenceStatus::Rejected
    );
  }

  #[test]
  fn test_status_falls_back_to_numeric_id() {
    assert_eq!(AbsenceStatus::resolve(Some(2), None), AbsenceStatus::Approved);
    assert_eq!(
      AbsenceStatus::resolve(Some(1), Some("something else")),
      AbsenceStatus::Submitted
    );
    assert_eq!(AbsenceStatus::resolve(None, None), AbsenceStatus::Unknown);
  }

  #[test]
  fn test_name_wins_over_id_when_both_present() {
    // Some payloads carry a stale id next to the authoritative name.
    assert_eq!(
      AbsenceStatus::resolve(Some(1), Some("goedgekeurd")),
      AbsenceStatus::Approved
    );
  }

  #[test]
  fn test_employee_decodes_stringly_typed_row() {
    let row = json!({
      "id": "42",
      "firstname": "Piet",
      "lastname": "Jansen",
      "function": "",
      "active": "1"
    });

    let employee = Employee::from_upstream(&row).unwrap();
    assert_eq!(employee.id, 42);
    assert!(employee.active);
    // Empty function collapses to None so the protected field logic can
    // tell "never set" from "set to something".
    assert!(employee.function.is_none());
  }

  #[test]
  fn test_employee_without_id_is_a_validation_error() {
    let row = json!({"firstname": "Piet"});
    let err = Employee::from_upstream(&row).unwrap_err();
    assert_eq!(err.entity, "employee");
  }

  #[test]
  fn test_contract_decodes_parity_vectors() {
    let row = json!({
      "id": 7,
      "employee_id": 42,
      "startdate": "2023-01-01",
      "enddate": null,
      "hours_monday_even": 8, "hours_tuesday_even": 8, "hours_wednesday_even": "8",
      "hours_thursday_even": 8, "hours_friday_even": 4,
      "hours_monday_odd": 8, "hours_tuesday_odd": 8, "hours_wednesday_odd": 8,
      "hours_thursday_odd": 8, "hours_friday_odd": 0
    });

    let contract = Contract::from_upstream(&row).unwrap();
    assert_eq!(contract.hours_even.iter().sum::<f64>(), 36.0);
    assert_eq!(contract.hours_odd.iter().sum::<f64>(), 32.0);
    assert!(contract.enddate.is_none());
    assert!(contract.covers(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()));
  }

  #[test]
  fn test_contract_comma_decimal_amounts() {
    let row = json!({
      "id": 7,
      "employee_id": 42,
      "startdate": "2023-01-01",
      "hours_monday_even": "7,6"
    });

    let contract = Contract::from_upstream(&row).unwrap();
    assert_eq!(contract.hours_even[0], 7.6);
  }

  #[test]
  fn test_absence_request_skips_broken_lines() {
    let row = json!({
      "id": 1,
      "employee_id": 42,
      "absencetype": "verlof",
      "lines": [
        {"id": 10, "date": "2024-03-06", "amount": 4, "status_name": "goedgekeurd"},
        {"date": "2024-03-07", "amount": 8},
        {"id": 12, "date": "not-a-date", "amount": 8}
      ]
    });

    let request = AbsenceRequest::from_upstream(&row).unwrap();
    assert_eq!(request.lines.len(), 1);
    assert!(request.lines[0].status().is_approved());
  }

  #[test]
  fn test_datetime_suffix_is_tolerated() {
    let row = json!({"date": "2024-12-25 00:00:00", "name": "Kerstmis"});
    let holiday = Holiday::from_upstream(&row).unwrap();
    assert_eq!(holiday.date, NaiveDate::from_ymd_opt(2024, 12, 25).unwrap());
  }
}
