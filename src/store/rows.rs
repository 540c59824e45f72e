//! Row-to-record mapping helpers shared by the read and write paths.

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::Row;

use crate::records::{AbsenceLine, Contract, Employee, Holiday, Invoice, Project, TimeEntry};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render a date for storage.
pub fn date_to_sql(date: NaiveDate) -> String {
  date.format(DATE_FORMAT).to_string()
}

/// Parse a stored date, surfacing malformed values as conversion errors
/// rather than panics.
pub fn date_from_sql(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
  })
}

pub fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
  Ok(Employee {
    id: row.get(0)?,
    firstname: row.get(1)?,
    lastname: row.get(2)?,
    function: row.get(3)?,
    active: row.get::<_, i64>(4)? != 0,
  })
}

pub fn contract_from_row(row: &Row<'_>) -> rusqlite::Result<Contract> {
  let startdate: String = row.get(12)?;
  let enddate: Option<String> = row.get(13)?;

  Ok(Contract {
    id: row.get(0)?,
    employee_id: row.get(1)?,
    hours_even: [
      row.get(2)?,
      row.get(3)?,
      row.get(4)?,
      row.get(5)?,
      row.get(6)?,
    ],
    hours_odd: [
      row.get(7)?,
      row.get(8)?,
      row.get(9)?,
      row.get(10)?,
      row.get(11)?,
    ],
    startdate: date_from_sql(12, &startdate)?,
    enddate: match enddate {
      Some(s) => Some(date_from_sql(13, &s)?),
      None => None,
    },
  })
}

pub fn time_entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimeEntry> {
  let date: String = row.get(2)?;
  Ok(TimeEntry {
    id: row.get(0)?,
    employee_id: row.get(1)?,
    date: date_from_sql(2, &date)?,
    amount: row.get(3)?,
    status: row.get(4)?,
  })
}

pub fn absence_line_from_row(row: &Row<'_>) -> rusqlite::Result<AbsenceLine> {
  let date: String = row.get(1)?;
  Ok(AbsenceLine {
    id: row.get(0)?,
    date: date_from_sql(1, &date)?,
    amount: row.get(2)?,
    status_id: row.get(3)?,
    status_name: row.get(4)?,
  })
}

pub fn holiday_from_row(row: &Row<'_>) -> rusqlite::Result<Holiday> {
  let date: String = row.get(0)?;
  Ok(Holiday {
    date: date_from_sql(0, &date)?,
    name: row.get(1)?,
  })
}

pub fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
  Ok(Project {
    id: row.get(0)?,
    name: row.get(1)?,
    active: row.get::<_, i64>(2)? != 0,
  })
}

pub fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
  let date: Option<String> = row.get(2)?;
  Ok(Invoice {
    id: row.get(0)?,
    number: row.get(1)?,
    date: match date {
      Some(s) => Some(date_from_sql(2, &s)?),
      None => None,
    },
    total: row.get(3)?,
    paid: row.get::<_, i64>(4)? != 0,
  })
}
