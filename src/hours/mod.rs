//! Hours accounting engine.
//!
//! Derives per-employee time-accounting metrics for a week or month from
//! the mirrored tables: contract hours from the weekday/parity vectors,
//! expected hours net of public holidays, approved leave, and written time.

pub mod period;

pub use period::Period;

use chrono::{Datelike, NaiveDate};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::HoursConfig;
use crate::records::{Contract, Employee};
use crate::store::Database;

use period::is_even_week;

/// Computed metrics for one employee over one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoursSummary {
  /// Gross contract hours over the period, accumulated per weekday.
  pub contract_hours: f64,
  /// Contract hours falling on public holidays.
  pub holiday_hours: f64,
  /// `contract_hours - holiday_hours`.
  pub expected_hours: f64,
  /// Approved absence hours in the period.
  pub leave_hours: f64,
  /// Written time entries in the period.
  pub written_hours: f64,
  /// Written hours, plus leave when `count_leave_as_actual` is set.
  pub actual_hours: f64,
  /// `round(actual / expected * 100)`, 0 when nothing was expected. Not
  /// capped; purely for display and sorting.
  pub percentage: i64,
}

/// A summary paired with its employee, as served to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeHours {
  pub employee: Employee,
  pub summary: HoursSummary,
}

pub struct HoursEngine {
  db: Arc<Database>,
  cache: TtlCache,
  count_leave_as_actual: bool,
}

impl HoursEngine {
  pub fn new(db: Arc<Database>, cache: TtlCache, config: &HoursConfig) -> Self {
    Self {
      db,
      cache,
      count_leave_as_actual: config.count_leave_as_actual,
    }
  }

  /// Compute metrics for one employee over a period, straight from the
  /// store.
  pub fn compute_for_period(&self, employee_id: i64, period: Period) -> Result<HoursSummary> {
    let (from, to) = period.date_range()?;

    let contracts = self.db.contracts_for(employee_id)?;
    let holidays: HashSet<NaiveDate> = self
      .db
      .holidays_between(from, to)?
      .into_iter()
      .map(|h| h.date)
      .collect();

    // Accumulate per day: week parity can flip inside a month, so a single
    // weekly figure multiplied out would be wrong.
    let mut contract_hours = 0.0;
    let mut holiday_hours = 0.0;
    let mut date = from;
    while date <= to {
      let weekday = date.weekday().num_days_from_monday() as usize;
      // Weekends contribute zero.
      if weekday < 5 {
        if let Some(contract) = active_contract(&contracts, date) {
          let value = contract.hours_for(weekday, is_even_week(date));
          contract_hours += value;
          if holidays.contains(&date) {
            holiday_hours += value;
          }
        }
      }
      match date.succ_opt() {
        Some(next) => date = next,
        None => break,
      }
    }

    let expected_hours = contract_hours - holiday_hours;

    let leave_hours: f64 = self
      .db
      .absence_lines_between(employee_id, from, to)?
      .iter()
      .filter(|line| line.status().is_approved())
      .map(|line| line.amount)
      .sum();

    let written_hours: f64 = self
      .db
      .time_entries_between(employee_id, from, to)?
      .iter()
      .map(|entry| entry.amount)
      .sum();

    let actual_hours = if self.count_leave_as_actual {
      written_hours + leave_hours
    } else {
      written_hours
    };

    let percentage = if expected_hours > 0.0 {
      (actual_hours / expected_hours * 100.0).round() as i64
    } else {
      0
    };

    Ok(HoursSummary {
      contract_hours,
      holiday_hours,
      expected_hours,
      leave_hours,
      written_hours,
      actual_hours,
      percentage,
    })
  }

  /// Compute metrics for every employee, served through the cache.
  ///
  /// Returns the summaries and whether they came from the degraded global
  /// fallback. `bypass_cache` forces a recompute.
  pub fn report(&self, period: Period, bypass_cache: bool) -> Result<(Vec<EmployeeHours>, bool)> {
    let key = format!("hours:{}", period.cache_key());

    if !bypass_cache {
      if let Some(hit) = self.cache.get(&key) {
        if let Ok(cached) = serde_json::from_value::<Vec<EmployeeHours>>(hit.payload) {
          debug!(key, stale = hit.stale, "hours report served from cache");
          return Ok((cached, hit.stale));
        }
      }
    }

    let mut report = Vec::new();
    for employee in self.db.list_employees()? {
      let summary = self.compute_for_period(employee.id, period)?;
      report.push(EmployeeHours { employee, summary });
    }

    if let Ok(payload) = serde_json::to_value(&report) {
      self.cache.set(&key, payload, None);
    }

    Ok((report, false))
  }
}

/// The contract in force on a date. With overlapping contracts the one
/// with the latest still-valid end date wins; an open-ended contract beats
/// any dated one.
fn active_contract(contracts: &[Contract], date: NaiveDate) -> Option<&Contract> {
  contracts
    .iter()
    .filter(|c| c.covers(date))
    .max_by_key(|c| match c.enddate {
      None => (1, NaiveDate::MAX),
      Some(end) => (0, end),
    })
}
