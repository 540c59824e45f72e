//! Reporting periods: an ISO week or a calendar month.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use color_eyre::{eyre::eyre, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
  /// ISO-8601 week of a year.
  Week { year: i32, week: u32 },
  /// Calendar month of a year.
  Month { year: i32, month: u32 },
}

impl Period {
  /// Inclusive date range covered by the period. Week periods run Monday
  /// through Sunday of the ISO week.
  pub fn date_range(&self) -> Result<(NaiveDate, NaiveDate)> {
    match *self {
      Self::Week { year, week } => {
        let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
          .ok_or_else(|| eyre!("Invalid ISO week {}-W{}", year, week))?;
        Ok((monday, monday + Duration::days(6)))
      }
      Self::Month { year, month } => {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
          .ok_or_else(|| eyre!("Invalid month {}-{}", year, month))?;
        let next_month = if month == 12 {
          NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
          NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| eyre!("Invalid month {}-{}", year, month))?;
        Ok((first, next_month - Duration::days(1)))
      }
    }
  }

  /// Stable fragment for cache keys.
  pub fn cache_key(&self) -> String {
    match *self {
      Self::Week { year, week } => format!("week:{}-{:02}", year, week),
      Self::Month { year, month } => format!("month:{}-{:02}", year, month),
    }
  }

  /// Parse "2024-10" style CLI input as a week period.
  pub fn parse_week(s: &str) -> Result<Self> {
    let (year, week) = split_pair(s)?;
    if !(1..=53).contains(&week) {
      return Err(eyre!("Week out of range: {}", s));
    }
    Ok(Self::Week { year, week })
  }

  /// Parse "2024-03" style CLI input as a month period.
  pub fn parse_month(s: &str) -> Result<Self> {
    let (year, month) = split_pair(s)?;
    if !(1..=12).contains(&month) {
      return Err(eyre!("Month out of range: {}", s));
    }
    Ok(Self::Month { year, month })
  }
}

fn split_pair(s: &str) -> Result<(i32, u32)> {
  let (year, rest) = s
    .split_once('-')
    .ok_or_else(|| eyre!("Expected YYYY-NN, got {}", s))?;
  let rest = rest.trim_start_matches(['W', 'w']);
  Ok((
    year.parse().map_err(|_| eyre!("Invalid year in {}", s))?,
    rest.parse().map_err(|_| eyre!("Invalid number in {}", s))?,
  ))
}

/// Whether a date falls in an even ISO week.
pub fn is_even_week(date: NaiveDate) -> bool {
  date.iso_week().week() % 2 == 0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_week_range_is_monday_through_sunday() {
    let period = Period::Week {
      year: 2024,
      week: 10,
    };
    let (from, to) = period.date_range().unwrap();
    assert_eq!(from, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert_eq!(to, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    assert_eq!(from.weekday(), Weekday::Mon);
  }

  #[test]
  fn test_month_range_covers_whole_month() {
    let period = Period::Month {
      year: 2024,
      month: 2,
    };
    let (from, to) = period.date_range().unwrap();
    assert_eq!(from, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    // 2024 is a leap year.
    assert_eq!(to, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
  }

  #[test]
  fn test_december_range_does_not_overflow_year() {
    let period = Period::Month {
      year: 2024,
      month: 12,
    };
    let (_, to) = period.date_range().unwrap();
    assert_eq!(to, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
  }

  #[test]
  fn test_parse_accepts_week_prefix() {
    assert_eq!(
      Period::parse_week("2024-W10").unwrap(),
      Period::Week {
        year: 2024,
        week: 10
      }
    );
    assert_eq!(
      Period::parse_week("2024-10").unwrap(),
      Period::Week {
        year: 2024,
        week: 10
      }
    );
    assert!(Period::parse_week("2024-54").is_err());
    assert!(Period::parse_month("2024-13").is_err());
  }

  #[test]
  fn test_week_parity() {
    // 2024-03-04 is in ISO week 10.
    assert!(is_even_week(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()));
    // 2024-03-11 is in ISO week 11.
    assert!(!is_even_week(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()));
  }
}
