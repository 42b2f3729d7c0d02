use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// One configured analytical query, e.g. `public` or `egress_public`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryVariant {
    pub id: String,
    /// Human-readable title used in logs.
    pub title: String,
    /// Query text with positional `?` placeholders for year, month and day.
    pub query: String,
}

/// Opaque identifier returned by the query engine on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(pub String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Everything except `Running` ends polling.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete, header-separated query result.
///
/// Rows are index-aligned with `header` but may be shorter than it; a missing trailing cell
/// reads as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultSet {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// Splits raw engine rows into header (first row) and data rows.
    pub fn from_raw_rows(mut raw: Vec<Vec<String>>) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        let rows = raw.split_off(1);
        let header = raw.pop().unwrap_or_default();
        Self { header, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_header(&self) -> bool {
        !self.header.is_empty()
    }
}

/// A fetched variant: what ran, under which execution, and what came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantResult {
    pub variant: String,
    pub title: String,
    pub execution: ExecutionHandle,
    pub result: ResultSet,
}

/// The year/month/day triple passed to every query as positional parameters.
///
/// Values are kept as the exact strings sent to the engine, so a pinned `"2"` stays
/// unpadded while a derived date is zero-padded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDate {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl RunDate {
    pub fn new(year: impl Into<String>, month: impl Into<String>, day: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            month: month.into(),
            day: day.into(),
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: format!("{:04}", date.year()),
            month: format!("{:02}", date.month()),
            day: format!("{:02}", date.day()),
        }
    }

    pub fn today() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn parameters(&self) -> Vec<String> {
        vec![self.year.clone(), self.month.clone(), self.day.clone()]
    }

    /// `year-month-day` using the raw parameter strings.
    pub fn label(&self) -> String {
        format!("{}-{}-{}", self.year, self.month, self.day)
    }

    /// Midnight UTC of this date.
    pub fn start_of_day(&self) -> Result<DateTime<Utc>> {
        let parse = |name: &str, v: &str| -> Result<u32> {
            v.trim().parse::<u32>().map_err(|_| {
                Error::configuration(format!("run date {name} '{v}' is not a number"))
            })
        };
        let year = parse("year", &self.year)? as i32;
        let month = parse("month", &self.month)?;
        let day = parse("day", &self.day)?;
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            Error::configuration(format!("run date {} is not a calendar date", self.label()))
        })?;
        Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rows_splits_off_header() {
        let rs = ResultSet::from_raw_rows(vec![
            vec!["a".into(), "b".into()],
            vec!["1".into(), "2".into()],
        ]);
        assert_eq!(rs.header, vec!["a", "b"]);
        assert_eq!(rs.row_count(), 1);

        let header_only = ResultSet::from_raw_rows(vec![vec!["a".into()]]);
        assert!(header_only.has_header());
        assert_eq!(header_only.row_count(), 0);

        let empty = ResultSet::from_raw_rows(vec![]);
        assert!(!empty.has_header());
        assert_eq!(empty.row_count(), 0);
    }

    #[test]
    fn derived_dates_are_zero_padded_and_pinned_dates_are_verbatim() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert_eq!(RunDate::from_date(date).parameters(), vec!["2026", "02", "01"]);

        let pinned = RunDate::new("2026", "2", "1");
        assert_eq!(pinned.label(), "2026-2-1");
        assert_eq!(
            pinned.start_of_day().unwrap().to_rfc3339(),
            "2026-02-01T00:00:00+00:00"
        );
    }

    #[test]
    fn start_of_day_rejects_impossible_dates() {
        let err = RunDate::new("2026", "2", "30").start_of_day().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }
}
