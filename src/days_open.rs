//! Descriptive statistics over case dates.
//!
//! [`days_open_stats`] measures how many days each notification stayed open
//! (closing date minus notification date) and summarises the distribution
//! for cases notified before or after a cutoff. [`month_histogram`] spreads
//! a date column over calendar months.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::{
    data::{month_of, parse_naive_date},
    dataset::Dataset,
    error::{Result, StatsError},
};

pub const DEFAULT_OPENED_COLUMN: &str = "DT_NOTIFIC";
pub const DEFAULT_CLOSED_COLUMN: &str = "DT_ENCERRA";

/// Which side of the cutoff to summarise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    /// Notified on or before the cutoff.
    #[default]
    Before,
    /// Notified strictly after the cutoff.
    After,
}

impl Period {
    fn includes(self, opened: NaiveDate, cutoff: NaiveDate) -> bool {
        match self {
            Period::Before => opened <= cutoff,
            Period::After => opened > cutoff,
        }
    }
}

impl FromStr for Period {
    type Err = StatsError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Period::Before),
            "after" => Ok(Period::After),
            other => Err(StatsError::InvalidArgument(format!(
                "invalid period '{other}', use 'before' or 'after'"
            ))),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Before => write!(f, "before"),
            Period::After => write!(f, "after"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateColumns {
    pub opened: String,
    pub closed: String,
}

impl Default for DateColumns {
    fn default() -> Self {
        Self {
            opened: DEFAULT_OPENED_COLUMN.to_string(),
            closed: DEFAULT_CLOSED_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DaysOpenSummary {
    pub total_records: usize,
    pub sum_of_days: i64,
    pub average_days: f64,
    pub std_dev: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub min: i64,
    pub max: i64,
}

impl DaysOpenSummary {
    /// Summarises a set of day counts. Empty input yields all zeros and a
    /// single value has zero spread.
    pub fn from_days(days: &[i64]) -> Self {
        if days.is_empty() {
            return Self::default();
        }
        let mut sorted = days.to_vec();
        sorted.sort_unstable();
        let count = sorted.len();
        let sum = sorted.iter().sum::<i64>();
        let mean = sum as f64 / count as f64;
        let std_dev = if count < 2 {
            0.0
        } else {
            let squares = sorted
                .iter()
                .map(|&d| (d as f64 - mean).powi(2))
                .sum::<f64>();
            (squares / (count as f64 - 1.0)).sqrt()
        };
        Self {
            total_records: count,
            sum_of_days: sum,
            average_days: mean,
            std_dev,
            median: quantile(&sorted, 0.5),
            q1: quantile(&sorted, 0.25),
            q3: quantile(&sorted, 0.75),
            min: sorted[0],
            max: sorted[count - 1],
        }
    }
}

/// Linear interpolation between the closest order statistics.
fn quantile(sorted: &[i64], p: f64) -> f64 {
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] as f64 + (sorted[upper] - sorted[lower]) as f64 * fraction
}

/// [`days_open_stats_with`] over `DT_NOTIFIC` / `DT_ENCERRA`.
pub fn days_open_stats(dataset: &Dataset, cutoff: &str, period: Period) -> Result<DaysOpenSummary> {
    days_open_stats_with(dataset, &DateColumns::default(), cutoff, period)
}

/// Summarises `closed - opened` in days for the rows on the requested side
/// of `cutoff`.
///
/// Rows sharing a row identity are counted once. Rows with a missing or
/// unparseable date, or closed before they were opened, are left out.
pub fn days_open_stats_with(
    dataset: &Dataset,
    columns: &DateColumns,
    cutoff: &str,
    period: Period,
) -> Result<DaysOpenSummary> {
    dataset.require_column(&columns.opened)?;
    dataset.require_column(&columns.closed)?;

    let deduped = dataset.deduplicated();
    let opened_values = deduped.require_column(&columns.opened)?.values();
    let closed_values = deduped.require_column(&columns.closed)?.values();

    let mut durations = Vec::with_capacity(deduped.row_count());
    let mut negative = 0usize;
    for (opened, closed) in opened_values.iter().zip(closed_values) {
        let (Some(opened), Some(closed)) = (
            opened.as_ref().and_then(|v| v.as_date()),
            closed.as_ref().and_then(|v| v.as_date()),
        ) else {
            continue;
        };
        let days = (closed - opened).num_days();
        if days < 0 {
            negative += 1;
            continue;
        }
        durations.push((opened, days));
    }
    if negative > 0 {
        debug!("Dropped {negative} case(s) closed before they were notified");
    }

    let cutoff = parse_naive_date(cutoff)?;
    let selected = durations
        .into_iter()
        .filter(|(opened, _)| period.includes(*opened, cutoff))
        .map(|(_, days)| days)
        .collect::<Vec<_>>();
    Ok(DaysOpenSummary::from_days(&selected))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MonthHistogram {
    /// Row counts for January through December.
    pub counts: [usize; 12],
    /// Cells that were missing or not a date.
    pub unparsed: usize,
}

impl MonthHistogram {
    /// Count for `month` in 1..=12.
    pub fn count(&self, month: u32) -> usize {
        match month {
            1..=12 => self.counts[month as usize - 1],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

pub fn month_histogram(dataset: &Dataset, column: &str) -> Result<MonthHistogram> {
    let mut histogram = MonthHistogram::default();
    for value in dataset.require_column(column)?.values() {
        match value.as_ref().and_then(month_of) {
            Some(month) => histogram.counts[month as usize - 1] += 1,
            None => histogram.unparsed += 1,
        }
    }
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;

    fn cases() -> Dataset {
        Dataset::from_columns(vec![
            Column::from_raw(
                "DT_NOTIFIC",
                ["2022-11-01", "2022-11-10", "2022-12-05", "2022-12-20", "2022-11-15", ""],
            ),
            Column::from_raw(
                "DT_ENCERRA",
                ["2022-11-03", "2022-11-20", "2022-12-06", "2023-01-19", "2022-11-01", "2022-12-01"],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn summarises_cases_before_cutoff() {
        let stats = days_open_stats(&cases(), "30/11/2022", Period::Before).unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.sum_of_days, 12);
        assert_eq!(stats.average_days, 6.0);
        assert_eq!(stats.min, 2);
        assert_eq!(stats.max, 10);
        assert_eq!(stats.median, 6.0);
        assert_eq!(stats.q1, 4.0);
        assert_eq!(stats.q3, 8.0);
        assert!((stats.std_dev - 32.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn summarises_cases_after_cutoff() {
        let stats = days_open_stats(&cases(), "2022-11-30", Period::After).unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.sum_of_days, 31);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 30);
    }

    #[test]
    fn empty_partition_is_all_zero() {
        let stats = days_open_stats(&cases(), "2000-01-01", Period::Before).unwrap();
        assert_eq!(stats, DaysOpenSummary::default());
        assert!(!stats.std_dev.is_nan());
    }

    #[test]
    fn duplicate_identities_count_once() {
        let ds = Dataset::with_index(
            vec![7, 7],
            vec![
                Column::from_raw("DT_NOTIFIC", ["2022-01-01", "2022-01-01"]),
                Column::from_raw("DT_ENCERRA", ["2022-01-04", "2022-01-04"]),
            ],
        )
        .unwrap();
        let stats = days_open_stats(&ds, "2022-12-31", Period::Before).unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn reports_input_errors() {
        let missing = Dataset::from_columns(vec![Column::from_raw("DT_NOTIFIC", ["2022-01-01"])])
            .unwrap();
        assert_eq!(
            days_open_stats(&missing, "2022-01-01", Period::Before).unwrap_err(),
            StatsError::MissingColumn("DT_ENCERRA".into())
        );
        assert!(matches!(
            days_open_stats(&cases(), "not a date", Period::Before),
            Err(StatsError::InvalidDate(_))
        ));
        assert!(matches!(
            "during".parse::<Period>(),
            Err(StatsError::InvalidArgument(_))
        ));
        assert_eq!("AFTER".parse::<Period>().unwrap(), Period::After);
    }

    #[test]
    fn custom_columns_are_supported() {
        let ds = Dataset::from_columns(vec![
            Column::from_raw("DT_SIN_PRI", ["2022-03-01"]),
            Column::from_raw("DT_OBITO", ["2022-03-11"]),
        ])
        .unwrap();
        let columns = DateColumns {
            opened: "DT_SIN_PRI".into(),
            closed: "DT_OBITO".into(),
        };
        let stats = days_open_stats_with(&ds, &columns, "2022-12-31", Period::Before).unwrap();
        assert_eq!(stats.sum_of_days, 10);
    }

    #[test]
    fn month_histogram_counts_months() {
        let histogram = month_histogram(&cases(), "DT_NOTIFIC").unwrap();
        assert_eq!(histogram.count(11), 3);
        assert_eq!(histogram.count(12), 2);
        assert_eq!(histogram.unparsed, 1);
        assert_eq!(histogram.total(), 5);
        assert_eq!(histogram.count(13), 0);
    }
}
