use chrono::{Datelike, Days, Months, NaiveDate, Utc};
use serde::Serialize;

use crate::error::AppError;

/// Length of the trailing window used for daily stats.
pub const DAILY_STATS_WINDOW: u64 = 7;

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Half-open day range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn day(day: NaiveDate) -> Self {
        Self::new(day, next_day(day))
    }

    /// Range covering both endpoints, as written by a client.
    pub fn inclusive(from: NaiveDate, to: NaiveDate) -> Result<Self, AppError> {
        if to < from {
            return Err(AppError::Validation(format!(
                "Range end {} is before start {}",
                to, from
            )));
        }
        Ok(Self::new(from, next_day(to)))
    }

    #[cfg(test)]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day < self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Today,
    ThisWeek,
    ThisMonth,
    Custom,
}

impl SummaryMode {
    /// Unknown or missing modes read as `Today`.
    pub fn parse(mode: Option<&str>) -> Self {
        match mode {
            Some("this_week") => SummaryMode::ThisWeek,
            Some("this_month") => SummaryMode::ThisMonth,
            Some("custom") => SummaryMode::Custom,
            _ => SummaryMode::Today,
        }
    }

    pub fn resolve(
        self,
        today: NaiveDate,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<DateRange, AppError> {
        match self {
            SummaryMode::Today => Ok(DateRange::day(today)),
            SummaryMode::ThisWeek => {
                let start = week_start(today);
                Ok(DateRange::new(start, add_days(start, 7)))
            }
            SummaryMode::ThisMonth => {
                let start = month_start(today);
                let end = start
                    .checked_add_months(Months::new(1))
                    .unwrap_or(NaiveDate::MAX);
                Ok(DateRange::new(start, end))
            }
            SummaryMode::Custom => match (from, to) {
                (Some(from), Some(to)) => DateRange::inclusive(from, to),
                _ => Err(AppError::Validation(
                    "Custom range requires both from and to".to_string(),
                )),
            },
        }
    }
}

/// Most recent Sunday on or before `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    let offset = day.weekday().num_days_from_sunday();
    day - Days::new(u64::from(offset))
}

pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

pub fn next_day(day: NaiveDate) -> NaiveDate {
    add_days(day, 1)
}

fn add_days(day: NaiveDate, days: u64) -> NaiveDate {
    day.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// The trailing daily-stats window ending at `last`, oldest first.
pub fn trailing_days(last: NaiveDate) -> Vec<NaiveDate> {
    (0..DAILY_STATS_WINDOW)
        .rev()
        .filter_map(|back| last.checked_sub_days(Days::new(back)))
        .collect()
}
