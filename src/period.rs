//! Period arithmetic and period-over-period deltas.
//!
//! Every comparison in the service contrasts an inclusive date window with
//! the window of identical length that ends the day before it starts. This
//! module owns that arithmetic, the calendar-month defaults used by the
//! widgets, and the percentage helpers shared by all insights.
//!
//! Percentages are rounded to 2 decimal places, half away from zero.

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::error::AppError;

// ---

/// Inclusive calendar-date window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    // ---
    /// Build a window, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::InvalidInput(format!(
                "start_date {start} must not be after end_date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days`-long window ending on `end` (inclusive). `days` of zero is
    /// treated as one.
    pub fn trailing(end: NaiveDate, days: u32) -> Result<Self, AppError> {
        let span = u64::from(days.max(1) - 1);
        Ok(Self {
            start: days_before(end, span)?,
            end,
        })
    }

    /// Number of days covered, both ends included.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Window of the same length ending the day before `self.start`.
    pub fn previous(&self) -> Result<Self, AppError> {
        let prev_end = days_before(self.start, 1)?;
        let span = u64::try_from(self.len_days() - 1).unwrap_or(0);
        Ok(Self {
            start: days_before(prev_end, span)?,
            end: prev_end,
        })
    }

    /// Default window for widgets that take optional bounds: `end` falls back
    /// to `today`, `start` to the first day of `end`'s month.
    pub fn month_to_date(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self, AppError> {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or_else(|| first_of_month(end));
        Self::new(start, end)
    }

    /// Default window for the revenue overview: missing bounds fall back to
    /// the current calendar month. An end that lands before the start
    /// collapses to `today`.
    pub fn calendar_month(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self, AppError> {
        let start = start.unwrap_or_else(|| first_of_month(today));
        let mut end = end.unwrap_or_else(|| last_of_month(today));
        if end < start {
            end = today;
        }
        Self::new(start, end)
    }
}

/// `date` minus `days`, or `InvalidInput` past the supported calendar.
fn days_before(date: NaiveDate, days: u64) -> Result<NaiveDate, AppError> {
    date.checked_sub_days(Days::new(days)).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "date range starting {date} reaches outside the supported calendar"
        ))
    })
}

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// Last day of the month containing `date`.
///
/// Steps 31 days past the first of the month, which always lands in the
/// next month, then backs up one day from that month's first day.
pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    let rolled = first_of_month(date) + Days::new(31);
    first_of_month(rolled) - Days::new(1)
}

/// Round to 2 decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate delta. No baseline reads as "no change" (0.0).
pub fn change_pct(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    round2((current - previous) / previous * 100.0)
}

/// Item-level delta. No baseline reads as "incomparable" (`None`).
pub fn item_change_pct(current: f64, previous: Option<f64>) -> Option<f64> {
    match previous {
        Some(prev) if prev != 0.0 => Some(round2((current - prev) / prev * 100.0)),
        _ => None,
    }
}

/// `part` as a rounded percentage of `whole`; 0.0 when `whole` is not positive.
pub fn share_pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        round2(part / whole * 100.0)
    } else {
        0.0
    }
}
