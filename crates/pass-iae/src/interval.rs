//! Date range arithmetic shared by approvals, suspensions, prolongations and diagnoses.
//!
//! A [`DateInterval`] is half-open: `start` is included, `end` is excluded. Ranges whose
//! last day is inclusive (suspensions, approval windows) are built with
//! [`DateInterval::from_inclusive`] so every overlap and shift goes through one type.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    start: NaiveDate,
    end: Option<NaiveDate>,
}

impl DateInterval {
    /// Bounded interval `[start, end)`. Rejects empty or inverted ranges.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, IntervalError> {
        if end <= start {
            return Err(IntervalError::Empty { start, end });
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// Open-ended interval starting on `start`.
    pub const fn open(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    /// Interval covering `start..=last_day`.
    pub fn from_inclusive(start: NaiveDate, last_day: NaiveDate) -> Result<Self, IntervalError> {
        if last_day < start {
            return Err(IntervalError::Empty {
                start,
                end: last_day,
            });
        }
        let end = shift_date(last_day, 1)?;
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive upper bound, `None` when open-ended.
    pub const fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.map_or(true, |end| date < end)
    }

    pub fn overlaps(&self, other: &DateInterval) -> bool {
        let self_before_other = self.end.map_or(false, |end| end <= other.start);
        let other_before_self = other.end.map_or(false, |end| end <= self.start);
        !self_before_other && !other_before_self
    }

    /// Number of days between `start` and `end`, `None` when open-ended.
    pub fn duration_days(&self) -> Option<i64> {
        self.end.map(|end| (end - self.start).num_days())
    }

    /// Same interval moved by `delta_days` (negative moves it earlier).
    pub fn shifted(&self, delta_days: i64) -> Result<Self, IntervalError> {
        let start = shift_date(self.start, delta_days)?;
        let end = self
            .end
            .map(|end| shift_date(end, delta_days))
            .transpose()?;
        Ok(Self { start, end })
    }
}

/// Moves `date` by a signed number of days.
pub fn shift_date(date: NaiveDate, delta_days: i64) -> Result<NaiveDate, IntervalError> {
    let magnitude = Days::new(delta_days.unsigned_abs());
    let shifted = if delta_days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.ok_or(IntervalError::OutOfRange { date, delta_days })
}

/// Adds calendar months, clamping to the end of shorter months.
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate, IntervalError> {
    date.checked_add_months(Months::new(months))
        .ok_or(IntervalError::MonthsOutOfRange { date, months })
}

/// Signed day count from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntervalError {
    #[error("interval ending {end} does not end after its start {start}")]
    Empty { start: NaiveDate, end: NaiveDate },
    #[error("shifting {date} by {delta_days} days leaves the supported calendar")]
    OutOfRange { date: NaiveDate, delta_days: i64 },
    #[error("adding {months} months to {date} leaves the supported calendar")]
    MonthsOutOfRange { date: NaiveDate, months: u32 },
}

impl IntervalError {
    pub const fn code(&self) -> &'static str {
        match self {
            IntervalError::Empty { .. } => "interval_empty",
            IntervalError::OutOfRange { .. } | IntervalError::MonthsOutOfRange { .. } => {
                "interval_out_of_range"
            }
        }
    }
}
