use std::sync::RwLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Source of "now" for validity checks and batch thresholds.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock used by the batch commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock that can be moved explicitly.
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    /// Clock frozen at noon UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
        Self::new(date.and_time(noon).and_utc())
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        match self.instant.write() {
            Ok(mut guard) => *guard = instant,
            Err(poisoned) => *poisoned.into_inner() = instant,
        }
    }

    pub fn set_date(&self, date: NaiveDate) {
        let time = self.now().time();
        self.set(date.and_time(time).and_utc());
    }

    pub fn advance_days(&self, days: i64) {
        self.set(self.now() + Duration::days(days));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
