//! Wall-clock abstraction.
//!
//! The cycle date, the same-day guard boundary and the weekly-day decision
//! all derive from `Clock::now()`, so tests can pin them.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use chrono::Datelike;
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn weekday(&self) -> Weekday {
        self.now().weekday()
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Midnight UTC at the start of `date`; the same-day guard boundary.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_reports_date_and_weekday() {
        // 2025-03-03 is a Monday.
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 7, 30, 0).unwrap());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(clock.weekday(), Weekday::Mon);

        clock.advance(Duration::days(1));
        assert_eq!(clock.weekday(), Weekday::Tue);
    }

    #[test]
    fn start_of_day_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        assert_eq!(start_of_day(date), Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap());
    }
}
