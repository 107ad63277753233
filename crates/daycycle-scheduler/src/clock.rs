//! Campaign clock: timezone-aware "now" plus local-time arithmetic.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use daycycle_core::DayTime;
use std::sync::Mutex;

/// Source of the current campaign-local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    /// Campaign-local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock in the campaign timezone.
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// Manually driven clock for tests and simulations.
pub struct ManualClock {
    now: Mutex<DateTime<Tz>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock at a local date and time in `tz`.
    pub fn at(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Self {
        let naive = date
            .and_hms_opt(hour, minute, 0)
            .unwrap_or_else(|| date.and_time(NaiveTime::MIN));
        let now = tz
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive));
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Tz>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// The instant a local wall-clock time occurs on `date` in `tz`.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant;
/// non-existent times (clocks going forward) are pushed forward by the gap.
pub fn local_moment(tz: Tz, date: NaiveDate, time: DayTime) -> DateTime<Tz> {
    let naive = date.and_time(time.to_naive());
    if let Some(moment) = tz.from_local_datetime(&naive).earliest() {
        return moment;
    }
    // Inside a DST gap: walk forward minute by minute until the time exists.
    let mut candidate = naive;
    for _ in 0..(3 * 60) {
        candidate += Duration::minutes(1);
        if let Some(moment) = tz.from_local_datetime(&candidate).earliest() {
            return moment;
        }
    }
    tz.from_utc_datetime(&naive)
}

/// Next occurrence of `time` strictly after `now` (today if still ahead, else tomorrow).
pub fn next_daily_occurrence(now: DateTime<Tz>, time: DayTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    let candidate = local_moment(tz, today, time);
    if now >= candidate {
        let tomorrow = today.succ_opt().unwrap_or(today);
        local_moment(tz, tomorrow, time)
    } else {
        candidate
    }
}

/// Delay until `target`, clamped at zero.
pub fn delay_until(now: DateTime<Tz>, target: DateTime<Tz>) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::Moscow;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_local_moment_in_timezone() {
        let t = local_moment(Moscow, date(2024, 1, 6), "09:30".parse().unwrap());
        assert_eq!(t.hour(), 9);
        assert_eq!(t.minute(), 30);
        // Moscow is UTC+3 all year.
        assert_eq!(t.with_timezone(&Utc).hour(), 6);
    }

    #[test]
    fn test_local_moment_skips_dst_gap() {
        // 2024-03-31 02:30 does not exist in Berlin.
        let berlin = chrono_tz::Europe::Berlin;
        let t = local_moment(berlin, date(2024, 3, 31), "02:30".parse().unwrap());
        assert_eq!(t.date_naive(), date(2024, 3, 31));
        assert_eq!(t.hour(), 3);
    }

    #[test]
    fn test_next_daily_occurrence() {
        let sweep: DayTime = "00:01".parse().unwrap();
        let before = local_moment(Moscow, date(2024, 1, 5), "00:00".parse().unwrap());
        assert_eq!(next_daily_occurrence(before, sweep).date_naive(), date(2024, 1, 5));

        let exactly = local_moment(Moscow, date(2024, 1, 5), sweep);
        assert_eq!(next_daily_occurrence(exactly, sweep).date_naive(), date(2024, 1, 6));

        let evening = local_moment(Moscow, date(2024, 1, 5), "22:15".parse().unwrap());
        let next = next_daily_occurrence(evening, sweep);
        assert_eq!(next.date_naive(), date(2024, 1, 6));
        assert_eq!((next.hour(), next.minute()), (0, 1));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at(Moscow, date(2024, 1, 5), 23, 59);
        assert_eq!(clock.today(), date(2024, 1, 5));
        clock.advance(Duration::minutes(2));
        assert_eq!(clock.today(), date(2024, 1, 6));
    }

    #[test]
    fn test_delay_never_negative() {
        let now = local_moment(Moscow, date(2024, 1, 5), "12:00".parse().unwrap());
        assert_eq!(delay_until(now, now - Duration::hours(1)), std::time::Duration::ZERO);
        assert_eq!(delay_until(now, now + Duration::seconds(90)).as_secs(), 90);
    }
}
