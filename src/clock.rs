use std::time::Duration;

use chrono::{DateTime, Utc};

/// Abstraction over "current time" so exposure timestamps are deterministic
/// in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// `now() + after`, saturating at the far end of chrono's range.
    fn after(&self, after: Duration) -> DateTime<Utc> {
        let now = self.now();
        chrono::Duration::from_std(after)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn fixed_clock_after_adds_duration() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(
            clock.after(Duration::from_secs(45)),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 45).unwrap()
        );
    }

    #[test]
    fn after_saturates() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(clock.after(Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
