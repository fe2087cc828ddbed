use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Offset, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns true if this clock is fixed.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Clock::Fixed(_))
    }
}

//
// ─── DAY BOUNDARY ──────────────────────────────────────────────────────────────
//

/// Maps instants onto calendar days using a fixed UTC offset.
///
/// Streak records are keyed by the day an instant falls on in this offset,
/// and the day starts at local midnight. DST rules are not followed, so every
/// day is exactly 24 hours and "yesterday" is always `day.pred_opt()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    /// Days start at midnight UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Days start at midnight in the host's current local offset.
    #[must_use]
    pub fn local() -> Self {
        Self {
            offset: *Local::now().offset(),
        }
    }

    #[must_use]
    pub fn from_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Builds a boundary from minutes east of UTC.
    ///
    /// Returns `None` when the offset is outside ±24h.
    #[must_use]
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::from_offset)
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar day the instant falls on.
    #[must_use]
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Today according to `clock`.
    #[must_use]
    pub fn today(&self, clock: &Clock) -> NaiveDate {
        self.day_of(clock.now())
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::local()
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::hours(3));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(3));
        assert!(clock.is_fixed());
    }

    #[test]
    fn utc_boundary_uses_the_utc_date() {
        let days = DayBoundary::utc();
        assert_eq!(days.day_of(fixed_now()), date(2023, 11, 14));
        assert_eq!(days.today(&fixed_clock()), date(2023, 11, 14));
    }

    #[test]
    fn positive_offset_rolls_into_next_day() {
        // 22:13Z is 01:13 on the 15th at UTC+3.
        let days = DayBoundary::from_offset_minutes(180).unwrap();
        assert_eq!(days.day_of(fixed_now()), date(2023, 11, 15));
        assert_eq!(
            days.day_of(fixed_now() - Duration::hours(2)),
            date(2023, 11, 14)
        );
    }

    #[test]
    fn negative_offset_day_starts_later_in_utc() {
        let days = DayBoundary::from_offset_minutes(-300).unwrap();
        assert_eq!(days.day_of(fixed_now()), date(2023, 11, 14));
        // Local midnight of the 15th is 05:00Z.
        assert_eq!(
            days.day_of(fixed_now() + Duration::hours(6)),
            date(2023, 11, 14)
        );
        assert_eq!(
            days.day_of(fixed_now() + Duration::hours(7)),
            date(2023, 11, 15)
        );
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        assert!(DayBoundary::from_offset_minutes(24 * 60).is_none());
        assert!(DayBoundary::from_offset_minutes(i32::MAX).is_none());
    }
}
