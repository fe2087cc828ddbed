use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::UserId;

/// Accumulated watch time (seconds) a day needs to count towards a streak.
pub const DAILY_GOAL_SECS: u64 = 600;

/// Number of days covered by [`weekly_activity`].
pub const WEEK_DAYS: u64 = 7;

/// Ceiling of a day's accumulated watch time; totals saturate here.
pub const MAX_WATCH_TIME_SECS: u64 = i64::MAX.unsigned_abs();

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreakError {
    #[error("valid watch time is required, got {0}")]
    InvalidWatchTime(i64),

    #[error("day {0} has no predecessor")]
    DayOutOfRange(NaiveDate),
}

/// Elapsed playback of a single watch session, always > 0 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WatchSession(u64);

impl WatchSession {
    /// # Errors
    ///
    /// Returns `StreakError::InvalidWatchTime` for zero or negative values.
    pub fn new(seconds: i64) -> Result<Self, StreakError> {
        match u64::try_from(seconds) {
            Ok(secs) if secs > 0 => Ok(Self(secs)),
            _ => Err(StreakError::InvalidWatchTime(seconds)),
        }
    }

    #[must_use]
    pub fn seconds(self) -> u64 {
        self.0
    }
}

/// The calendar day before `day`.
///
/// # Errors
///
/// Returns `StreakError::DayOutOfRange` for `NaiveDate::MIN`.
pub fn previous_day(day: NaiveDate) -> Result<NaiveDate, StreakError> {
    day.pred_opt().ok_or(StreakError::DayOutOfRange(day))
}

//
// ─── STREAK RECORD ─────────────────────────────────────────────────────────────
//

/// Aggregate watch time of one user on one calendar day.
///
/// `streak_count` is fixed when the day's record is opened, from whether the
/// previous day met the goal. Accumulating more time later the same day does
/// not revisit it; only [`StreakRecord::correct_streak`] may, and only while
/// the count is exactly zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    user_id: UserId,
    day: NaiveDate,
    total_watch_time_seconds: u64,
    streak_count: u32,
    last_active_at: DateTime<Utc>,
}

impl StreakRecord {
    /// First session of `day`.
    #[must_use]
    pub fn open(
        user_id: UserId,
        day: NaiveDate,
        session: WatchSession,
        yesterday: Option<&StreakRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            day,
            total_watch_time_seconds: session.seconds(),
            streak_count: next_streak_count(yesterday),
            last_active_at: now,
        }
    }

    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        day: NaiveDate,
        total_watch_time_seconds: u64,
        streak_count: u32,
        last_active_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            day,
            total_watch_time_seconds,
            streak_count,
            last_active_at,
        }
    }

    /// Add a later session of the same day. `streak_count` is untouched.
    ///
    /// The total saturates at [`MAX_WATCH_TIME_SECS`].
    pub fn accumulate(&mut self, session: WatchSession, now: DateTime<Utc>) {
        self.total_watch_time_seconds = self
            .total_watch_time_seconds
            .saturating_add(session.seconds())
            .min(MAX_WATCH_TIME_SECS);
        self.last_active_at = now;
    }

    /// The goal is met but no streak has been assigned yet.
    #[must_use]
    pub fn needs_streak_correction(&self) -> bool {
        self.met_daily_goal() && self.streak_count == 0
    }

    /// Re-derive a zero `streak_count` once the goal is met.
    ///
    /// Returns `true` if the count changed.
    pub fn correct_streak(&mut self, yesterday: Option<&StreakRecord>) -> bool {
        if !self.needs_streak_correction() {
            return false;
        }
        self.streak_count = next_streak_count(yesterday);
        true
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    #[must_use]
    pub fn total_watch_time_seconds(&self) -> u64 {
        self.total_watch_time_seconds
    }

    #[must_use]
    pub fn streak_count(&self) -> u32 {
        self.streak_count
    }

    #[must_use]
    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    #[must_use]
    pub fn met_daily_goal(&self) -> bool {
        self.total_watch_time_seconds >= DAILY_GOAL_SECS
    }
}

/// Streak a newly opened day starts with.
#[must_use]
pub fn next_streak_count(yesterday: Option<&StreakRecord>) -> u32 {
    match yesterday {
        Some(prev) if prev.met_daily_goal() => prev.streak_count.saturating_add(1),
        _ => 1,
    }
}

/// Streak as seen right now.
///
/// A streak that met the goal yesterday is still alive today until the day
/// ends, even if today's goal has not been reached yet.
#[must_use]
pub fn current_streak(today: Option<&StreakRecord>, yesterday: Option<&StreakRecord>) -> u32 {
    if let Some(rec) = today.filter(|r| r.met_daily_goal()) {
        return rec.streak_count;
    }
    if let Some(rec) = yesterday.filter(|r| r.met_daily_goal()) {
        return rec.streak_count;
    }
    0
}

//
// ─── WEEKLY ACTIVITY ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub watch_time_seconds: u64,
    pub met_daily_goal: bool,
}

impl DailyActivity {
    fn idle(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: date.weekday(),
            watch_time_seconds: 0,
            met_daily_goal: false,
        }
    }
}

/// First day of the seven-day window ending on `reference`.
///
/// # Errors
///
/// Returns `StreakError::DayOutOfRange` near `NaiveDate::MIN`.
pub fn week_start(reference: NaiveDate) -> Result<NaiveDate, StreakError> {
    reference
        .checked_sub_days(Days::new(WEEK_DAYS - 1))
        .ok_or(StreakError::DayOutOfRange(reference))
}

/// Seven entries, `reference - 6` through `reference`, oldest first.
///
/// Days without a record report zero watch time. Records outside the window
/// are ignored.
///
/// # Errors
///
/// Returns `StreakError::DayOutOfRange` near `NaiveDate::MIN`.
pub fn weekly_activity(
    reference: NaiveDate,
    records: &[StreakRecord],
) -> Result<Vec<DailyActivity>, StreakError> {
    let start = week_start(reference)?;
    Ok(start
        .iter_days()
        .take_while(|d| *d <= reference)
        .map(|date| {
            records
                .iter()
                .find(|r| r.day == date)
                .map_or_else(
                    || DailyActivity::idle(date),
                    |r| DailyActivity {
                        date,
                        weekday: date.weekday(),
                        watch_time_seconds: r.total_watch_time_seconds,
                        met_daily_goal: r.met_daily_goal(),
                    },
                )
        })
        .collect())
}

/// Headline numbers for a streak dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStats {
    pub current_streak: u32,
    pub best_streak: u32,
    pub today_watch_time_seconds: u64,
    pub week_watch_time_seconds: u64,
    pub met_daily_goal: bool,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 11, d).unwrap()
    }

    fn session(secs: i64) -> WatchSession {
        WatchSession::new(secs).unwrap()
    }

    fn record(d: u32, total: u64, count: u32) -> StreakRecord {
        StreakRecord::from_persisted(UserId::new(1), day(d), total, count, fixed_now())
    }

    #[test]
    fn watch_session_must_be_positive() {
        assert_eq!(
            WatchSession::new(0).unwrap_err(),
            StreakError::InvalidWatchTime(0)
        );
        assert!(WatchSession::new(-5).is_err());
        assert_eq!(session(1).seconds(), 1);
    }

    #[test]
    fn goal_is_inclusive_threshold() {
        assert!(!record(14, 599, 1).met_daily_goal());
        assert!(record(14, 600, 1).met_daily_goal());
    }

    #[test]
    fn open_continues_from_goal_meeting_yesterday() {
        let yesterday = record(13, 900, 5);
        let today = StreakRecord::open(
            UserId::new(1),
            day(14),
            session(30),
            Some(&yesterday),
            fixed_now(),
        );
        assert_eq!(today.streak_count(), 6);
        assert_eq!(today.total_watch_time_seconds(), 30);
    }

    #[test]
    fn open_restarts_without_qualifying_yesterday() {
        let missed = record(13, 100, 5);
        let a = StreakRecord::open(UserId::new(1), day(14), session(30), Some(&missed), fixed_now());
        let b = StreakRecord::open(UserId::new(1), day(14), session(30), None, fixed_now());
        assert_eq!(a.streak_count(), 1);
        assert_eq!(b.streak_count(), 1);
    }

    #[test]
    fn accumulate_does_not_touch_streak_count() {
        let mut today = StreakRecord::open(UserId::new(1), day(14), session(300), None, fixed_now());
        today.accumulate(session(360), fixed_now());
        assert_eq!(today.total_watch_time_seconds(), 660);
        assert!(today.met_daily_goal());
        assert_eq!(today.streak_count(), 1);
        assert!(!today.correct_streak(Some(&record(13, 900, 5))));
        assert_eq!(today.streak_count(), 1);
    }

    #[test]
    fn accumulate_saturates_at_max_watch_time() {
        let mut today =
            StreakRecord::open(UserId::new(1), day(14), session(i64::MAX), None, fixed_now());
        assert_eq!(today.total_watch_time_seconds(), MAX_WATCH_TIME_SECS);
        today.accumulate(session(1), fixed_now());
        assert_eq!(today.total_watch_time_seconds(), MAX_WATCH_TIME_SECS);
        today.accumulate(session(i64::MAX), fixed_now());
        assert_eq!(today.total_watch_time_seconds(), MAX_WATCH_TIME_SECS);
    }

    #[test]
    fn correction_only_fires_for_zero_count() {
        let yesterday = record(13, 900, 2);
        let mut below_goal = record(14, 100, 0);
        assert!(!below_goal.correct_streak(Some(&yesterday)));
        assert_eq!(below_goal.streak_count(), 0);

        let mut zero = record(14, 700, 0);
        assert!(zero.correct_streak(Some(&yesterday)));
        assert_eq!(zero.streak_count(), 3);

        let mut zero_no_history = record(14, 700, 0);
        assert!(zero_no_history.correct_streak(None));
        assert_eq!(zero_no_history.streak_count(), 1);
    }

    #[test]
    fn current_streak_falls_back_to_yesterday() {
        let yesterday = record(13, 600, 4);
        let today_short = record(14, 100, 5);
        let today_done = record(14, 650, 5);

        assert_eq!(current_streak(Some(&today_done), Some(&yesterday)), 5);
        assert_eq!(current_streak(Some(&today_short), Some(&yesterday)), 4);
        assert_eq!(current_streak(None, Some(&yesterday)), 4);
        assert_eq!(current_streak(None, Some(&record(13, 10, 4))), 0);
        assert_eq!(current_streak(None, None), 0);
    }

    #[test]
    fn weekly_activity_fills_all_seven_days() {
        let records = vec![record(14, 650, 2), record(10, 120, 1), record(1, 999, 1)];
        let week = weekly_activity(day(14), &records).unwrap();

        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, day(8));
        assert_eq!(week[6].date, day(14));
        assert_eq!(week[6].weekday, Weekday::Tue);
        assert!(week[6].met_daily_goal);
        assert_eq!(week[2].watch_time_seconds, 120);
        assert!(!week[2].met_daily_goal);
        assert_eq!(
            week.iter().map(|d| d.watch_time_seconds).sum::<u64>(),
            770
        );
    }

    #[test]
    fn daily_activity_serializes_short_weekday_name() {
        let week = weekly_activity(day(14), &[record(14, 650, 2)]).unwrap();
        let json = serde_json::to_value(week[6]).unwrap();
        assert_eq!(json["weekday"], "Tue");
        assert_eq!(json["date"], "2023-11-14");
        assert_eq!(json["watchTimeSeconds"], 650);
        assert_eq!(json["metDailyGoal"], true);

        let monday = serde_json::to_value(week[5]).unwrap();
        assert_eq!(monday["weekday"], "Mon");
    }

    #[test]
    fn weekly_activity_without_records_is_all_idle() {
        let week = weekly_activity(day(14), &[]).unwrap();
        assert_eq!(week.len(), 7);
        assert!(week.iter().all(|d| d.watch_time_seconds == 0 && !d.met_daily_goal));
        assert!(week.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn previous_day_of_min_is_error() {
        assert!(previous_day(NaiveDate::MIN).is_err());
        assert_eq!(previous_day(day(14)).unwrap(), day(13));
    }
}
