use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use storage::repository::{StorageError, StreakRepository};
use watch_core::model::{
    DailyActivity, StreakRecord, StreakStats, UserId, WatchSession, current_streak, previous_day,
    week_start, weekly_activity,
};
use watch_core::time::DayBoundary;

use crate::Clock;
use crate::error::{StreakServiceError, log_storage_error};

/// Accumulates daily watch time and derives consecutive-day streaks.
#[derive(Clone)]
pub struct StreakEngine {
    clock: Clock,
    days: DayBoundary,
    streaks: Arc<dyn StreakRepository>,
}

impl StreakEngine {
    #[must_use]
    pub fn new(clock: Clock, days: DayBoundary, streaks: Arc<dyn StreakRepository>) -> Self {
        Self {
            clock,
            days,
            streaks,
        }
    }

    /// Today's calendar day for this engine's clock and day boundary.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.days.today(&self.clock)
    }

    /// Add one watch session to today's total.
    ///
    /// The first session of a day fixes that day's `streak_count` from
    /// yesterday's record. Later sessions only add time.
    ///
    /// # Errors
    ///
    /// Returns `StreakServiceError::Streak` if `watch_time_seconds` is not positive.
    /// Returns `StreakServiceError::Storage` if persistence fails.
    pub async fn record_watch_time(
        &self,
        user_id: UserId,
        watch_time_seconds: i64,
    ) -> Result<StreakRecord, StreakServiceError> {
        let session = WatchSession::new(watch_time_seconds)?;
        let now = self.clock.now();
        let today = self.days.day_of(now);

        let existing = self
            .streaks
            .get_day(user_id, today)
            .await
            .inspect_err(log_storage_error("get_day"))?;
        let mut record = match existing {
            Some(_) => self
                .streaks
                .add_watch_time(user_id, today, session, now)
                .await
                .inspect_err(log_storage_error("add_watch_time"))?,
            None => self.open_day(user_id, today, session, now).await?,
        };

        if record.needs_streak_correction() {
            let yesterday = self.yesterday_of(user_id, today).await?;
            if record.correct_streak(yesterday.as_ref()) {
                self.streaks
                    .set_streak_count(user_id, today, record.streak_count())
                    .await
                    .inspect_err(log_storage_error("set_streak_count"))?;
                tracing::debug!(
                    user_id = user_id.value(),
                    %today,
                    streak_count = record.streak_count(),
                    "streak count corrected"
                );
            }
        }

        tracing::debug!(
            user_id = user_id.value(),
            %today,
            total_watch_time_secs = record.total_watch_time_seconds(),
            "watch time recorded"
        );
        Ok(record)
    }

    async fn open_day(
        &self,
        user_id: UserId,
        today: NaiveDate,
        session: WatchSession,
        now: DateTime<Utc>,
    ) -> Result<StreakRecord, StreakServiceError> {
        let yesterday = self.yesterday_of(user_id, today).await?;
        let record = StreakRecord::open(user_id, today, session, yesterday.as_ref(), now);

        match self.streaks.insert_day(&record).await {
            Ok(()) => {
                tracing::info!(
                    user_id = user_id.value(),
                    %today,
                    streak_count = record.streak_count(),
                    "streak day opened"
                );
                Ok(record)
            }
            // Another writer opened the day first; add to theirs.
            Err(StorageError::Conflict) => Ok(self
                .streaks
                .add_watch_time(user_id, today, session, now)
                .await
                .inspect_err(log_storage_error("add_watch_time"))?),
            Err(err) => {
                log_storage_error("insert_day")(&err);
                Err(err.into())
            }
        }
    }

    async fn yesterday_of(
        &self,
        user_id: UserId,
        today: NaiveDate,
    ) -> Result<Option<StreakRecord>, StreakServiceError> {
        let yesterday = previous_day(today)?;
        Ok(self
            .streaks
            .get_day(user_id, yesterday)
            .await
            .inspect_err(log_storage_error("get_day"))?)
    }

    /// The streak as of now. A streak that met the goal yesterday still
    /// counts today until today ends.
    ///
    /// # Errors
    ///
    /// Returns `StreakServiceError::Storage` if repository access fails.
    pub async fn current_streak(&self, user_id: UserId) -> Result<u32, StreakServiceError> {
        let today = self.today();
        let today_record = self
            .streaks
            .get_day(user_id, today)
            .await
            .inspect_err(log_storage_error("get_day"))?;
        let yesterday = self.yesterday_of(user_id, today).await?;
        Ok(current_streak(today_record.as_ref(), yesterday.as_ref()))
    }

    /// # Errors
    ///
    /// Returns `StreakServiceError::Storage` if repository access fails.
    pub async fn best_streak(&self, user_id: UserId) -> Result<u32, StreakServiceError> {
        Ok(self
            .streaks
            .best_streak(user_id)
            .await
            .inspect_err(log_storage_error("best_streak"))?)
    }

    /// Seven days ending on `reference`, oldest first, with idle days filled in.
    ///
    /// # Errors
    ///
    /// Returns `StreakServiceError::Streak` if the window underflows the calendar.
    /// Returns `StreakServiceError::Storage` if repository access fails.
    pub async fn weekly_activity(
        &self,
        user_id: UserId,
        reference: NaiveDate,
    ) -> Result<Vec<DailyActivity>, StreakServiceError> {
        let records = self.week_records(user_id, reference).await?;
        Ok(weekly_activity(reference, &records)?)
    }

    /// Current and best streak plus today's and this week's watch time.
    ///
    /// # Errors
    ///
    /// Returns `StreakServiceError::Storage` if repository access fails.
    pub async fn streak_stats(&self, user_id: UserId) -> Result<StreakStats, StreakServiceError> {
        let today = self.today();
        let week = self.week_records(user_id, today).await?;
        let today_record = week.iter().find(|r| r.day() == today);
        let yesterday_day = previous_day(today)?;
        let yesterday = week.iter().find(|r| r.day() == yesterday_day);

        Ok(StreakStats {
            current_streak: current_streak(today_record, yesterday),
            best_streak: self.best_streak(user_id).await?,
            today_watch_time_seconds: today_record
                .map_or(0, StreakRecord::total_watch_time_seconds),
            week_watch_time_seconds: week
                .iter()
                .map(StreakRecord::total_watch_time_seconds)
                .fold(0_u64, u64::saturating_add),
            met_daily_goal: today_record.is_some_and(StreakRecord::met_daily_goal),
        })
    }

    async fn week_records(
        &self,
        user_id: UserId,
        reference: NaiveDate,
    ) -> Result<Vec<StreakRecord>, StreakServiceError> {
        let start = week_start(reference)?;
        Ok(self
            .streaks
            .list_days(user_id, start, reference)
            .await
            .inspect_err(log_storage_error("list_days"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::{Duration, Weekday};
    use storage::repository::InMemoryRepository;
    use watch_core::time::fixed_now;

    fn engine(repo: &InMemoryRepository, clock: Clock) -> StreakEngine {
        StreakEngine::new(clock, DayBoundary::utc(), Arc::new(repo.clone()))
    }

    fn today() -> NaiveDate {
        DayBoundary::utc().day_of(fixed_now())
    }

    fn days_ago(n: u64) -> NaiveDate {
        today().checked_sub_days(chrono::Days::new(n)).unwrap()
    }

    async fn seed(repo: &InMemoryRepository, day: NaiveDate, secs: u64, count: u32) {
        let rec = StreakRecord::from_persisted(UserId::new(1), day, secs, count, fixed_now());
        repo.insert_day(&rec).await.unwrap();
    }

    #[tokio::test]
    async fn extends_yesterdays_streak() {
        let repo = InMemoryRepository::new();
        seed(&repo, days_ago(1), 700, 5).await;

        let rec = engine(&repo, Clock::fixed(fixed_now()))
            .record_watch_time(UserId::new(1), 60)
            .await
            .unwrap();
        assert_eq!(rec.day(), today());
        assert_eq!(rec.streak_count(), 6);
        assert_eq!(rec.total_watch_time_seconds(), 60);
    }

    #[tokio::test]
    async fn starts_at_one_without_a_qualifying_yesterday() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let rec = engine(&repo, Clock::fixed(fixed_now()))
            .record_watch_time(user, 650)
            .await
            .unwrap();
        assert_eq!(rec.streak_count(), 1);
        assert_eq!(rec.total_watch_time_seconds(), 650);
        assert!(rec.met_daily_goal());

        let other = InMemoryRepository::new();
        seed(&other, days_ago(1), 599, 4).await;
        let rec = engine(&other, Clock::fixed(fixed_now()))
            .record_watch_time(user, 10)
            .await
            .unwrap();
        assert_eq!(rec.streak_count(), 1);
    }

    #[tokio::test]
    async fn later_sessions_accumulate_without_touching_the_count() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let mut clock = Clock::fixed(fixed_now());
        seed(&repo, days_ago(1), 600, 2).await;

        engine(&repo, clock).record_watch_time(user, 300).await.unwrap();
        clock.advance(Duration::minutes(30));
        let rec = engine(&repo, clock).record_watch_time(user, 400).await.unwrap();

        assert_eq!(rec.total_watch_time_seconds(), 700);
        assert_eq!(rec.streak_count(), 3);
        assert_eq!(rec.last_active_at(), clock.now());
    }

    #[tokio::test]
    async fn zero_count_is_rederived_once_goal_is_met() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        seed(&repo, days_ago(1), 900, 3).await;
        seed(&repo, today(), 100, 0).await;

        let service = engine(&repo, Clock::fixed(fixed_now()));
        let rec = service.record_watch_time(user, 200).await.unwrap();
        assert_eq!(rec.streak_count(), 0);

        let rec = service.record_watch_time(user, 300).await.unwrap();
        assert_eq!(rec.streak_count(), 4);
        let stored = repo.get_day(user, today()).await.unwrap().unwrap();
        assert_eq!(stored.streak_count(), 4);
    }

    #[tokio::test]
    async fn rejects_non_positive_sessions() {
        let repo = InMemoryRepository::new();
        let service = engine(&repo, Clock::fixed(fixed_now()));
        for secs in [0, -5] {
            let err = service
                .record_watch_time(UserId::new(1), secs)
                .await
                .unwrap_err();
            assert!(err.is_validation());
        }
        assert!(repo.get_day(UserId::new(1), today()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn current_streak_falls_back_to_yesterday() {
        let user = UserId::new(1);

        let repo = InMemoryRepository::new();
        seed(&repo, days_ago(1), 600, 4).await;
        seed(&repo, today(), 100, 5).await;
        let service = engine(&repo, Clock::fixed(fixed_now()));
        assert_eq!(service.current_streak(user).await.unwrap(), 4);

        let repo = InMemoryRepository::new();
        seed(&repo, days_ago(1), 600, 4).await;
        seed(&repo, today(), 650, 5).await;
        let service = engine(&repo, Clock::fixed(fixed_now()));
        assert_eq!(service.current_streak(user).await.unwrap(), 5);

        let repo = InMemoryRepository::new();
        seed(&repo, days_ago(1), 10, 4).await;
        seed(&repo, days_ago(2), 900, 3).await;
        let service = engine(&repo, Clock::fixed(fixed_now()));
        assert_eq!(service.current_streak(user).await.unwrap(), 0);
        assert_eq!(service.best_streak(user).await.unwrap(), 4);
        assert_eq!(service.best_streak(UserId::new(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn weekly_activity_always_has_seven_days() {
        let repo = InMemoryRepository::new();
        seed(&repo, days_ago(6), 620, 1).await;
        seed(&repo, days_ago(2), 120, 1).await;
        seed(&repo, days_ago(7), 900, 1).await;
        let service = engine(&repo, Clock::fixed(fixed_now()));

        let week = service
            .weekly_activity(UserId::new(1), today())
            .await
            .unwrap();
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, days_ago(6));
        assert!(week[0].met_daily_goal);
        assert_eq!(week[4].watch_time_seconds, 120);
        assert!(!week[4].met_daily_goal);
        assert_eq!(week[6].date, today());
        assert_eq!(week[6].weekday, Weekday::Tue);
        assert_eq!(week[6].watch_time_seconds, 0);
        let json = serde_json::to_value(&week).unwrap();
        assert_eq!(json[6]["weekday"], "Tue");
        assert_eq!(json[0]["weekday"], "Wed");

        let empty = service
            .weekly_activity(UserId::new(9), today())
            .await
            .unwrap();
        assert_eq!(empty.len(), 7);
        assert!(empty.iter().all(|d| d.watch_time_seconds == 0));
    }

    #[tokio::test]
    async fn stats_summarize_today_and_week() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        seed(&repo, days_ago(3), 300, 9).await;
        seed(&repo, days_ago(1), 600, 2).await;
        let service = engine(&repo, Clock::fixed(fixed_now()));
        service.record_watch_time(user, 200).await.unwrap();

        let stats = service.streak_stats(user).await.unwrap();
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.best_streak, 9);
        assert_eq!(stats.today_watch_time_seconds, 200);
        assert_eq!(stats.week_watch_time_seconds, 1100);
        assert!(!stats.met_daily_goal);
    }

    #[tokio::test]
    async fn day_boundary_follows_the_offset() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let east = DayBoundary::from_offset_minutes(180).unwrap();
        let service = StreakEngine::new(Clock::fixed(fixed_now()), east, Arc::new(repo.clone()));

        let rec = service.record_watch_time(user, 60).await.unwrap();
        assert_eq!(rec.day(), NaiveDate::from_ymd_opt(2023, 11, 15).unwrap());
    }

    struct FailingStreaks;

    #[async_trait]
    impl StreakRepository for FailingStreaks {
        async fn get_day(
            &self,
            _user_id: UserId,
            _day: NaiveDate,
        ) -> Result<Option<StreakRecord>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn insert_day(&self, _record: &StreakRecord) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn add_watch_time(
            &self,
            _user_id: UserId,
            _day: NaiveDate,
            _session: WatchSession,
            _at: DateTime<Utc>,
        ) -> Result<StreakRecord, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn set_streak_count(
            &self,
            _user_id: UserId,
            _day: NaiveDate,
            _streak_count: u32,
        ) -> Result<(), StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn list_days(
            &self,
            _user_id: UserId,
            _from: NaiveDate,
            _until: NaiveDate,
        ) -> Result<Vec<StreakRecord>, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }

        async fn best_streak(&self, _user_id: UserId) -> Result<u32, StorageError> {
            Err(StorageError::Connection("offline".into()))
        }
    }

    /// Misses `opened_elsewhere` on lookup, as if another writer inserted it
    /// between this writer's lookup and insert.
    struct LateLookup {
        inner: InMemoryRepository,
        opened_elsewhere: NaiveDate,
    }

    #[async_trait]
    impl StreakRepository for LateLookup {
        async fn get_day(
            &self,
            user_id: UserId,
            day: NaiveDate,
        ) -> Result<Option<StreakRecord>, StorageError> {
            if day == self.opened_elsewhere {
                return Ok(None);
            }
            self.inner.get_day(user_id, day).await
        }

        async fn insert_day(&self, record: &StreakRecord) -> Result<(), StorageError> {
            self.inner.insert_day(record).await
        }

        async fn add_watch_time(
            &self,
            user_id: UserId,
            day: NaiveDate,
            session: WatchSession,
            at: DateTime<Utc>,
        ) -> Result<StreakRecord, StorageError> {
            self.inner.add_watch_time(user_id, day, session, at).await
        }

        async fn set_streak_count(
            &self,
            user_id: UserId,
            day: NaiveDate,
            streak_count: u32,
        ) -> Result<(), StorageError> {
            self.inner.set_streak_count(user_id, day, streak_count).await
        }

        async fn list_days(
            &self,
            user_id: UserId,
            from: NaiveDate,
            until: NaiveDate,
        ) -> Result<Vec<StreakRecord>, StorageError> {
            self.inner.list_days(user_id, from, until).await
        }

        async fn best_streak(&self, user_id: UserId) -> Result<u32, StorageError> {
            self.inner.best_streak(user_id).await
        }
    }

    #[tokio::test]
    async fn losing_the_day_open_race_adds_to_the_winner() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        seed(&repo, days_ago(1), 600, 2).await;
        // The winning writer stored a different count than this one would derive.
        seed(&repo, today(), 300, 7).await;

        let racing = LateLookup {
            inner: repo.clone(),
            opened_elsewhere: today(),
        };
        let service = StreakEngine::new(
            Clock::fixed(fixed_now()),
            DayBoundary::utc(),
            Arc::new(racing),
        );

        let rec = service.record_watch_time(user, 120).await.unwrap();
        assert_eq!(rec.total_watch_time_seconds(), 420);
        assert_eq!(rec.streak_count(), 7);

        let stored = repo.get_day(user, today()).await.unwrap().unwrap();
        assert_eq!(stored.total_watch_time_seconds(), 420);
        assert_eq!(stored.streak_count(), 7);
        assert_eq!(repo.list_days(user, days_ago(6), today()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn storage_failures_propagate_unchanged() {
        let service = StreakEngine::new(
            Clock::fixed(fixed_now()),
            DayBoundary::utc(),
            Arc::new(FailingStreaks),
        );
        let err = service
            .record_watch_time(UserId::new(1), 60)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StreakServiceError::Storage(StorageError::Connection(ref msg)) if msg == "offline"
        ));
        assert!(!err.is_validation());
    }
}
