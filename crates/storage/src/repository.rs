use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use watch_core::model::{
    PlaylistId, ProgressRecord, StreakRecord, UserId, Video, VideoId, WatchSession,
    sort_for_listing,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Subsets of a user's progress records that can be counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressFilter {
    All,
    Completed,
    /// Not completed and `watched_seconds > 0`.
    InProgress,
}

impl ProgressFilter {
    #[must_use]
    pub fn matches(self, record: &ProgressRecord) -> bool {
        match self {
            ProgressFilter::All => true,
            ProgressFilter::Completed => record.is_completed(),
            ProgressFilter::InProgress => record.is_in_progress(),
        }
    }
}

/// Repository contract for per-video watch progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for `(user, video)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing record is `Ok(None)`.
    async fn get_progress(
        &self,
        user_id: UserId,
        video_id: &VideoId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert or overwrite the record for its `(user, video)` key in one step.
    ///
    /// When a row already exists, position, duration and `last_watched_at`
    /// are replaced, while an existing completion (flag and timestamp) is
    /// kept. Returns the stored state after the write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(
        &self,
        record: &ProgressRecord,
    ) -> Result<ProgressRecord, StorageError>;

    /// All of a user's records, most recently watched first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_progress(&self, user_id: UserId) -> Result<Vec<ProgressRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_progress(
        &self,
        user_id: UserId,
        filter: ProgressFilter,
    ) -> Result<u64, StorageError>;

    /// Sum of `watched_seconds` over all of the user's records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn sum_watched_seconds(&self, user_id: UserId) -> Result<u64, StorageError>;
}

/// Repository contract for per-day streak records.
#[async_trait]
pub trait StreakRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing day is `Ok(None)`.
    async fn get_day(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<Option<StreakRecord>, StorageError>;

    /// Create a day record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the `(user, day)` key already exists.
    async fn insert_day(&self, record: &StreakRecord) -> Result<(), StorageError>;

    /// Atomically add a session to an existing day and return the new state.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the day has no record.
    async fn add_watch_time(
        &self,
        user_id: UserId,
        day: NaiveDate,
        session: WatchSession,
        at: DateTime<Utc>,
    ) -> Result<StreakRecord, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the day has no record.
    async fn set_streak_count(
        &self,
        user_id: UserId,
        day: NaiveDate,
        streak_count: u32,
    ) -> Result<(), StorageError>;

    /// Records with `from <= day <= until`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_days(
        &self,
        user_id: UserId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<StreakRecord>, StorageError>;

    /// Highest `streak_count` ever recorded, `0` without records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn best_streak(&self, user_id: UserId) -> Result<u32, StorageError>;
}

/// Repository contract for the user's video library.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the video is already in the user's library.
    async fn insert_video(&self, video: &Video) -> Result<(), StorageError>;

    /// Library entries ordered by `order_index`, newest first within ties.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_videos(
        &self,
        user_id: UserId,
        playlist_id: Option<&PlaylistId>,
    ) -> Result<Vec<Video>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn count_videos(&self, user_id: UserId) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the video is not in the library.
    async fn delete_video(&self, user_id: UserId, video_id: &VideoId) -> Result<(), StorageError>;

    /// Returns `false` when the video is not in the library.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_order_index(
        &self,
        user_id: UserId,
        video_id: &VideoId,
        order_index: u32,
    ) -> Result<bool, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(UserId, VideoId), ProgressRecord>>>,
    streaks: Arc<Mutex<BTreeMap<(UserId, NaiveDate), StreakRecord>>>,
    videos: Arc<Mutex<HashMap<(UserId, VideoId), Video>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        video_id: &VideoId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, video_id.clone())).cloned())
    }

    async fn upsert_progress(
        &self,
        record: &ProgressRecord,
    ) -> Result<ProgressRecord, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let stored = guard
            .entry((record.user_id(), record.video_id().clone()))
            .and_modify(|stored| stored.absorb(record))
            .or_insert_with(|| record.clone());
        Ok(stored.clone())
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut out: Vec<ProgressRecord> = guard
            .values()
            .filter(|r| r.user_id() == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_watched_at().cmp(&a.last_watched_at()));
        Ok(out)
    }

    async fn count_progress(
        &self,
        user_id: UserId,
        filter: ProgressFilter,
    ) -> Result<u64, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let count = guard
            .values()
            .filter(|r| r.user_id() == user_id && filter.matches(r))
            .count();
        Ok(count as u64)
    }

    async fn sum_watched_seconds(&self, user_id: UserId) -> Result<u64, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|r| r.user_id() == user_id)
            .map(ProgressRecord::watched_seconds)
            .fold(0_u64, u64::saturating_add))
    }
}

#[async_trait]
impl StreakRepository for InMemoryRepository {
    async fn get_day(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<Option<StreakRecord>, StorageError> {
        let guard = self.streaks.lock().map_err(poisoned)?;
        Ok(guard.get(&(user_id, day)).cloned())
    }

    async fn insert_day(&self, record: &StreakRecord) -> Result<(), StorageError> {
        let mut guard = self.streaks.lock().map_err(poisoned)?;
        let key = (record.user_id(), record.day());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, record.clone());
        Ok(())
    }

    async fn add_watch_time(
        &self,
        user_id: UserId,
        day: NaiveDate,
        session: WatchSession,
        at: DateTime<Utc>,
    ) -> Result<StreakRecord, StorageError> {
        let mut guard = self.streaks.lock().map_err(poisoned)?;
        let record = guard
            .get_mut(&(user_id, day))
            .ok_or(StorageError::NotFound)?;
        record.accumulate(session, at);
        Ok(record.clone())
    }

    async fn set_streak_count(
        &self,
        user_id: UserId,
        day: NaiveDate,
        streak_count: u32,
    ) -> Result<(), StorageError> {
        let mut guard = self.streaks.lock().map_err(poisoned)?;
        let record = guard
            .get_mut(&(user_id, day))
            .ok_or(StorageError::NotFound)?;
        *record = StreakRecord::from_persisted(
            user_id,
            day,
            record.total_watch_time_seconds(),
            streak_count,
            record.last_active_at(),
        );
        Ok(())
    }

    async fn list_days(
        &self,
        user_id: UserId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<StreakRecord>, StorageError> {
        if from > until {
            return Ok(Vec::new());
        }
        let guard = self.streaks.lock().map_err(poisoned)?;
        Ok(guard
            .range((user_id, from)..=(user_id, until))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn best_streak(&self, user_id: UserId) -> Result<u32, StorageError> {
        let guard = self.streaks.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|r| r.user_id() == user_id)
            .map(StreakRecord::streak_count)
            .max()
            .unwrap_or(0))
    }
}

#[async_trait]
impl VideoRepository for InMemoryRepository {
    async fn insert_video(&self, video: &Video) -> Result<(), StorageError> {
        let mut guard = self.videos.lock().map_err(poisoned)?;
        let key = (video.user_id(), video.video_id().clone());
        if guard.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        guard.insert(key, video.clone());
        Ok(())
    }

    async fn list_videos(
        &self,
        user_id: UserId,
        playlist_id: Option<&PlaylistId>,
    ) -> Result<Vec<Video>, StorageError> {
        let guard = self.videos.lock().map_err(poisoned)?;
        let mut out: Vec<Video> = guard
            .values()
            .filter(|v| v.user_id() == user_id)
            .filter(|v| {
                playlist_id.is_none_or(|wanted| v.playlist().is_some_and(|p| &p.id == wanted))
            })
            .cloned()
            .collect();
        sort_for_listing(&mut out);
        Ok(out)
    }

    async fn count_videos(&self, user_id: UserId) -> Result<u64, StorageError> {
        let guard = self.videos.lock().map_err(poisoned)?;
        Ok(guard.keys().filter(|(u, _)| *u == user_id).count() as u64)
    }

    async fn delete_video(&self, user_id: UserId, video_id: &VideoId) -> Result<(), StorageError> {
        let mut guard = self.videos.lock().map_err(poisoned)?;
        guard
            .remove(&(user_id, video_id.clone()))
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn set_order_index(
        &self,
        user_id: UserId,
        video_id: &VideoId,
        order_index: u32,
    ) -> Result<bool, StorageError> {
        let mut guard = self.videos.lock().map_err(poisoned)?;
        Ok(match guard.get_mut(&(user_id, video_id.clone())) {
            Some(video) => {
                video.set_order_index(order_index);
                true
            }
            None => false,
        })
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub streaks: Arc<dyn StreakRepository>,
    pub videos: Arc<dyn VideoRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let streaks: Arc<dyn StreakRepository> = Arc::new(repo.clone());
        let videos: Arc<dyn VideoRepository> = Arc::new(repo);
        Self {
            progress,
            streaks,
            videos,
        }
    }
}
