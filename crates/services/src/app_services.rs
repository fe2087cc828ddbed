use std::sync::Arc;

use storage::repository::Storage;
use watch_core::time::DayBoundary;

use crate::Clock;
use crate::error::AppServicesError;
use crate::progress_tracker::ProgressTracker;
use crate::streak_engine::StreakEngine;
use crate::video_library::VideoLibrary;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress_tracker: Arc<ProgressTracker>,
    streak_engine: Arc<StreakEngine>,
    video_library: Arc<VideoLibrary>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        days: DayBoundary,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, days))
    }

    /// Build services over fresh in-memory repositories.
    #[must_use]
    pub fn in_memory(clock: Clock, days: DayBoundary) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, days)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, days: DayBoundary) -> Self {
        let progress_tracker = Arc::new(ProgressTracker::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.videos),
        ));
        let streak_engine = Arc::new(StreakEngine::new(
            clock,
            days,
            Arc::clone(&storage.streaks),
        ));
        let video_library = Arc::new(VideoLibrary::new(clock, Arc::clone(&storage.videos)));

        Self {
            progress_tracker,
            streak_engine,
            video_library,
        }
    }

    #[must_use]
    pub fn progress_tracker(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress_tracker)
    }

    #[must_use]
    pub fn streak_engine(&self) -> Arc<StreakEngine> {
        Arc::clone(&self.streak_engine)
    }

    #[must_use]
    pub fn video_library(&self) -> Arc<VideoLibrary> {
        Arc::clone(&self.video_library)
    }
}
