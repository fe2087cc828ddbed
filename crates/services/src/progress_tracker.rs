use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use storage::repository::{ProgressFilter, ProgressRepository, VideoRepository};
use watch_core::model::{
    ProgressDraft, ProgressRecord, ProgressStats, ResumePoint, UserId, Video, VideoId,
};

use crate::Clock;
use crate::error::{ProgressServiceError, log_storage_error};

/// A library entry together with how far it has been watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoWithProgress {
    pub video: Video,
    pub progress: ResumePoint,
    /// `None` if the video has never been reported on.
    pub last_watched_at: Option<DateTime<Utc>>,
}

/// Tracks per-video playback positions and the completion latch.
#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    videos: Arc<dyn VideoRepository>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        videos: Arc<dyn VideoRepository>,
    ) -> Self {
        Self {
            clock,
            progress,
            videos,
        }
    }

    /// Record the latest playback position for a video.
    ///
    /// Position and duration overwrite whatever was stored, so scrubbing
    /// backwards is accepted. Once the record has reached the completion
    /// threshold it stays completed with its first `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Progress` if either number is missing or negative.
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn report_progress(
        &self,
        user_id: UserId,
        video_id: &VideoId,
        draft: ProgressDraft,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let update = draft.validate()?;
        let now = self.clock.now();

        let existing = self
            .progress
            .get_progress(user_id, video_id)
            .await
            .inspect_err(log_storage_error("get_progress"))?;

        let (record, just_completed) = match existing {
            Some(mut record) => {
                let just_completed = record.apply(update, now);
                (record, just_completed)
            }
            None => {
                let record = ProgressRecord::start(user_id, video_id.clone(), update, now);
                let just_completed = record.is_completed();
                (record, just_completed)
            }
        };

        let stored = self
            .progress
            .upsert_progress(&record)
            .await
            .inspect_err(log_storage_error("upsert_progress"))?;

        tracing::debug!(
            user_id = user_id.value(),
            video_id = video_id.as_str(),
            watched_seconds = stored.watched_seconds(),
            total_duration = stored.total_duration(),
            "progress reported"
        );
        if just_completed {
            tracing::info!(
                user_id = user_id.value(),
                video_id = video_id.as_str(),
                "video completed"
            );
        }
        Ok(stored)
    }

    /// Where to resume playback. A video that was never reported on resumes at zero.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn resume_point(
        &self,
        user_id: UserId,
        video_id: &VideoId,
    ) -> Result<ResumePoint, ProgressServiceError> {
        let record = self
            .progress
            .get_progress(user_id, video_id)
            .await
            .inspect_err(log_storage_error("get_progress"))?;
        Ok(record
            .as_ref()
            .map(ProgressRecord::resume_point)
            .unwrap_or_default())
    }

    /// Library size and progress totals for a user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn aggregate_stats(
        &self,
        user_id: UserId,
    ) -> Result<ProgressStats, ProgressServiceError> {
        let warn = log_storage_error("aggregate_stats");
        let total_videos = self.videos.count_videos(user_id).await.inspect_err(&warn)?;
        let completed_videos = self
            .progress
            .count_progress(user_id, ProgressFilter::Completed)
            .await
            .inspect_err(&warn)?;
        let in_progress_videos = self
            .progress
            .count_progress(user_id, ProgressFilter::InProgress)
            .await
            .inspect_err(&warn)?;
        let total_watch_time_seconds = self
            .progress
            .sum_watched_seconds(user_id)
            .await
            .inspect_err(&warn)?;

        Ok(ProgressStats {
            total_videos,
            completed_videos,
            in_progress_videos,
            total_watch_time_seconds,
        })
    }

    /// Every library entry, most recently added first, with its resume point.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn videos_with_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<VideoWithProgress>, ProgressServiceError> {
        let warn = log_storage_error("videos_with_progress");
        let mut videos = self
            .videos
            .list_videos(user_id, None)
            .await
            .inspect_err(&warn)?;
        videos.sort_by(|a, b| b.added_at().cmp(&a.added_at()));

        let mut progress: HashMap<VideoId, ProgressRecord> = self
            .progress
            .list_progress(user_id)
            .await
            .inspect_err(&warn)?
            .into_iter()
            .map(|record| (record.video_id().clone(), record))
            .collect();

        Ok(videos
            .into_iter()
            .map(|video| {
                let record = progress.remove(video.video_id());
                VideoWithProgress {
                    progress: record
                        .as_ref()
                        .map(ProgressRecord::resume_point)
                        .unwrap_or_default(),
                    last_watched_at: record.as_ref().map(ProgressRecord::last_watched_at),
                    video,
                }
            })
            .collect())
    }
}
