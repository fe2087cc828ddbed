use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{UserId, VideoId};

/// Share of a video (in percent) that has to be reached for it to count as completed.
pub const COMPLETION_THRESHOLD_PERCENT: u64 = 95;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("completion state is inconsistent: completed={is_completed}, completed_at set={has_completed_at}")]
    InconsistentCompletion {
        is_completed: bool,
        has_completed_at: bool,
    },
}

//
// ─── PROGRESS REPORT ───────────────────────────────────────────────────────────
//

/// Raw playhead report as received from a player.
///
/// Both fields are optional so that a missing value can be rejected
/// explicitly instead of defaulting to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressDraft {
    pub watched_seconds: Option<i64>,
    pub total_duration: Option<i64>,
}

impl ProgressDraft {
    #[must_use]
    pub fn new(watched_seconds: i64, total_duration: i64) -> Self {
        Self {
            watched_seconds: Some(watched_seconds),
            total_duration: Some(total_duration),
        }
    }

    /// Check presence and sign of both values.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::MissingField` if either value is absent and
    /// `ProgressError::Negative` if either is below zero.
    pub fn validate(self) -> Result<ProgressUpdate, ProgressError> {
        let watched = require_non_negative("watchedSeconds", self.watched_seconds)?;
        let total = require_non_negative("totalDuration", self.total_duration)?;
        Ok(ProgressUpdate {
            watched_seconds: watched,
            total_duration: total,
        })
    }
}

fn require_non_negative(field: &'static str, value: Option<i64>) -> Result<u64, ProgressError> {
    let value = value.ok_or(ProgressError::MissingField { field })?;
    u64::try_from(value).map_err(|_| ProgressError::Negative { field, value })
}

/// A validated playhead report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub watched_seconds: u64,
    pub total_duration: u64,
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Watch state of one video for one user.
///
/// `is_completed` is a one-way latch: it flips to `true` the first time a
/// report reaches [`COMPLETION_THRESHOLD_PERCENT`] and `completed_at` records
/// that moment. Later reports (including backwards scrubs) never clear either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    user_id: UserId,
    video_id: VideoId,
    watched_seconds: u64,
    total_duration: u64,
    is_completed: bool,
    last_watched_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// First report for a `(user, video)` pair.
    #[must_use]
    pub fn start(
        user_id: UserId,
        video_id: VideoId,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            user_id,
            video_id,
            watched_seconds: update.watched_seconds,
            total_duration: update.total_duration,
            is_completed: false,
            last_watched_at: now,
            completed_at: None,
        };
        record.latch_completion(now);
        record
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InconsistentCompletion` when `completed_at` is
    /// present without the completed flag or vice versa.
    pub fn from_persisted(
        user_id: UserId,
        video_id: VideoId,
        watched_seconds: u64,
        total_duration: u64,
        is_completed: bool,
        last_watched_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if is_completed != completed_at.is_some() {
            return Err(ProgressError::InconsistentCompletion {
                is_completed,
                has_completed_at: completed_at.is_some(),
            });
        }
        Ok(Self {
            user_id,
            video_id,
            watched_seconds,
            total_duration,
            is_completed,
            last_watched_at,
            completed_at,
        })
    }

    /// Overwrite position and duration with a newer report.
    ///
    /// Returns `true` if this report completed the video.
    pub fn apply(&mut self, update: ProgressUpdate, now: DateTime<Utc>) -> bool {
        self.watched_seconds = update.watched_seconds;
        self.total_duration = update.total_duration;
        self.last_watched_at = now;
        self.latch_completion(now)
    }

    /// Fold a concurrently written record into this one.
    ///
    /// Position, duration and `last_watched_at` come from `newer`; the
    /// completion latch keeps whichever side completed first.
    pub fn absorb(&mut self, newer: &ProgressRecord) {
        self.watched_seconds = newer.watched_seconds;
        self.total_duration = newer.total_duration;
        self.last_watched_at = newer.last_watched_at;
        if !self.is_completed && newer.is_completed {
            self.is_completed = true;
            self.completed_at = newer.completed_at;
        }
    }

    fn latch_completion(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_completed || !reaches_threshold(self.watched_seconds, self.total_duration) {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(now);
        true
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    #[must_use]
    pub fn watched_seconds(&self) -> u64 {
        self.watched_seconds
    }

    #[must_use]
    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn last_watched_at(&self) -> DateTime<Utc> {
        self.last_watched_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Started but not finished.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        !self.is_completed && self.watched_seconds > 0
    }

    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        completion_percentage(self.watched_seconds, self.total_duration)
    }

    #[must_use]
    pub fn resume_point(&self) -> ResumePoint {
        ResumePoint {
            watched_seconds: self.watched_seconds,
            is_completed: self.is_completed,
            completion_percentage: self.completion_percentage(),
        }
    }
}

/// `round(watched / total * 100)` clamped to `0..=100`; `0` for zero-length videos.
///
/// Halves round up.
#[must_use]
pub fn completion_percentage(watched_seconds: u64, total_duration: u64) -> u8 {
    if total_duration == 0 {
        return 0;
    }
    let watched = u128::from(watched_seconds);
    let total = u128::from(total_duration);
    let rounded = (watched * 200 + total) / (total * 2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

/// Exact `watched / total * 100 >= 95` without floating point.
fn reaches_threshold(watched_seconds: u64, total_duration: u64) -> bool {
    total_duration > 0
        && u128::from(watched_seconds) * 100
            >= u128::from(COMPLETION_THRESHOLD_PERCENT) * u128::from(total_duration)
}

//
// ─── READ MODELS ───────────────────────────────────────────────────────────────
//

/// Where playback should resume. All zeros for a never-watched video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePoint {
    pub watched_seconds: u64,
    pub is_completed: bool,
    pub completion_percentage: u8,
}

/// Per-user totals across the library and recorded progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub total_videos: u64,
    pub completed_videos: u64,
    pub in_progress_videos: u64,
    /// Sum of last known positions, not of distinct watched intervals.
    pub total_watch_time_seconds: u64,
}

impl ProgressStats {
    #[must_use]
    pub fn formatted_watch_time(&self) -> String {
        format_watch_time(self.total_watch_time_seconds)
    }
}

/// Compact human duration: `"1h 2m"`, `"2m 5s"` or `"45s"`.
#[must_use]
pub fn format_watch_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn video() -> VideoId {
        VideoId::new("vid").unwrap()
    }

    fn update(watched: u64, total: u64) -> ProgressUpdate {
        ProgressUpdate {
            watched_seconds: watched,
            total_duration: total,
        }
    }

    #[test]
    fn draft_requires_both_fields() {
        let err = ProgressDraft {
            watched_seconds: Some(10),
            total_duration: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            ProgressError::MissingField {
                field: "totalDuration"
            }
        );

        let err = ProgressDraft::default().validate().unwrap_err();
        assert!(matches!(
            err,
            ProgressError::MissingField {
                field: "watchedSeconds"
            }
        ));
    }

    #[test]
    fn draft_rejects_negative_values() {
        let err = ProgressDraft::new(-1, 100).validate().unwrap_err();
        assert_eq!(
            err,
            ProgressError::Negative {
                field: "watchedSeconds",
                value: -1
            }
        );
        assert!(ProgressDraft::new(0, 0).validate().is_ok());
    }

    #[test]
    fn percentage_rounds_and_clamps() {
        assert_eq!(completion_percentage(700, 800), 88);
        assert_eq!(completion_percentage(760, 800), 95);
        assert_eq!(completion_percentage(1, 200), 1); // 0.5 rounds up
        assert_eq!(completion_percentage(1, 201), 0);
        assert_eq!(completion_percentage(900, 800), 100);
        assert_eq!(completion_percentage(50, 0), 0);
        assert_eq!(completion_percentage(u64::MAX, 1), 100);
    }

    #[test]
    fn completion_latches_once_and_survives_rewind() {
        let t0 = fixed_now();
        let mut record = ProgressRecord::start(UserId::new(1), video(), update(700, 800), t0);
        assert!(!record.is_completed());
        assert_eq!(record.completion_percentage(), 88);

        let t1 = t0 + Duration::minutes(1);
        assert!(record.apply(update(760, 800), t1));
        assert!(record.is_completed());
        assert_eq!(record.completed_at(), Some(t1));

        let t2 = t1 + Duration::minutes(1);
        assert!(!record.apply(update(100, 800), t2));
        assert!(record.is_completed());
        assert_eq!(record.completed_at(), Some(t1));
        assert_eq!(record.watched_seconds(), 100);
        assert_eq!(record.last_watched_at(), t2);
    }

    #[test]
    fn threshold_uses_unrounded_ratio() {
        // 94.9% rounds to 95 for display but does not complete.
        let record = ProgressRecord::start(UserId::new(1), video(), update(949, 1000), fixed_now());
        assert_eq!(record.completion_percentage(), 95);
        assert!(!record.is_completed());
    }

    #[test]
    fn zero_duration_never_completes() {
        let record = ProgressRecord::start(UserId::new(1), video(), update(100, 0), fixed_now());
        assert!(!record.is_completed());
        assert_eq!(record.completion_percentage(), 0);
        assert!(record.is_in_progress());
    }

    #[test]
    fn absorb_keeps_earliest_completion() {
        let t0 = fixed_now();
        let mut stored = ProgressRecord::start(UserId::new(1), video(), update(800, 800), t0);
        let newer = ProgressRecord::start(
            UserId::new(1),
            video(),
            update(790, 800),
            t0 + Duration::seconds(5),
        );
        stored.absorb(&newer);
        assert_eq!(stored.watched_seconds(), 790);
        assert_eq!(stored.completed_at(), Some(t0));

        let mut fresh = ProgressRecord::start(UserId::new(1), video(), update(10, 800), t0);
        fresh.absorb(&newer);
        assert!(fresh.is_completed());
        assert_eq!(fresh.completed_at(), newer.completed_at());
    }

    #[test]
    fn persisted_completion_must_be_consistent() {
        let err = ProgressRecord::from_persisted(
            UserId::new(1),
            video(),
            10,
            10,
            true,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InconsistentCompletion { .. }));
    }

    #[test]
    fn resume_point_defaults_to_zero() {
        let point = ResumePoint::default();
        assert_eq!(point.watched_seconds, 0);
        assert!(!point.is_completed);
        assert_eq!(point.completion_percentage, 0);
    }

    #[test]
    fn watch_time_formatting() {
        assert_eq!(format_watch_time(45), "45s");
        assert_eq!(format_watch_time(125), "2m 5s");
        assert_eq!(format_watch_time(3723), "1h 2m");
        assert_eq!(format_watch_time(0), "0s");
    }
}
