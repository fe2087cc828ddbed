mod ids;
mod progress;
mod streak;
mod video;

pub use ids::{ParseIdError, PlaylistId, UserId, VideoId};

pub use progress::{
    COMPLETION_THRESHOLD_PERCENT, ProgressDraft, ProgressError, ProgressRecord, ProgressStats,
    ProgressUpdate, ResumePoint, completion_percentage, format_watch_time,
};
pub use streak::{
    DAILY_GOAL_SECS, DailyActivity, MAX_WATCH_TIME_SECS, StreakError, StreakRecord, StreakStats,
    WEEK_DAYS, WatchSession, current_streak, next_streak_count, previous_day, week_start, weekly_activity,
};
pub use video::{
    PlaylistRef, PlaylistSummary, Video, VideoDraft, VideoError, sort_for_listing,
    summarize_playlists,
};
