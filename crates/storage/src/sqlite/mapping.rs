use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use watch_core::model::{
    PlaylistId, PlaylistRef, ProgressRecord, StreakRecord, UserId, Video, VideoId,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors, turning unique-key violations into `Conflict`.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_to_i64(user_id: UserId) -> Result<i64, StorageError> {
    u64_to_i64("user_id", user_id.value())
}

fn user_id_from_row(row: &SqliteRow) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64(
        "user_id",
        row.try_get::<i64, _>("user_id").map_err(ser)?,
    )?))
}

fn video_id_from_row(row: &SqliteRow) -> Result<VideoId, StorageError> {
    VideoId::new(row.try_get::<String, _>("video_id").map_err(ser)?).map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    ProgressRecord::from_persisted(
        user_id_from_row(row)?,
        video_id_from_row(row)?,
        i64_to_u64(
            "watched_seconds",
            row.try_get::<i64, _>("watched_seconds").map_err(ser)?,
        )?,
        i64_to_u64(
            "total_duration",
            row.try_get::<i64, _>("total_duration").map_err(ser)?,
        )?,
        row.try_get("is_completed").map_err(ser)?,
        row.try_get("last_watched_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_streak_row(row: &SqliteRow) -> Result<StreakRecord, StorageError> {
    Ok(StreakRecord::from_persisted(
        user_id_from_row(row)?,
        row.try_get("day").map_err(ser)?,
        i64_to_u64(
            "total_watch_time_secs",
            row.try_get::<i64, _>("total_watch_time_secs").map_err(ser)?,
        )?,
        i64_to_u32(
            "streak_count",
            row.try_get::<i64, _>("streak_count").map_err(ser)?,
        )?,
        row.try_get("last_active_at").map_err(ser)?,
    ))
}

pub(crate) fn map_video_row(row: &SqliteRow) -> Result<Video, StorageError> {
    let playlist_id: Option<String> = row.try_get("playlist_id").map_err(ser)?;
    let playlist_name: Option<String> = row.try_get("playlist_name").map_err(ser)?;
    let playlist = match (playlist_id, playlist_name) {
        (Some(id), Some(name)) => Some(
            PlaylistRef::new(PlaylistId::new(id).map_err(ser)?, name).map_err(ser)?,
        ),
        (None, None) => None,
        _ => {
            return Err(StorageError::Serialization(
                "playlist_id and playlist_name must be set together".into(),
            ));
        }
    };

    Ok(Video::from_persisted(
        user_id_from_row(row)?,
        video_id_from_row(row)?,
        row.try_get("title").map_err(ser)?,
        row.try_get("thumbnail").map_err(ser)?,
        i64_to_u64(
            "duration_secs",
            row.try_get::<i64, _>("duration_secs").map_err(ser)?,
        )?,
        playlist,
        i64_to_u32(
            "order_index",
            row.try_get::<i64, _>("order_index").map_err(ser)?,
        )?,
        row.try_get("added_at").map_err(ser)?,
    ))
}
