use async_trait::async_trait;
use sqlx::Row;
use watch_core::model::{ProgressRecord, UserId, VideoId};

use super::SqliteRepository;
use super::mapping::{db_err, i64_to_u64, map_progress_row, ser, u64_to_i64, user_id_to_i64};
use crate::repository::{ProgressFilter, ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = "user_id, video_id, watched_seconds, total_duration, \
                                is_completed, last_watched_at, completed_at";

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        video_id: &VideoId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM watch_progress WHERE user_id = ?1 AND video_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .bind(video_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn upsert_progress(
        &self,
        record: &ProgressRecord,
    ) -> Result<ProgressRecord, StorageError> {
        // An existing completion is never cleared.
        let sql = format!(
            r"
            INSERT INTO watch_progress ({PROGRESS_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id, video_id) DO UPDATE SET
                watched_seconds = excluded.watched_seconds,
                total_duration = excluded.total_duration,
                last_watched_at = excluded.last_watched_at,
                is_completed = MAX(watch_progress.is_completed, excluded.is_completed),
                completed_at = COALESCE(watch_progress.completed_at, excluded.completed_at)
            RETURNING {PROGRESS_COLUMNS}
            "
        );

        let row = sqlx::query(&sql)
            .bind(user_id_to_i64(record.user_id())?)
            .bind(record.video_id().as_str())
            .bind(u64_to_i64("watched_seconds", record.watched_seconds())?)
            .bind(u64_to_i64("total_duration", record.total_duration())?)
            .bind(record.is_completed())
            .bind(record.last_watched_at())
            .bind(record.completed_at())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        map_progress_row(&row)
    }

    async fn list_progress(&self, user_id: UserId) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM watch_progress WHERE user_id = ?1 \
             ORDER BY last_watched_at DESC, video_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn count_progress(
        &self,
        user_id: UserId,
        filter: ProgressFilter,
    ) -> Result<u64, StorageError> {
        let predicate = match filter {
            ProgressFilter::All => "",
            ProgressFilter::Completed => " AND is_completed = 1",
            ProgressFilter::InProgress => " AND is_completed = 0 AND watched_seconds > 0",
        };
        let sql = format!("SELECT COUNT(*) AS n FROM watch_progress WHERE user_id = ?1{predicate}");
        let row = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        i64_to_u64("count", row.try_get::<i64, _>("n").map_err(ser)?)
    }

    async fn sum_watched_seconds(&self, user_id: UserId) -> Result<u64, StorageError> {
        // SQLite's SUM errors on overflow; fold here so the total saturates.
        let rows = sqlx::query("SELECT watched_seconds FROM watch_progress WHERE user_id = ?1")
            .bind(user_id_to_i64(user_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().try_fold(0_u64, |total, row| {
            let secs = i64_to_u64(
                "watched_seconds",
                row.try_get::<i64, _>("watched_seconds").map_err(ser)?,
            )?;
            Ok(total.saturating_add(secs))
        })
    }
}
