use async_trait::async_trait;
use sqlx::Row;
use watch_core::model::{PlaylistId, UserId, Video, VideoId};

use super::SqliteRepository;
use super::mapping::{db_err, i64_to_u64, map_video_row, ser, u64_to_i64, user_id_to_i64};
use crate::repository::{StorageError, VideoRepository};

const VIDEO_COLUMNS: &str = "user_id, video_id, title, thumbnail, duration_secs, \
                             playlist_id, playlist_name, order_index, added_at";

#[async_trait]
impl VideoRepository for SqliteRepository {
    async fn insert_video(&self, video: &Video) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO videos ({VIDEO_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        );
        let playlist = video.playlist();
        sqlx::query(&sql)
            .bind(user_id_to_i64(video.user_id())?)
            .bind(video.video_id().as_str())
            .bind(video.title())
            .bind(video.thumbnail())
            .bind(u64_to_i64("duration_secs", video.duration_secs())?)
            .bind(playlist.map(|p| p.id.as_str()))
            .bind(playlist.map(|p| p.name.as_str()))
            .bind(i64::from(video.order_index()))
            .bind(video.added_at())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn list_videos(
        &self,
        user_id: UserId,
        playlist_id: Option<&PlaylistId>,
    ) -> Result<Vec<Video>, StorageError> {
        let sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos \
             WHERE user_id = ?1 AND (?2 IS NULL OR playlist_id = ?2) \
             ORDER BY order_index ASC, added_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .bind(playlist_id.map(PlaylistId::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_video_row).collect()
    }

    async fn count_videos(&self, user_id: UserId) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM videos WHERE user_id = ?1")
            .bind(user_id_to_i64(user_id)?)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        i64_to_u64("count", row.try_get::<i64, _>("n").map_err(ser)?)
    }

    async fn delete_video(&self, user_id: UserId, video_id: &VideoId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM videos WHERE user_id = ?1 AND video_id = ?2")
            .bind(user_id_to_i64(user_id)?)
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn set_order_index(
        &self,
        user_id: UserId,
        video_id: &VideoId,
        order_index: u32,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            "UPDATE videos SET order_index = ?3 WHERE user_id = ?1 AND video_id = ?2",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(video_id.as_str())
        .bind(i64::from(order_index))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(res.rows_affected() > 0)
    }
}
