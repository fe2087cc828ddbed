use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use watch_core::model::{MAX_WATCH_TIME_SECS, StreakRecord, UserId, WatchSession};

use super::SqliteRepository;
use super::mapping::{db_err, i64_to_u32, map_streak_row, ser, u64_to_i64, user_id_to_i64};
use crate::repository::{StorageError, StreakRepository};

const STREAK_COLUMNS: &str =
    "user_id, day, total_watch_time_secs, streak_count, last_active_at";

#[async_trait]
impl StreakRepository for SqliteRepository {
    async fn get_day(
        &self,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<Option<StreakRecord>, StorageError> {
        let sql = format!("SELECT {STREAK_COLUMNS} FROM streak_days WHERE user_id = ?1 AND day = ?2");
        let row = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .bind(day)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_streak_row).transpose()
    }

    async fn insert_day(&self, record: &StreakRecord) -> Result<(), StorageError> {
        let sql = format!("INSERT INTO streak_days ({STREAK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)");
        sqlx::query(&sql)
            .bind(user_id_to_i64(record.user_id())?)
            .bind(record.day())
            .bind(u64_to_i64(
                "total_watch_time_secs",
                record.total_watch_time_seconds(),
            )?)
            .bind(i64::from(record.streak_count()))
            .bind(record.last_active_at())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn add_watch_time(
        &self,
        user_id: UserId,
        day: NaiveDate,
        session: WatchSession,
        at: DateTime<Utc>,
    ) -> Result<StreakRecord, StorageError> {
        let sql = format!(
            r"
            UPDATE streak_days
            SET total_watch_time_secs = CASE
                    WHEN total_watch_time_secs > ?5 - ?3 THEN ?5
                    ELSE total_watch_time_secs + ?3
                END,
                last_active_at = ?4
            WHERE user_id = ?1 AND day = ?2
            RETURNING {STREAK_COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .bind(day)
            .bind(u64_to_i64("session", session.seconds())?)
            .bind(at)
            .bind(u64_to_i64("max_watch_time", MAX_WATCH_TIME_SECS)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => map_streak_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn set_streak_count(
        &self,
        user_id: UserId,
        day: NaiveDate,
        streak_count: u32,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE streak_days
            SET streak_count = ?3
            WHERE user_id = ?1 AND day = ?2
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .bind(day)
        .bind(i64::from(streak_count))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_days(
        &self,
        user_id: UserId,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<StreakRecord>, StorageError> {
        let sql = format!(
            "SELECT {STREAK_COLUMNS} FROM streak_days \
             WHERE user_id = ?1 AND day >= ?2 AND day <= ?3 ORDER BY day ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .bind(from)
            .bind(until)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(map_streak_row).collect()
    }

    async fn best_streak(&self, user_id: UserId) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(streak_count), 0) AS best FROM streak_days WHERE user_id = ?1",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        i64_to_u32("streak_count", row.try_get::<i64, _>("best").map_err(ser)?)
    }
}
