use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (video library, watch progress, streak days, and indexes).
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS videos (
                    user_id INTEGER NOT NULL,
                    video_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    thumbnail TEXT NOT NULL,
                    duration_secs INTEGER NOT NULL CHECK (duration_secs >= 0),
                    playlist_id TEXT,
                    playlist_name TEXT,
                    order_index INTEGER NOT NULL DEFAULT 0 CHECK (order_index >= 0),
                    added_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, video_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS watch_progress (
                    user_id INTEGER NOT NULL,
                    video_id TEXT NOT NULL,
                    watched_seconds INTEGER NOT NULL CHECK (watched_seconds >= 0),
                    total_duration INTEGER NOT NULL CHECK (total_duration >= 0),
                    is_completed INTEGER NOT NULL DEFAULT 0,
                    last_watched_at TEXT NOT NULL,
                    completed_at TEXT,
                    PRIMARY KEY (user_id, video_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS streak_days (
                    user_id INTEGER NOT NULL,
                    day TEXT NOT NULL,
                    total_watch_time_secs INTEGER NOT NULL CHECK (total_watch_time_secs >= 0),
                    streak_count INTEGER NOT NULL CHECK (streak_count >= 0),
                    last_active_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, day)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_videos_user_playlist_order
                    ON videos (user_id, playlist_id, order_index);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_watch_progress_user_completed
                    ON watch_progress (user_id, is_completed);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
