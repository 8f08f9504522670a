//! Queue repository.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::Result;
use crate::database::models::{DownloadStatus, QueueItemDbModel};

const TERMINAL_FILTER: &str = "status NOT IN ('COMPLETED', 'CANCELLED')";

/// Queue repository trait for single-statement operations.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<QueueItemDbModel>>;
    /// List items ordered by position, excluding terminal items unless requested.
    async fn list(&self, include_completed: bool) -> Result<Vec<QueueItemDbModel>>;
    async fn update_status(&self, id: &str, status: DownloadStatus) -> Result<u64>;
    async fn set_progress(&self, id: &str, progress: f64) -> Result<u64>;
    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<u64>;
    /// Reset a failed item for retry: PENDING, progress 0, message cleared.
    async fn mark_retry(&self, id: &str) -> Result<u64>;
    /// Lowest-position pending item, if any.
    async fn find_next_pending(&self) -> Result<Option<QueueItemDbModel>>;
    /// Startup recovery: interrupted DOWNLOADING rows go back to PENDING.
    async fn reset_downloading_to_pending(&self) -> Result<u64>;
    async fn clear_completed(&self) -> Result<u64>;
    async fn count_by_status(&self) -> Result<Vec<(String, i64)>>;
}

/// SQLx implementation of QueueRepository.
pub struct SqlxQueueRepository {
    pool: SqlitePool,
}

impl SqlxQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for SqlxQueueRepository {
    async fn get(&self, id: &str) -> Result<Option<QueueItemDbModel>> {
        let item =
            sqlx::query_as::<_, QueueItemDbModel>("SELECT * FROM download_queue WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(item)
    }

    async fn list(&self, include_completed: bool) -> Result<Vec<QueueItemDbModel>> {
        let query = if include_completed {
            "SELECT * FROM download_queue ORDER BY position".to_string()
        } else {
            format!("SELECT * FROM download_queue WHERE {TERMINAL_FILTER} ORDER BY position")
        };
        let items = sqlx::query_as::<_, QueueItemDbModel>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn update_status(&self, id: &str, status: DownloadStatus) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result =
            sqlx::query("UPDATE download_queue SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn set_progress(&self, id: &str, progress: f64) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result =
            sqlx::query("UPDATE download_queue SET progress = ?, updated_at = ? WHERE id = ?")
                .bind(progress)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE download_queue SET status = 'FAILED', error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error_message)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_retry(&self, id: &str) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE download_queue SET status = 'PENDING', progress = 0, error_message = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_next_pending(&self) -> Result<Option<QueueItemDbModel>> {
        let item = sqlx::query_as::<_, QueueItemDbModel>(
            "SELECT * FROM download_queue WHERE status = 'PENDING' ORDER BY position LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn reset_downloading_to_pending(&self) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE download_queue SET status = 'PENDING', updated_at = ? WHERE status = 'DOWNLOADING'",
        )
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn clear_completed(&self) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM download_queue WHERE status IN ('COMPLETED', 'CANCELLED')")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows =
            sqlx::query("SELECT status, COUNT(*) AS n FROM download_queue GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
            .collect())
    }
}

/// Transactional operations for the download queue.
///
/// These methods operate within an existing transaction and do NOT
/// commit. The caller is responsible for committing or rolling back, so
/// no external observer ever sees a duplicate or missing position.
pub struct QueueTxOps;

impl QueueTxOps {
    pub async fn fetch(
        tx: &mut SqliteConnection,
        id: &str,
    ) -> Result<Option<QueueItemDbModel>> {
        let item =
            sqlx::query_as::<_, QueueItemDbModel>("SELECT * FROM download_queue WHERE id = ?")
                .bind(id)
                .fetch_optional(tx)
                .await?;
        Ok(item)
    }

    /// Next dense position: max over non-terminal items + 1.
    ///
    /// Terminal items are excluded so a stale completed row never
    /// inflates new positions.
    pub async fn next_position(tx: &mut SqliteConnection) -> Result<i64> {
        let max: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(position) FROM download_queue WHERE {TERMINAL_FILTER}"
        ))
        .fetch_one(tx)
        .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    pub async fn active_count(tx: &mut SqliteConnection) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM download_queue WHERE {TERMINAL_FILTER}"
        ))
        .fetch_one(tx)
        .await?;
        Ok(count)
    }

    pub async fn insert(tx: &mut SqliteConnection, item: &QueueItemDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_queue
                (id, url, title, format_id, output_path, status, progress, position, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.url)
        .bind(&item.title)
        .bind(&item.format_id)
        .bind(&item.output_path)
        .bind(&item.status)
        .bind(item.progress)
        .bind(item.position)
        .bind(&item.error_message)
        .bind(&item.created_at)
        .bind(&item.updated_at)
        .execute(tx)
        .await?;
        Ok(())
    }

    pub async fn delete(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_queue WHERE id = ?")
            .bind(id)
            .execute(tx)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_position(tx: &mut SqliteConnection, id: &str, position: i64) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE download_queue SET position = ?, updated_at = ? WHERE id = ?")
            .bind(position)
            .bind(&now)
            .bind(id)
            .execute(tx)
            .await?;
        Ok(())
    }

    /// Close the gap left behind a removed item: every active item past
    /// `position` moves down by one.
    pub async fn shift_down_after(tx: &mut SqliteConnection, position: i64) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(&format!(
            "UPDATE download_queue SET position = position - 1, updated_at = ? WHERE position > ? AND {TERMINAL_FILTER}"
        ))
        .bind(&now)
        .bind(position)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Item moving down the queue: intervening items shift up by one.
    pub async fn shift_up_between(
        tx: &mut SqliteConnection,
        old_position: i64,
        new_position: i64,
    ) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(&format!(
            "UPDATE download_queue SET position = position - 1, updated_at = ? WHERE position > ? AND position <= ? AND {TERMINAL_FILTER}"
        ))
        .bind(&now)
        .bind(old_position)
        .bind(new_position)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Item moving up the queue: intervening items shift down by one.
    pub async fn shift_down_between(
        tx: &mut SqliteConnection,
        new_position: i64,
        old_position: i64,
    ) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(&format!(
            "UPDATE download_queue SET position = position + 1, updated_at = ? WHERE position >= ? AND position < ? AND {TERMINAL_FILTER}"
        ))
        .bind(&now)
        .bind(new_position)
        .bind(old_position)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Transition a row to COMPLETED with full progress.
    pub async fn complete(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE download_queue SET status = 'COMPLETED', progress = 100, updated_at = ? WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(tx)
        .await?;
        Ok(result.rows_affected())
    }
}
