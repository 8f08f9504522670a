//! Download history repository.

use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};

use crate::Result;
use crate::database::models::HistoryEntryDbModel;

/// History repository trait.
///
/// Entries are immutable once created; there are no update operations.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn insert(&self, entry: &HistoryEntryDbModel) -> Result<()>;
    /// List entries, most recent first, with optional case-insensitive
    /// search over title, url, and uploader.
    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryEntryDbModel>>;
    async fn count(&self, search: Option<&str>) -> Result<i64>;
    /// Most recent entry for a URL, by downloaded_at.
    async fn latest_by_url(&self, url: &str) -> Result<Option<HistoryEntryDbModel>>;
    async fn delete(&self, id: &str) -> Result<u64>;
    async fn clear(&self) -> Result<u64>;
}

const SEARCH_FILTER: &str = "(title LIKE ? OR url LIKE ? OR uploader LIKE ?)";

/// SQLx implementation of HistoryRepository.
pub struct SqlxHistoryRepository {
    pool: SqlitePool,
}

impl SqlxHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for SqlxHistoryRepository {
    async fn insert(&self, entry: &HistoryEntryDbModel) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        HistoryTxOps::insert(&mut conn, entry).await
    }

    async fn list(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<HistoryEntryDbModel>> {
        let entries = match search {
            Some(term) => {
                let pattern = format!("%{term}%");
                sqlx::query_as::<_, HistoryEntryDbModel>(&format!(
                    "SELECT * FROM download_history WHERE {SEARCH_FILTER} ORDER BY downloaded_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, HistoryEntryDbModel>(
                    "SELECT * FROM download_history ORDER BY downloaded_at DESC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(entries)
    }

    async fn count(&self, search: Option<&str>) -> Result<i64> {
        let count: i64 = match search {
            Some(term) => {
                let pattern = format!("%{term}%");
                sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) FROM download_history WHERE {SEARCH_FILTER}"
                ))
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM download_history")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    async fn latest_by_url(&self, url: &str) -> Result<Option<HistoryEntryDbModel>> {
        let entry = sqlx::query_as::<_, HistoryEntryDbModel>(
            "SELECT * FROM download_history WHERE url = ? ORDER BY downloaded_at DESC LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn delete(&self, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM download_history")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Transactional operations for download history.
///
/// These methods operate within an existing transaction and do NOT
/// commit; the manager uses them so a completed queue item and its
/// history entry land atomically.
pub struct HistoryTxOps;

impl HistoryTxOps {
    pub async fn insert(tx: &mut SqliteConnection, entry: &HistoryEntryDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO download_history
                (id, url, title, file_path, file_size, format_id, duration, uploader, downloaded_at, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.url)
        .bind(&entry.title)
        .bind(&entry.file_path)
        .bind(entry.file_size)
        .bind(&entry.format_id)
        .bind(entry.duration)
        .bind(&entry.uploader)
        .bind(&entry.downloaded_at)
        .bind(&entry.status)
        .bind(&entry.created_at)
        .bind(&entry.updated_at)
        .execute(tx)
        .await?;
        Ok(())
    }
}
