//! Detection Repository
//!
//! Database access layer for captured evidence (`detections`)

use crate::error::Result;
use sqlx::SqlitePool;

/// Stored evidence row
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DetectionRow {
    pub id: i64,
    pub image: Vec<u8>,
    /// KST, `%Y-%m-%dT%H:%M:%SKST`
    pub timestamp: String,
}

/// Detection repository for database operations
#[derive(Clone)]
pub struct DetectionRepository {
    pool: SqlitePool,
}

impl DetectionRepository {
    /// Create new repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `detections` table if missing
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                image BLOB,
                timestamp DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert one captured frame, returns the row id
    pub async fn insert(&self, image: &[u8], timestamp: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO detections (image, timestamp) VALUES (?, ?)")
            .bind(image)
            .bind(timestamp)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Rows with `start <= timestamp <= end`, oldest first
    pub async fn between(&self, start: &str, end: &str) -> Result<Vec<DetectionRow>> {
        let rows = sqlx::query_as::<_, DetectionRow>(
            r#"
            SELECT id, image, timestamp
            FROM detections
            WHERE timestamp BETWEEN ? AND ?
            ORDER BY timestamp, id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repository() -> DetectionRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repository = DetectionRepository::new(pool);
        repository.ensure_table().await.unwrap();
        repository
    }

    #[tokio::test]
    async fn test_insert_and_range_query() {
        let repository = repository().await;
        repository.insert(&[0xFF, 0xD8, 0x01], "2025-06-01T12:00:00KST").await.unwrap();
        repository.insert(&[0xFF, 0xD8, 0x02], "2025-06-01T12:30:00KST").await.unwrap();
        let id = repository.insert(&[0xFF, 0xD8, 0x03], "2025-06-02T09:00:00KST").await.unwrap();
        assert_eq!(id, 3);
        assert_eq!(repository.count().await.unwrap(), 3);

        let rows = repository
            .between("2025-06-01T00:00:00KST", "2025-06-01T23:59:59KST")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].image, vec![0xFF, 0xD8, 0x01]);
        assert_eq!(rows[1].timestamp, "2025-06-01T12:30:00KST");

        // Inclusive bounds
        let rows = repository
            .between("2025-06-02T09:00:00KST", "2025-06-02T09:00:00KST")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 3);
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let repository = repository().await;
        repository.ensure_table().await.unwrap();
        assert_eq!(repository.count().await.unwrap(), 0);
    }
}
