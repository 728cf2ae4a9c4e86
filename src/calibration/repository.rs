//! Calibration Repository
//!
//! Database access layer for anchor pairs (`baseLines`) and rule lines (`lines`)

use crate::error::Result;
use sqlx::SqlitePool;

/// Maximum number of rule lines read from the store
pub const MAX_RULE_LINES: i64 = 8;

/// Anchor pair row, analytics-resolution coordinates
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AnchorPairRow {
    pub id_a: i64,
    pub x_a: i64,
    pub y_a: i64,
    pub id_b: i64,
    pub x_b: i64,
    pub y_b: i64,
}

/// Rule line row, analytics-resolution coordinates
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RuleLineRow {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    pub name: String,
    pub mode: Option<String>,
}

/// Calibration repository for database operations
#[derive(Clone)]
pub struct CalibrationRepository {
    pool: SqlitePool,
}

impl CalibrationRepository {
    /// Create new repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create calibration tables if missing
    ///
    /// A fresh store then loads as empty geometry instead of failing on SQL.
    pub async fn ensure_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS baseLines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                matrixNum1 INTEGER NOT NULL,
                x1 INTEGER NOT NULL,
                y1 INTEGER NOT NULL,
                matrixNum2 INTEGER NOT NULL,
                x2 INTEGER NOT NULL,
                y2 INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lines (
                indexNum INTEGER PRIMARY KEY NOT NULL,
                x1 INTEGER NOT NULL,
                y1 INTEGER NOT NULL,
                x2 INTEGER NOT NULL,
                y2 INTEGER NOT NULL,
                name TEXT NOT NULL UNIQUE,
                mode TEXT,
                leftMatrixNum INTEGER,
                rightMatrixNum INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================
    // Anchor pairs
    // ========================================

    /// Get all anchor pair rows in insertion order
    pub async fn get_anchor_pairs(&self) -> Result<Vec<AnchorPairRow>> {
        let rows = sqlx::query_as::<_, AnchorPairRow>(
            r#"
            SELECT matrixNum1 AS id_a, x1 AS x_a, y1 AS y_a,
                   matrixNum2 AS id_b, x2 AS x_b, y2 AS y_b
            FROM baseLines
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Insert an anchor pair row
    pub async fn insert_anchor_pair(&self, row: &AnchorPairRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO baseLines (matrixNum1, x1, y1, matrixNum2, x2, y2) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id_a)
        .bind(row.x_a)
        .bind(row.y_a)
        .bind(row.id_b)
        .bind(row.x_b)
        .bind(row.y_b)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================
    // Rule lines
    // ========================================

    /// Get rule line rows (at most MAX_RULE_LINES)
    pub async fn get_rule_lines(&self) -> Result<Vec<RuleLineRow>> {
        let rows = sqlx::query_as::<_, RuleLineRow>(
            "SELECT x1, y1, x2, y2, name, mode FROM lines ORDER BY indexNum LIMIT ?",
        )
        .bind(MAX_RULE_LINES)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Insert a rule line row
    pub async fn insert_rule_line(&self, index: i64, row: &RuleLineRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO lines (indexNum, x1, y1, x2, y2, name, mode) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(index)
        .bind(row.x1)
        .bind(row.y1)
        .bind(row.x2)
        .bind(row.y2)
        .bind(&row.name)
        .bind(&row.mode)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
