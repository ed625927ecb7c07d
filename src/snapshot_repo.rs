// SQLite snapshot store. One append-only table partitioned by the source
// column; payloads stored as JSON text (dynamic two-level maps).

use crate::models::{Payload, Snapshot, Source};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub struct SnapshotRepo {
    pool: SqlitePool,
}

impl SnapshotRepo {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_source_created_at ON snapshots(source, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append one snapshot. Never updates existing rows.
    #[instrument(skip(self, payload), fields(repo = "snapshot", operation = "insert", source = %source))]
    pub async fn insert(
        &self,
        source: Source,
        timestamp_ms: i64,
        payload: &Payload,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string(payload)?;
        sqlx::query("INSERT INTO snapshots (source, created_at, payload) VALUES ($1, $2, $3)")
            .bind(source.as_str())
            .bind(timestamp_ms)
            .bind(&json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent snapshot for a source by timestamp.
    pub async fn latest(&self, source: Source) -> anyhow::Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT created_at, payload FROM snapshots WHERE source = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| parse_snapshot_row(source, &r)).transpose()
    }

    /// Least recent snapshot for a source by timestamp.
    pub async fn earliest(&self, source: Source) -> anyhow::Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT created_at, payload FROM snapshots WHERE source = $1 ORDER BY created_at ASC, id ASC LIMIT 1",
        )
        .bind(source.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| parse_snapshot_row(source, &r)).transpose()
    }

    /// Snapshots in [start_ms, end_ms], ascending by timestamp. Either bound
    /// may be None (unbounded on that side). A fresh query per call.
    #[instrument(skip(self), fields(repo = "snapshot", operation = "query_range", source = %source))]
    pub async fn query_range(
        &self,
        source: Source,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> anyhow::Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT created_at, payload FROM snapshots
             WHERE source = $1 AND created_at >= $2 AND created_at <= $3
             ORDER BY created_at ASC, id ASC",
        )
        .bind(source.as_str())
        .bind(start_ms.unwrap_or(i64::MIN))
        .bind(end_ms.unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_snapshot_row(source, &row)?);
        }
        Ok(out)
    }

    /// All snapshots for a source, newest first (raw mode).
    #[instrument(skip(self), fields(repo = "snapshot", operation = "query_all_desc", source = %source))]
    pub async fn query_all_desc(&self, source: Source) -> anyhow::Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT created_at, payload FROM snapshots WHERE source = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(source.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_snapshot_row(source, &row)?);
        }
        Ok(out)
    }

    /// Bounded random pre-sample within [start_ms, end_ms], pushed down to
    /// SQLite. Returned ascending by timestamp so callers can bucket directly.
    #[instrument(skip(self), fields(repo = "snapshot", operation = "sample", source = %source, limit))]
    pub async fn sample(
        &self,
        source: Source,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
        limit: u32,
    ) -> anyhow::Result<Vec<Snapshot>> {
        let rows = sqlx::query(
            "SELECT created_at, payload FROM (
                 SELECT id, created_at, payload FROM snapshots
                 WHERE source = $1 AND created_at >= $2 AND created_at <= $3
                 ORDER BY RANDOM() LIMIT $4
             ) ORDER BY created_at ASC, id ASC",
        )
        .bind(source.as_str())
        .bind(start_ms.unwrap_or(i64::MIN))
        .bind(end_ms.unwrap_or(i64::MAX))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(parse_snapshot_row(source, &row)?);
        }
        Ok(out)
    }

    pub async fn count(&self, source: Source) -> anyhow::Result<u64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM snapshots WHERE source = $1")
            .bind(source.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    /// Administrative bulk delete; returns the number of rows removed.
    #[instrument(skip(self), fields(repo = "snapshot", operation = "delete_all", source = %source))]
    pub async fn delete_all(&self, source: Source) -> anyhow::Result<u64> {
        let r = sqlx::query("DELETE FROM snapshots WHERE source = $1")
            .bind(source.as_str())
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}

fn parse_snapshot_row(source: Source, row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Snapshot> {
    let created_at: i64 = row.try_get("created_at")?;
    let json: String = row.try_get("payload")?;
    let payload: Payload = serde_json::from_str(&json)
        .map_err(|e| anyhow::anyhow!("payload deserialize for {}: {}", source, e))?;
    Ok(Snapshot {
        source,
        timestamp_ms: created_at,
        payload,
    })
}
