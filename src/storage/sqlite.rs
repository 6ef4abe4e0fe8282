use crate::models::{ClickEvent, Link, MinuteRow, NewLink};
use crate::storage::rows::{collect_rows, LinkRow, MinuteRowRaw};
use crate::storage::{
    AnalyticsReader, AnalyticsStore, LinkStore, StorageError, StorageResult,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Rows per INSERT statement; three bind parameters each keeps us under
/// SQLite's 999 variable limit.
const INSERT_CHUNK_ROWS: usize = 300;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .with_context(|| format!("failed to connect to {database_url}"))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl LinkStore for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                short_code TEXT PRIMARY KEY NOT NULL,
                source_url TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_created_at ON links(created_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Link>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT short_code, source_url, created_at
            FROM links
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        collect_rows(rows)
    }

    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT short_code, source_url, created_at
            FROM links
            WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Link::try_from).transpose()
    }

    async fn create(&self, link: &NewLink) -> StorageResult<Link> {
        let created_at = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO links (short_code, source_url, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(short_code) DO NOTHING
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.source_url)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let row = LinkRow {
            short_code: link.short_code.clone(),
            source_url: link.source_url.clone(),
            created_at,
        };
        Ok(Link::try_from(row)?)
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM links WHERE short_code = ?
            "#,
        )
        .bind(short_code)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count > 0)
    }
}

#[async_trait]
impl AnalyticsStore for SqliteStorage {
    async fn init_analytics(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                click_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_clicks_code_time ON clicks(short_code, click_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_batch(&self, events: &[ClickEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in events.chunks(INSERT_CHUNK_ROWS) {
            let mut builder =
                QueryBuilder::<Sqlite>::new("INSERT INTO clicks (short_code, user_agent, click_at) ");
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.short_code.clone())
                    .push_bind(event.user_agent.clone())
                    .push_bind(event.click_at.timestamp());
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn read_snapshot(&self) -> Result<Box<dyn AnalyticsReader>> {
        // A deferred transaction pins one read snapshot for every query it runs
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteSnapshot { tx: Mutex::new(tx) }))
    }
}

struct SqliteSnapshot {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl AnalyticsReader for SqliteSnapshot {
    async fn unique_user_agents(&self, short_code: &str) -> Result<i64> {
        let mut tx = self.tx.lock().await;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT user_agent) FROM clicks WHERE short_code = ?",
        )
        .bind(short_code)
        .fetch_one(&mut **tx)
        .await?;

        Ok(count)
    }

    async fn minute_rows(&self, short_code: &str) -> Result<Vec<MinuteRow>> {
        let mut tx = self.tx.lock().await;
        let rows = sqlx::query_as::<_, MinuteRowRaw>(
            r#"
            SELECT (click_at / 60) * 60 AS minute, user_agent, COUNT(*) AS clicks
            FROM clicks
            WHERE short_code = ?
            GROUP BY minute, user_agent
            ORDER BY minute DESC, user_agent ASC
            "#,
        )
        .bind(short_code)
        .fetch_all(&mut **tx)
        .await?;

        collect_rows(rows)
    }
}
