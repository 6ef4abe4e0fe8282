use crate::models::{ClickEvent, Link, MinuteRow, NewLink};
use crate::storage::rows::{collect_rows, LinkRow, MinuteRowRaw};
use crate::storage::{
    AnalyticsReader, AnalyticsStore, LinkStore, StorageError, StorageResult,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Rows per INSERT statement, well below the 65535 bind parameter limit
const INSERT_CHUNK_ROWS: usize = 5_000;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to postgres")?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl LinkStore for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                short_code TEXT PRIMARY KEY,
                source_url TEXT NOT NULL,
                created_at BIGINT NOT NULL
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
            WHERE short_code = $1
            "#,
        )
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Link::try_from).transpose()
    }

    async fn create(&self, link: &NewLink) -> StorageResult<Link> {
        let created_at = Utc::now().timestamp();

        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            INSERT INTO links (short_code, source_url, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (short_code) DO NOTHING
            RETURNING short_code, source_url, created_at
            "#,
        )
        .bind(&link.short_code)
        .bind(&link.source_url)
        .bind(created_at)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        match row {
            Some(row) => Ok(Link::try_from(row)?),
            None => Err(StorageError::Conflict),
        }
    }

    async fn exists(&self, short_code: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM links WHERE short_code = $1)",
        )
        .bind(short_code)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl AnalyticsStore for PostgresStorage {
    async fn init_analytics(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id BIGSERIAL PRIMARY KEY,
                short_code TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                click_at BIGINT NOT NULL
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
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO clicks (short_code, user_agent, click_at) ",
            );
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
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PostgresSnapshot { tx: Mutex::new(tx) }))
    }
}

struct PostgresSnapshot {
    tx: Mutex<Transaction<'static, Postgres>>,
}

#[async_trait]
impl AnalyticsReader for PostgresSnapshot {
    async fn unique_user_agents(&self, short_code: &str) -> Result<i64> {
        let mut tx = self.tx.lock().await;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT user_agent) FROM clicks WHERE short_code = $1",
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
            WHERE short_code = $1
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
