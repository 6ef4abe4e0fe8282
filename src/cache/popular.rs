use crate::cache::PopularityCache;
use crate::models::Link;
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Moka-backed popularity cache.
///
/// Usage counters live in their own bounded cache so links that never get
/// popular are eventually forgotten.
pub struct MokaPopularityCache {
    entries: Cache<String, Link>,
    usage: Cache<String, Arc<AtomicU64>>,
    min_uses_before_caching: i64,
}

impl MokaPopularityCache {
    pub fn new(max_entries: u64, ttl: Duration, min_uses_before_caching: i64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        // Track more candidates than we keep so admission has some history
        let usage = Cache::builder()
            .max_capacity(max_entries.saturating_mul(4).max(1))
            .time_to_idle(ttl)
            .build();

        Self {
            entries,
            usage,
            min_uses_before_caching,
        }
    }

    /// Current usage count for a link that has not been admitted yet
    pub async fn usage_count(&self, short_code: &str) -> u64 {
        self.usage
            .get(short_code)
            .await
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[async_trait]
impl PopularityCache for MokaPopularityCache {
    async fn get(&self, short_code: &str) -> Result<Option<Link>> {
        Ok(self.entries.get(short_code).await)
    }

    async fn save(&self, link: &Link) -> Result<()> {
        self.entries
            .insert(link.short_code.clone(), link.clone())
            .await;
        Ok(())
    }

    async fn increment_usage(&self, link: &Link, delta: u64) -> Result<()> {
        let counter = self
            .usage
            .get_with(link.short_code.clone(), async { Arc::new(AtomicU64::new(0)) })
            .await;
        let uses = counter.fetch_add(delta, Ordering::Relaxed) + delta;

        if uses as i64 >= self.min_uses_before_caching {
            tracing::debug!(short_code = %link.short_code, uses, "admitting link into cache");
            self.save(link).await?;
            self.usage.invalidate(&link.short_code).await;
        }

        Ok(())
    }

    fn min_uses_before_caching(&self) -> i64 {
        self.min_uses_before_caching
    }
}
