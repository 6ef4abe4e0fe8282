//! Popularity cache consumed by the link directory.
//!
//! Entries are admitted only after a link has been resolved from storage
//! `min_uses_before_caching` times, so one-off lookups never displace hot
//! links.

pub mod popular;

pub use popular::MokaPopularityCache;

use crate::models::Link;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait PopularityCache: Send + Sync {
    /// Look up a cached link; `None` on a miss
    async fn get(&self, short_code: &str) -> Result<Option<Link>>;

    /// Admit a link unconditionally
    async fn save(&self, link: &Link) -> Result<()>;

    /// Record `delta` uses of a link, admitting it once it is popular enough
    async fn increment_usage(&self, link: &Link, delta: u64) -> Result<()>;

    /// Uses required before a link is admitted; below 1 means admit on create
    fn min_uses_before_caching(&self) -> i64;
}
