//! Minute-bucketed click aggregation

use std::sync::Arc;

use anyhow::Context;
use tracing::error;

use crate::error::{ShortenerError, ShortenerResult};
use crate::models::{AnalyticsSnapshot, MinuteBucket, MinuteRow, UserAgentClicks};
use crate::storage::AnalyticsStore;

pub struct AnalyticsAggregator {
    store: Arc<dyn AnalyticsStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    /// Build the click summary for a short code.
    ///
    /// Both queries read the same store snapshot and must succeed. The
    /// returned snapshot has no `link`; callers attach it themselves.
    pub async fn get_analytics(&self, short_code: &str) -> ShortenerResult<AnalyticsSnapshot> {
        let reader = self
            .store
            .read_snapshot()
            .await
            .context("failed to open analytics snapshot")
            .map_err(ShortenerError::StoreUnavailable)?;

        let (unique_user_agents, rows) = tokio::try_join!(
            reader.unique_user_agents(short_code),
            reader.minute_rows(short_code),
        )
        .with_context(|| format!("failed to query analytics for '{short_code}'"))
        .map_err(ShortenerError::StoreUnavailable)?;

        Ok(AnalyticsSnapshot {
            link: None,
            unique_user_agents,
            buckets: group_minute_rows(rows),
        })
    }
}

/// Fold rows ordered by minute into one bucket per minute.
///
/// Every row counts toward its minute's total. Rows with an empty user agent
/// get no breakdown entry; that is logged once per call, not per row.
pub fn group_minute_rows(rows: impl IntoIterator<Item = MinuteRow>) -> Vec<MinuteBucket> {
    let mut buckets = Vec::new();
    let mut current: Option<MinuteBucket> = None;
    let mut reported_invalid = false;

    for row in rows {
        let starts_new_minute = current
            .as_ref()
            .map_or(true, |bucket| bucket.minute != row.minute);
        if starts_new_minute {
            if let Some(done) = current.take() {
                buckets.push(done);
            }
            current = Some(MinuteBucket {
                minute: row.minute,
                clicks_in_minute: 0,
                user_agents: Vec::new(),
            });
        }

        let Some(bucket) = current.as_mut() else {
            continue;
        };
        bucket.clicks_in_minute += row.clicks;

        if row.user_agent.trim().is_empty() {
            if !reported_invalid {
                error!("analytics rows contain empty user agents");
                reported_invalid = true;
            }
            continue;
        }

        bucket.user_agents.push(UserAgentClicks {
            user_agent: row.user_agent,
            clicks: row.clicks,
        });
    }

    if let Some(done) = current {
        buckets.push(done);
    }

    buckets
}
