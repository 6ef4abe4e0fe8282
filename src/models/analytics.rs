//! Analytics read models

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Link;

/// One row of the grouped click query: clicks by (minute, user agent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuteRow {
    /// Click time truncated to the minute
    pub minute: DateTime<Utc>,
    pub user_agent: String,
    pub clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAgentClicks {
    pub user_agent: String,
    pub clicks: i64,
}

/// Clicks recorded within one minute.
///
/// `clicks_in_minute` counts every click, including those whose user agent
/// was rejected and therefore has no entry in `user_agents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuteBucket {
    pub minute: DateTime<Utc>,
    pub clicks_in_minute: i64,
    pub user_agents: Vec<UserAgentClicks>,
}

/// Read-time projection of a link's click history.
///
/// `link` is left empty by the aggregator; callers fill it in from the
/// link directory.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsSnapshot {
    pub link: Option<Link>,
    pub unique_user_agents: i64,
    /// Ordered by minute, newest first
    pub buckets: Vec<MinuteBucket>,
}

impl AnalyticsSnapshot {
    pub fn with_link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }

    pub fn total_clicks(&self) -> i64 {
        self.buckets.iter().map(|b| b.clicks_in_minute).sum()
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyticsBody {
    pub source_url: String,
    pub short_url: String,
    pub total_redirects: i64,
    pub unique_user_agents: i64,
    pub data: Vec<MinuteBody>,
}

#[derive(Debug, Serialize)]
pub struct MinuteBody {
    pub minute_timestamp: String,
    pub clicks_in_minute: i64,
    pub data: Vec<UserAgentClicks>,
}

impl From<AnalyticsSnapshot> for AnalyticsBody {
    fn from(snapshot: AnalyticsSnapshot) -> Self {
        let total_redirects = snapshot.total_clicks();
        let (source_url, short_url) = snapshot
            .link
            .map(|link| (link.source_url, link.short_code))
            .unwrap_or_default();
        let data = snapshot
            .buckets
            .into_iter()
            .map(|bucket| MinuteBody {
                minute_timestamp: bucket.minute.to_rfc3339(),
                clicks_in_minute: bucket.clicks_in_minute,
                data: bucket.user_agents,
            })
            .collect();

        Self {
            source_url,
            short_url,
            total_redirects,
            unique_user_agents: snapshot.unique_user_agents,
            data,
        }
    }
}
