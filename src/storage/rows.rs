//! Row types shared by the SQL backends.
//!
//! Timestamps are stored as unix seconds in both backends.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::models::{Link, MinuteRow};

#[derive(Debug, FromRow)]
pub(crate) struct LinkRow {
    pub short_code: String,
    pub source_url: String,
    pub created_at: i64,
}

impl TryFrom<LinkRow> for Link {
    type Error = anyhow::Error;

    fn try_from(row: LinkRow) -> Result<Self> {
        Ok(Link {
            created_at: from_unix(row.created_at)?,
            short_code: row.short_code,
            source_url: row.source_url,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MinuteRowRaw {
    pub minute: i64,
    pub user_agent: String,
    pub clicks: i64,
}

impl TryFrom<MinuteRowRaw> for MinuteRow {
    type Error = anyhow::Error;

    fn try_from(row: MinuteRowRaw) -> Result<Self> {
        Ok(MinuteRow {
            minute: from_unix(row.minute)?,
            user_agent: row.user_agent,
            clicks: row.clicks,
        })
    }
}

pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("timestamp out of range: {secs}"))
}

pub(crate) fn collect_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Truncate a timestamp to the start of its minute
pub(crate) fn minute_of(at: DateTime<Utc>) -> i64 {
    let secs = at.timestamp();
    secs - secs.rem_euclid(60)
}
