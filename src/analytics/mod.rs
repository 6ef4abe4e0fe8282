//! Query-time click analytics.
//!
//! Raw click rows are grouped by the store into (minute, user agent) counts;
//! [`AnalyticsAggregator`] folds those into per-minute buckets.

pub mod aggregator;

pub use aggregator::{group_minute_rows, AnalyticsAggregator};
