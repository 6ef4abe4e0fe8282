use chrono::{DateTime, Utc};

/// A single redirect, recorded for analytics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    pub short_code: String,
    /// Raw `User-Agent` header; may be empty
    pub user_agent: String,
    pub click_at: DateTime<Utc>,
}

impl ClickEvent {
    pub fn new(short_code: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            user_agent: user_agent.into(),
            click_at: Utc::now(),
        }
    }
}
