mod analytics;
mod click;
mod link;

pub use analytics::{
    AnalyticsBody, AnalyticsSnapshot, MinuteBody, MinuteBucket, MinuteRow, UserAgentClicks,
};
pub use click::ClickEvent;
pub use link::{CreateLinkRequest, Link, LinkBody, NewLink};
