pub mod analytics;
pub mod api;
pub mod cache;
pub mod clicks;
pub mod config;
pub mod error;
pub mod links;
pub mod models;
pub mod redirect;
pub mod storage;

pub use error::{ShortenerError, ShortenerResult};
