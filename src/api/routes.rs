use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::analytics::AnalyticsAggregator;
use crate::links::LinkDirectory;

use super::handlers::{create_link, get_analytics, get_link, health_check, AppState};

pub fn create_api_router(
    directory: Arc<LinkDirectory>,
    aggregator: Arc<AnalyticsAggregator>,
) -> Router {
    let state = Arc::new(AppState {
        directory,
        aggregator,
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/shorten", post(create_link))
        .route("/links/{code}", get(get_link))
        .route("/analytics/{code}", get(get_analytics))
        .with_state(state)
}
