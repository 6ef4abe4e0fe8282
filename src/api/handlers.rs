use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::AnalyticsAggregator;
use crate::error::ShortenerError;
use crate::links::LinkDirectory;
use crate::models::{AnalyticsBody, CreateLinkRequest, LinkBody};

pub struct AppState {
    pub directory: Arc<LinkDirectory>,
    pub aggregator: Arc<AnalyticsAggregator>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Create a new short link
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<LinkBody>), ShortenerError> {
    let new_link = payload.into_new_link()?;
    let link = state.directory.create(new_link).await?;
    tracing::info!(short_code = %link.short_code, "created link");

    Ok((StatusCode::CREATED, Json(LinkBody::from(&link))))
}

/// Get a link by short code without recording a click
pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<LinkBody>, ShortenerError> {
    let link = state.directory.resolve(&code).await?;
    Ok(Json(LinkBody::from(&link)))
}

/// Minute-by-minute click analytics for a link
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<AnalyticsBody>, ShortenerError> {
    let link = state.directory.resolve(&code).await?;
    let snapshot = state.aggregator.get_analytics(&code).await?;

    Ok(Json(AnalyticsBody::from(snapshot.with_link(link))))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
