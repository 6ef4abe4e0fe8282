use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Redirect,
};
use std::sync::Arc;

use crate::clicks::ClickPipeline;
use crate::error::ShortenerError;
use crate::links::LinkDirectory;
use crate::models::ClickEvent;

pub struct RedirectState {
    pub directory: Arc<LinkDirectory>,
    pub clicks: Arc<ClickPipeline>,
}

/// Redirect to the source URL and record the click
pub async fn redirect_link(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Redirect, ShortenerError> {
    let link = state.directory.resolve(&code).await?;

    // Missing or non-UTF-8 agents are recorded as empty and skipped by analytics
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    tracing::debug!(short_code = %code, user_agent, "redirect");

    state.clicks.submit(ClickEvent::new(code, user_agent));

    Ok(Redirect::permanent(&link.source_url))
}
