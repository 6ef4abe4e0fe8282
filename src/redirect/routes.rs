use axum::{routing::get, Router};
use std::sync::Arc;

use crate::clicks::ClickPipeline;
use crate::links::LinkDirectory;

use super::handlers::{redirect_link, RedirectState};

pub fn create_redirect_router(directory: Arc<LinkDirectory>, clicks: Arc<ClickPipeline>) -> Router {
    let state = Arc::new(RedirectState { directory, clicks });

    Router::new()
        .route("/s/{code}", get(redirect_link))
        .with_state(state)
}
