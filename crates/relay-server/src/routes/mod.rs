// Export route modules
pub mod chat;
pub mod pages;

use crate::configuration::ServerSettings;
use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

// Function to configure all routes
pub fn configure(state: AppState, settings: &ServerSettings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(pages::routes(&settings.static_dir))
        .merge(chat::routes(state))
        .layer(DefaultBodyLimit::max(settings.body_limit_bytes))
        // Bounds the wait for the response head only, streamed bodies run until the model stops
        .layer(TimeoutLayer::new(Duration::from_secs(
            settings.request_timeout_secs,
        )))
        .layer(cors)
}
