use std::sync::Arc;

use axum::{
    middleware,
    routing::{any, get},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod handler;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod progress;
pub mod registry;
pub mod schema;
pub mod security;
pub mod uri_template;

use mcp::server::McpServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
}

impl AppState {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/mcp", any(http::handlers::mcp_endpoint))
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .layer(middleware::from_fn(
            security::headers::security_headers_middleware,
        ))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
