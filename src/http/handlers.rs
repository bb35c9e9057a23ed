//! Axum HTTP handlers for the web server
//!
//! Provides the Model Context Protocol endpoint and the metadata endpoints.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    BoxError, Json,
};
use http_body_util::LengthLimitError;
use serde::Serialize;

use crate::errors::McpError;
use crate::security::SizeError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
    })
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
}

/// Only the length limit is a size error; anything else that interrupts the
/// read (a client disconnect, a broken chunk) is reported as a parse error.
fn body_read_error(err: axum::Error, limit: usize) -> McpError {
    // `to_bytes` nests the limit error inside one or more `axum::Error` layers.
    let mut source: BoxError = err.into_inner();
    loop {
        match source.downcast::<axum::Error>() {
            Ok(wrapped) => source = wrapped.into_inner(),
            Err(other) => {
                source = other;
                break;
            }
        }
    }

    if source.is::<LengthLimitError>() {
        McpError::from(SizeError::RequestStream { limit })
    } else {
        McpError::parse(format!("request body could not be read: {source}"), b"")
    }
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let response = handle_mcp(&state, method, &headers, body).await;
    state.server.logs().flush();
    response
}

async fn handle_mcp(state: &AppState, method: Method, headers: &HeaderMap, body: Body) -> Response {
    if method != Method::POST {
        return McpError::MethodNotAllowed {
            method: method.to_string(),
        }
        .into_response();
    }

    let limit = state.server.config().max_request_bytes;
    if let Some(actual) = declared_length(headers).filter(|length| *length > limit) {
        return McpError::from(SizeError::Request { actual, limit }).into_response();
    }

    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(error = %err, "request body read aborted");
            return body_read_error(err, limit).into_response();
        }
    };

    match state.server.handle_body(&bytes).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
