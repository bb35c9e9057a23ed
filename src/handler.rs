//! Handler-facing types: what user code receives and returns
//!
//! Tools declare their execution style up front: a [`ToolHandler::Direct`]
//! handler resolves once, a [`ToolHandler::Stepwise`] handler produces a
//! [`StepSource`] that the progress executor pulls step by step.

use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::uri_template::UriParams;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Value produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
}

impl Content {
    /// Serializes any `Serialize` value. Dates from `chrono` come out as
    /// RFC 3339 strings through their serde impls.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Text form used for tool results: strings as-is, JSON compact, bytes
    /// as base64.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(Value::String(text)) => text.clone(),
            Self::Json(value) => safe_serialize(value),
            Self::Bytes(bytes) => BASE64.encode(bytes),
        }
    }
}

/// Compact JSON text for a value. `Value` trees cannot be cyclic.
pub fn safe_serialize(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[Unserializable]".to_string())
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Failure raised by user handler code. `trace` holds optional diagnostic
/// detail (for example a captured backtrace) that is only surfaced in debug
/// mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    trace: Option<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

fn box_output<Fut, T, E>(fut: Fut) -> BoxFuture<Result<Content, HandlerError>>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Into<Content>,
    E: Into<HandlerError>,
{
    Box::pin(async move {
        let output: Result<Content, HandlerError> = match fut.await {
            Ok(value) => Ok(value.into()),
            Err(err) => Err(err.into()),
        };
        output
    })
}

/// Runs a handler future on its own task so a panic surfaces as a
/// [`HandlerError`] instead of tearing down the request.
pub async fn run_isolated<F, T>(fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(HandlerError::new("handler panicked")),
        Err(_) => Err(HandlerError::new("handler was cancelled")),
    }
}

pub enum Step {
    /// Intermediate value. Only `{"type": "progress", ...}` objects are
    /// reported; anything else is dropped.
    Yield(Value),
    Done(Content),
}

impl Step {
    pub fn progress() -> Self {
        Self::Yield(json!({ "type": "progress" }))
    }

    pub fn progress_message(message: impl Into<String>) -> Self {
        Self::Yield(json!({ "type": "progress", "message": message.into() }))
    }

    pub fn done(content: impl Into<Content>) -> Self {
        Self::Done(content.into())
    }
}

#[async_trait]
pub trait StepSource: Send {
    async fn next_step(&mut self) -> Result<Step, HandlerError>;
}

pub type DirectToolFn = Arc<dyn Fn(Value) -> BoxFuture<Result<Content, HandlerError>> + Send + Sync>;
pub type StepwiseToolFn = Arc<dyn Fn(Value) -> Box<dyn StepSource> + Send + Sync>;

#[derive(Clone)]
pub enum ToolHandler {
    Direct(DirectToolFn),
    Stepwise(StepwiseToolFn),
}

impl ToolHandler {
    pub fn direct<F, Fut, T, E>(handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Into<Content>,
        E: Into<HandlerError>,
    {
        Self::Direct(Arc::new(
            move |args: Value| -> BoxFuture<Result<Content, HandlerError>> {
                box_output(handler(args))
            },
        ))
    }

    pub fn stepwise<F, S>(handler: F) -> Self
    where
        F: Fn(Value) -> S + Send + Sync + 'static,
        S: StepSource + 'static,
    {
        Self::Stepwise(Arc::new(move |args: Value| -> Box<dyn StepSource> {
            Box::new(handler(args))
        }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Stepwise(_) => "stepwise",
        }
    }
}

pub type ResourceFn =
    Arc<dyn Fn(UriParams) -> BoxFuture<Result<Content, HandlerError>> + Send + Sync>;

pub fn resource_handler<F, Fut, T, E>(handler: F) -> ResourceFn
where
    F: Fn(UriParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Into<Content>,
    E: Into<HandlerError>,
{
    Arc::new(
        move |params: UriParams| -> BoxFuture<Result<Content, HandlerError>> {
            box_output(handler(params))
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: PromptContent,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: PromptContent::Text { text: text.into() },
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: PromptContent::Text { text: text.into() },
        }
    }
}

pub type PromptFn =
    Arc<dyn Fn(Value) -> BoxFuture<Result<Vec<PromptMessage>, HandlerError>> + Send + Sync>;

pub fn prompt_handler<F, Fut, E>(handler: F) -> PromptFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<PromptMessage>, E>> + Send + 'static,
    E: Into<HandlerError>,
{
    Arc::new(
        move |args: Value| -> BoxFuture<Result<Vec<PromptMessage>, HandlerError>> {
            let fut = handler(args);
            Box::pin(async move {
                let messages: Result<Vec<PromptMessage>, HandlerError> =
                    fut.await.map_err(Into::into);
                messages
            })
        },
    )
}

/// Custom completion callback: `(argument name, partial value) -> candidates`.
/// Completion runs inline on the request path, so it is synchronous.
pub type CompleteFn = Arc<dyn Fn(&str, &str) -> Vec<String> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_text_passes_strings_through() {
        assert_eq!(Content::from("hello").to_text(), "hello");
        assert_eq!(Content::from(json!("hello")).to_text(), "hello");
    }

    #[test]
    fn tool_text_serializes_other_values_compactly() {
        assert_eq!(Content::from(json!(8)).to_text(), "8");
        assert_eq!(
            Content::from(json!({"sum": 8, "ok": true})).to_text(),
            r#"{"sum":8,"ok":true}"#
        );
        assert_eq!(Content::from(vec![1u8, 2, 3]).to_text(), "AQID");
    }

    #[test]
    fn chrono_dates_serialize_as_rfc3339() {
        let date = chrono::DateTime::parse_from_rfc3339("2026-02-27T00:00:00Z")
            .expect("valid date")
            .with_timezone(&chrono::Utc);
        let record = std::collections::BTreeMap::from([("at", date)]);
        let content = Content::json(&record).expect("serializable");
        assert_eq!(content.to_text(), r#"{"at":"2026-02-27T00:00:00Z"}"#);
    }

    #[test]
    fn handler_error_keeps_trace_separately() {
        let error = HandlerError::new("failed").with_trace("frame 0");
        assert_eq!(error.to_string(), "failed");
        assert_eq!(error.trace(), Some("frame 0"));
    }

    #[tokio::test]
    async fn direct_handler_converts_outputs_and_errors() {
        let ToolHandler::Direct(ok) = ToolHandler::direct(|args: Value| async move {
            Ok::<_, HandlerError>(json!(args["a"].as_i64().unwrap_or(0) * 2))
        }) else {
            panic!("expected direct handler");
        };
        assert_eq!(ok(json!({"a": 4})).await, Ok(Content::Json(json!(8))));

        let ToolHandler::Direct(failing) =
            ToolHandler::direct(|_args: Value| async move { Err::<String, _>("nope") })
        else {
            panic!("expected direct handler");
        };
        assert_eq!(failing(json!({})).await, Err(HandlerError::new("nope")));
    }

    #[tokio::test]
    async fn panicking_handlers_become_errors() {
        let result: Result<Content, HandlerError> = run_isolated(async {
            if true {
                panic!("boom");
            }
            Ok(Content::from("unreachable"))
        })
        .await;
        assert_eq!(result, Err(HandlerError::new("handler panicked")));

        let ok = run_isolated(async { Ok::<_, HandlerError>(3) }).await;
        assert_eq!(ok, Ok(3));
    }
}
