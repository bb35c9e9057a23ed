use std::{
    collections::VecDeque,
    fmt,
    str::FromStr,
    sync::{Mutex, PoisonError},
    time::Instant,
};

use axum::{extract::Request, middleware::Next, response::Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    subscriber_fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.is_client_error() {
        warn!(method = %method, path = %path, status = status.as_u16(), "request rejected");
    }

    response
}

/// Syslog severities accepted by `logging/setLevel`, least severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level `{0}`")]
pub struct UnknownLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            _ => Err(UnknownLevel(value.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub fields: Value,
}

struct BufferState {
    entries: VecDeque<LogEntry>,
    min_level: LogLevel,
}

/// Bounded in-memory log of protocol events. The oldest entry is evicted once
/// `capacity` is reached.
pub struct LogBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                entries: VecDeque::new(),
                min_level: LogLevel::Info,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, level: LogLevel, message: impl Into<String>, fields: Value) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if level < state.min_level {
            return;
        }
        if state.entries.len() >= self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields,
        });
    }

    pub fn set_level(&self, level: LogLevel) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .min_level = level;
    }

    pub fn level(&self) -> LogLevel {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .min_level
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the buffer, returning the entries oldest first.
    pub fn drain(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .drain(..)
            .collect()
    }

    /// Drains the buffer into `tracing`. Returns how many entries were emitted.
    pub fn flush(&self) -> usize {
        let entries = self.drain();
        for entry in &entries {
            let timestamp = entry.timestamp.to_rfc3339();
            match entry.level {
                LogLevel::Debug => {
                    debug!(at = %timestamp, fields = %entry.fields, "{}", entry.message)
                }
                LogLevel::Info | LogLevel::Notice => {
                    info!(at = %timestamp, fields = %entry.fields, "{}", entry.message)
                }
                LogLevel::Warning => {
                    warn!(at = %timestamp, fields = %entry.fields, "{}", entry.message)
                }
                _ => error!(
                    at = %timestamp,
                    level = %entry.level,
                    fields = %entry.fields,
                    "{}",
                    entry.message
                ),
            }
        }
        entries.len()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn levels_parse_case_insensitively_and_order_by_severity() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Critical > LogLevel::Error);
        assert_eq!(LogLevel::Notice.to_string(), "notice");
    }

    #[test]
    fn oldest_entries_are_evicted_at_capacity() {
        let buffer = LogBuffer::new(3);
        for n in 0..5 {
            buffer.record(LogLevel::Info, format!("entry {n}"), json!({}));
        }

        let messages: Vec<String> = buffer.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn entries_below_the_minimum_level_are_dropped() {
        let buffer = LogBuffer::default();
        buffer.record(LogLevel::Debug, "hidden", json!({}));
        assert_eq!(buffer.len(), 0);

        buffer.set_level(LogLevel::Debug);
        buffer.record(LogLevel::Debug, "visible", json!({"k": 1}));
        assert_eq!(buffer.len(), 1);

        buffer.set_level(LogLevel::Error);
        buffer.record(LogLevel::Warning, "hidden", json!({}));
        assert_eq!(buffer.level(), LogLevel::Error);
        assert_eq!(buffer.flush(), 1);
        assert!(buffer.is_empty());
    }
}
