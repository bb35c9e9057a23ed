use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::logging::DEFAULT_LOG_CAPACITY;
use crate::progress::{GuardrailLimits, DEFAULT_MAX_DURATION, DEFAULT_MAX_STEPS};
use crate::security::uri::DEFAULT_ALLOWED_SCHEMES;
use crate::security::DEFAULT_MAX_BODY_BYTES;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
    pub allowed_schemes: Vec<String>,
    pub max_steps: u64,
    pub max_duration_ms: u64,
    pub debug: bool,
    pub log_capacity: usize,
}

/// Settings the dispatcher consults on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub max_request_bytes: usize,
    pub max_response_bytes: usize,
    pub allowed_schemes: Vec<String>,
    pub guardrails: GuardrailLimits,
    pub debug: bool,
    pub log_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: DEFAULT_MAX_BODY_BYTES,
            max_response_bytes: DEFAULT_MAX_BODY_BYTES,
            allowed_schemes: DEFAULT_ALLOWED_SCHEMES.map(String::from).to_vec(),
            guardrails: GuardrailLimits::default(),
            debug: false,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("{name} must be a positive integer")]
    InvalidLimit { name: &'static str },
    #[error("MCP_ALLOWED_SCHEMES must list at least one scheme")]
    EmptySchemes,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidLimit { name }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = lookup("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let allowed_schemes = match lookup("MCP_ALLOWED_SCHEMES") {
            Some(raw) => {
                let schemes: Vec<String> = raw
                    .split(',')
                    .map(|scheme| scheme.trim().to_ascii_lowercase())
                    .filter(|scheme| !scheme.is_empty())
                    .collect();
                if schemes.is_empty() {
                    return Err(ConfigError::EmptySchemes);
                }
                schemes
            }
            None => DEFAULT_ALLOWED_SCHEMES.map(String::from).to_vec(),
        };

        let debug = lookup("MCP_DEBUG")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);

        let config = Self {
            bind_addr,
            bind_port,
            max_request_bytes: positive(&lookup, "MCP_MAX_REQUEST_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            max_response_bytes: positive(
                &lookup,
                "MCP_MAX_RESPONSE_BYTES",
                DEFAULT_MAX_BODY_BYTES,
            )?,
            allowed_schemes,
            max_steps: positive(&lookup, "MCP_MAX_STEPS", DEFAULT_MAX_STEPS)?,
            max_duration_ms: positive(
                &lookup,
                "MCP_MAX_DURATION_MS",
                DEFAULT_MAX_DURATION.as_millis() as u64,
            )?,
            debug,
            log_capacity: positive(&lookup, "MCP_LOG_BUFFER_CAPACITY", DEFAULT_LOG_CAPACITY)?,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_request_bytes: self.max_request_bytes,
            max_response_bytes: self.max_response_bytes,
            allowed_schemes: self.allowed_schemes.clone(),
            guardrails: GuardrailLimits {
                max_steps: self.max_steps,
                max_duration: Duration::from_millis(self.max_duration_ms),
            },
            debug: self.debug,
            log_capacity: self.log_capacity,
        }
    }
}
