//! The central Model Context Protocol engine
//!
//! Owns the handler registries and runtime settings, validates JSON-RPC
//! envelopes, routes each method to its implementation and enforces the body
//! size ceilings on the way in and out.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::domain::{
    completion::handle_completion_complete,
    prompts::{handle_prompts_get, handle_prompts_list},
    resources::{handle_resource_templates_list, handle_resources_list, handle_resources_read},
    tools::{handle_tools_call, handle_tools_list},
    utils::required_str,
};
use crate::errors::{McpError, INTERNAL_ERROR};
use crate::handler::{PromptFn, ResourceFn, ToolHandler};
use crate::logging::{LogBuffer, LogLevel};
use crate::mcp::rpc::{is_json_rpc_error, json_rpc_error, json_rpc_result};
use crate::registry::{
    PromptEntry, PromptOptions, Registries, ResourceEntry, ResourceOptions, ToolEntry, ToolOptions,
};
use crate::security::{check_request_size, check_response_size};
use crate::uri_template::TemplateError;

pub struct McpServer {
    config: RuntimeConfig,
    registries: Registries,
    logs: LogBuffer,
}

impl McpServer {
    pub fn new(config: RuntimeConfig) -> Self {
        let logs = LogBuffer::new(config.log_capacity);
        Self {
            config,
            registries: Registries::default(),
            logs,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub fn tool(&self, name: &str, options: ToolOptions, handler: ToolHandler) -> &Self {
        let kind = handler.kind();
        let replaced = self
            .registries
            .tools
            .insert(name, ToolEntry { options, handler });
        info!(tool = %name, kind, replaced, "tool registered");
        self
    }

    /// Registers a static URI or a `{variable}` template. Malformed templates
    /// are rejected here rather than at read time.
    pub fn resource(
        &self,
        uri: &str,
        options: ResourceOptions,
        handler: ResourceFn,
    ) -> Result<&Self, TemplateError> {
        let entry = ResourceEntry::new(uri, options, handler)?;
        let template = entry.pattern.is_template();
        let replaced = self.registries.resources.insert(uri, entry);
        info!(uri = %uri, template, replaced, "resource registered");
        Ok(self)
    }

    pub fn prompt(&self, name: &str, options: PromptOptions, handler: PromptFn) -> &Self {
        let replaced = self
            .registries
            .prompts
            .insert(name, PromptEntry { options, handler });
        info!(prompt = %name, replaced, "prompt registered");
        self
    }

    /// Size-checks and parses a raw request body.
    pub fn parse_payload(&self, body: &[u8]) -> Result<Value, McpError> {
        check_request_size(body.len(), self.config.max_request_bytes)?;
        serde_json::from_slice(body).map_err(|err| McpError::parse(err.to_string(), body))
    }

    /// Full request path for one HTTP body: parse, dispatch and guard the
    /// response size. `Ok(None)` means the request was a notification.
    pub async fn handle_body(&self, body: &[u8]) -> Result<Option<Value>, McpError> {
        let payload = self.parse_payload(body)?;
        Ok(self
            .handle_json_rpc_value(payload)
            .await
            .map(|response| self.guard_response_size(response)))
    }

    fn guard_response_size(&self, response: Value) -> Value {
        let size = serde_json::to_vec(&response)
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX);
        match check_response_size(size, self.config.max_response_bytes) {
            Ok(()) => response,
            Err(err) => {
                warn!(error = %err, "response replaced by size error");
                json_rpc_error(response.get("id").cloned(), INTERNAL_ERROR, &err.to_string())
            }
        }
    }

    pub async fn handle_json_rpc_value(&self, payload: Value) -> Option<Value> {
        let Some(object) = payload.as_object() else {
            return Some(self.error_response(
                None,
                McpError::invalid_request("request must be a JSON object"),
            ));
        };

        let id = object.get("id").cloned();
        let method = match object.get("method").and_then(Value::as_str) {
            Some(method) if !method.trim().is_empty() => method.to_string(),
            _ => {
                return Some(self.error_response(
                    id,
                    McpError::invalid_request("method must be a non-empty string"),
                ))
            }
        };
        let params = object.get("params").cloned();
        let progress_token = progress_token(&payload);
        let is_notification = id.is_none();

        let response = self
            .handle_json_rpc_request(id, &method, params, progress_token)
            .await;

        if is_notification {
            None
        } else {
            response
        }
    }

    pub async fn handle_json_rpc_request(
        &self,
        id: Option<Value>,
        method: &str,
        params: Option<Value>,
        progress_token: Option<Value>,
    ) -> Option<Value> {
        let audit_params = redact_audit_params(params.as_ref());
        let params = params.as_ref();

        let result = match method {
            "tools/list" => handle_tools_list(self, params),
            "tools/call" => handle_tools_call(self, params, progress_token).await,
            "resources/list" => handle_resources_list(self, params),
            "resources/templates/list" => handle_resource_templates_list(self, params),
            "resources/read" => handle_resources_read(self, params).await,
            "prompts/list" => handle_prompts_list(self, params),
            "prompts/get" => handle_prompts_get(self, params).await,
            "completion/complete" => handle_completion_complete(self, params),
            "logging/setLevel" => self.set_log_level(params),
            "notifications/cancelled" => {
                info!(params = %audit_params, "cancellation notice received");
                return None;
            }
            other => Err(McpError::method_not_found(other)),
        };

        let response = match result {
            Ok(result) => json_rpc_result(id, result),
            Err(err) => self.error_response(id, err),
        };
        let outcome = if is_json_rpc_error(&response) {
            "failure"
        } else {
            "success"
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome,
            "mcp action audited"
        );
        self.logs.record(
            if outcome == "success" {
                LogLevel::Info
            } else {
                LogLevel::Warning
            },
            format!("{method} {outcome}"),
            json!({ "method": method, "params": audit_params }),
        );

        Some(response)
    }

    fn set_log_level(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let level = required_str(params, "level")?
            .parse::<LogLevel>()
            .map_err(|err| McpError::operational(err.to_string()))?;
        self.logs.set_level(level);
        Ok(json!({}))
    }

    fn error_response(&self, id: Option<Value>, err: McpError) -> Value {
        err.to_json_rpc(id, self.config.debug)
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Progress token from `params._meta.progressToken`, falling back to a
/// top-level `_meta.progressToken`.
pub fn progress_token(payload: &Value) -> Option<Value> {
    payload
        .pointer("/params/_meta/progressToken")
        .or_else(|| payload.pointer("/_meta/progressToken"))
        .filter(|token| !token.is_null())
        .cloned()
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

/// Progress tokens are correlation ids, not credentials.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    if normalized == "progresstoken" {
        return false;
    }
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
