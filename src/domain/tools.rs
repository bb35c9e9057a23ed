//! `tools/list` and `tools/call`
//!
//! Direct tools resolve once. Stepwise tools are driven through the
//! [`ProgressExecutor`] under the configured guardrails, and any buffered
//! progress notifications ride along in the result `_meta`.

use std::sync::Arc;

use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::domain::utils::{cursor_param, page_result, paginate, required_str, sanitized_arguments};
use crate::errors::McpError;
use crate::handler::{run_isolated, Content, HandlerError, ToolHandler};
use crate::mcp::protocol::ToolDescriptor;
use crate::mcp::server::McpServer;
use crate::progress::{ExecutionError, ExecutionOutcome, ProgressExecutor};
use crate::registry::Registries;
use crate::schema::build_schema;
use crate::security::sanitize_error_message;

pub fn build_tools_list(registries: &Registries) -> Vec<ToolDescriptor> {
    registries
        .tools
        .snapshot()
        .into_iter()
        .map(|(name, entry)| ToolDescriptor {
            name,
            description: entry.options.description.clone(),
            input_schema: build_schema(entry.options.input.as_ref()).schema,
        })
        .collect()
}

pub fn handle_tools_list(server: &McpServer, params: Option<&Value>) -> Result<Value, McpError> {
    let tools = build_tools_list(server.registries());
    page_result("tools", paginate(tools, cursor_param(params)))
}

pub async fn handle_tools_call(
    server: &McpServer,
    params: Option<&Value>,
    progress_token: Option<Value>,
) -> Result<Value, McpError> {
    let name = required_str(params, "name")?;
    let entry = server
        .registries()
        .tools
        .get(name)
        .ok_or_else(|| McpError::not_found("Tool", name))?;
    let arguments = sanitized_arguments(params);

    let (result, meta) = match &entry.handler {
        ToolHandler::Direct(handler) => {
            let handler = Arc::clone(handler);
            let result = run_isolated(async move { handler(arguments).await })
                .await
                .map_err(ExecutionError::from);
            (result, None)
        }
        ToolHandler::Stepwise(factory) => {
            let executor = ProgressExecutor::new(server.config().guardrails)
                .with_total(entry.options.progress_total)
                .with_progress_token(progress_token.clone());
            let factory = Arc::clone(factory);
            let run = async move {
                let source = factory(arguments);
                executor.run(source).await
            };
            let outcome = match tokio::spawn(run).await {
                Ok(outcome) => outcome,
                Err(_) => ExecutionOutcome {
                    result: Err(HandlerError::new("handler panicked").into()),
                    notifications: Vec::new(),
                    steps: 0,
                },
            };
            let meta = progress_token.map(|token| progress_meta(token, &outcome));
            (outcome.result, meta)
        }
    };

    let call_result = match result {
        Ok(content) => tool_result(&content, None, meta),
        Err(err) => {
            let message = execution_error_message(&err, server.config().debug);
            warn!(tool = %name, kind = entry.handler.kind(), error = %message, "tool call failed");
            tool_result(&Content::Text(message), Some(true), meta)
        }
    };

    serde_json::to_value(call_result)
        .map_err(|err| McpError::operational(format!("tool result serialization failed: {err}")))
}

fn progress_meta(token: Value, outcome: &ExecutionOutcome) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("progressToken".to_string(), token);
    meta.insert("progress".to_string(), json!(outcome.notifications));
    meta
}

fn tool_result(
    content: &Content,
    is_error: Option<bool>,
    meta: Option<Map<String, Value>>,
) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(
            content.to_text(),
            None,
            None,
        ))],
        is_error,
        meta,
        structured_content: None,
    }
}

fn execution_error_message(err: &ExecutionError, debug: bool) -> String {
    match err {
        ExecutionError::Handler(handler) => {
            sanitize_error_message(handler.message(), handler.trace(), debug)
        }
        other => sanitize_error_message(&other.to_string(), None, debug),
    }
}
