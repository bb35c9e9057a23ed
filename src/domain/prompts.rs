//! `prompts/list` and `prompts/get`

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::domain::utils::{cursor_param, page_result, paginate, required_str, sanitized_arguments};
use crate::errors::McpError;
use crate::handler::run_isolated;
use crate::mcp::protocol::{GetPromptResult, PromptArgument, PromptDescriptor};
use crate::mcp::server::McpServer;
use crate::registry::Registries;
use crate::schema::InputFields;
use crate::security::sanitize_error_message;

fn prompt_arguments(input: Option<&InputFields>) -> Vec<PromptArgument> {
    input
        .map(|fields| {
            fields
                .iter()
                .map(|(name, descriptor)| PromptArgument {
                    name: name.to_string(),
                    description: descriptor.description.clone(),
                    required: !descriptor.optional,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn build_prompts_list(registries: &Registries) -> Vec<PromptDescriptor> {
    registries
        .prompts
        .snapshot()
        .into_iter()
        .map(|(name, entry)| PromptDescriptor {
            name,
            description: entry.options.description.clone(),
            arguments: prompt_arguments(entry.options.input.as_ref()),
        })
        .collect()
}

pub fn handle_prompts_list(server: &McpServer, params: Option<&Value>) -> Result<Value, McpError> {
    let prompts = build_prompts_list(server.registries());
    page_result("prompts", paginate(prompts, cursor_param(params)))
}

pub async fn handle_prompts_get(
    server: &McpServer,
    params: Option<&Value>,
) -> Result<Value, McpError> {
    let name = required_str(params, "name")?;
    let entry = server
        .registries()
        .prompts
        .get(name)
        .ok_or_else(|| McpError::not_found("Prompt", name))?;
    let arguments = sanitized_arguments(params);

    if let Some(missing) = prompt_arguments(entry.options.input.as_ref())
        .into_iter()
        .find(|argument| {
            argument.required && arguments.get(&argument.name).map_or(true, Value::is_null)
        })
    {
        return Err(McpError::operational(format!(
            "Missing required argument: {}",
            missing.name
        )));
    }

    let handler = Arc::clone(&entry.handler);
    let messages = run_isolated(async move { handler(arguments).await })
        .await
        .map_err(|err| {
            warn!(prompt = %name, error = %err, "prompt rendering failed");
            McpError::operational(sanitize_error_message(
                err.message(),
                err.trace(),
                server.config().debug,
            ))
        })?;

    serde_json::to_value(GetPromptResult {
        description: entry.options.description.clone(),
        messages,
    })
    .map_err(|err| McpError::operational(format!("prompt result serialization failed: {err}")))
}
