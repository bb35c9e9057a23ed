//! `resources/list`, `resources/templates/list` and `resources/read`
//!
//! Static URIs are looked up exactly. Otherwise every template is tried and the
//! most specific match wins (longest literal prefix, then most literal
//! characters, then registration order).

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rust_mcp_sdk::schema::{
    BlobResourceContents, ReadResourceContent, ReadResourceResult, Resource, TextResourceContents,
};
use serde_json::Value;
use tracing::warn;

use crate::domain::utils::{cursor_param, page_result, paginate, required_str};
use crate::errors::McpError;
use crate::handler::{run_isolated, safe_serialize, Content};
use crate::mcp::protocol::ResourceTemplateDescriptor;
use crate::mcp::server::McpServer;
use crate::registry::{Registries, ResourceEntry};
use crate::security::uri::uri_scheme;
use crate::security::{canonicalize_path, sanitize_error_message, validate_uri_scheme};
use crate::uri_template::UriParams;

const DEFAULT_TEXT_MIME: &str = "text/plain";
const DEFAULT_BINARY_MIME: &str = "application/octet-stream";
const JSON_MIME: &str = "application/json";

pub fn build_resources_list(registries: &Registries) -> Vec<Resource> {
    registries
        .resources
        .snapshot()
        .into_iter()
        .filter(|(_, entry)| !entry.pattern.is_template())
        .map(|(uri, entry)| Resource {
            annotations: None,
            description: Some(entry.options.description.clone()),
            icons: vec![],
            meta: None,
            mime_type: entry.options.mime_type.clone(),
            name: entry.display_name().to_string(),
            size: None,
            title: None,
            uri,
        })
        .collect()
}

pub fn build_resource_templates_list(registries: &Registries) -> Vec<ResourceTemplateDescriptor> {
    registries
        .resources
        .snapshot()
        .into_iter()
        .filter(|(_, entry)| entry.pattern.is_template())
        .map(|(uri_template, entry)| ResourceTemplateDescriptor {
            name: entry.display_name().to_string(),
            description: entry.options.description.clone(),
            mime_type: entry.options.mime_type.clone(),
            uri_template,
        })
        .collect()
}

pub fn handle_resources_list(server: &McpServer, params: Option<&Value>) -> Result<Value, McpError> {
    let resources = build_resources_list(server.registries());
    page_result("resources", paginate(resources, cursor_param(params)))
}

pub fn handle_resource_templates_list(
    server: &McpServer,
    params: Option<&Value>,
) -> Result<Value, McpError> {
    let templates = build_resource_templates_list(server.registries());
    page_result("resourceTemplates", paginate(templates, cursor_param(params)))
}

/// Configured schemes plus the scheme of every registered resource key.
pub fn allowed_schemes(server: &McpServer) -> Vec<String> {
    let mut schemes = server.config().allowed_schemes.clone();
    for (uri, _) in server.registries().resources.snapshot() {
        if let Some(scheme) = uri_scheme(&uri) {
            if !schemes.iter().any(|known| known.eq_ignore_ascii_case(&scheme)) {
                schemes.push(scheme);
            }
        }
    }
    schemes
}

pub fn resolve_resource(
    registries: &Registries,
    uri: &str,
) -> Option<(Arc<ResourceEntry>, UriParams)> {
    if let Some(entry) = registries.resources.get(uri) {
        if !entry.pattern.is_template() {
            return Some((entry, UriParams::new()));
        }
    }

    let mut best: Option<(Arc<ResourceEntry>, UriParams)> = None;
    for (_, entry) in registries.resources.snapshot() {
        if !entry.pattern.is_template() {
            continue;
        }
        let Some(params) = entry.pattern.matches(uri) else {
            continue;
        };
        let better = best.as_ref().map_or(true, |(current, _)| {
            entry.pattern.specificity() > current.pattern.specificity()
        });
        if better {
            best = Some((entry, params));
        }
    }
    best
}

pub async fn handle_resources_read(
    server: &McpServer,
    params: Option<&Value>,
) -> Result<Value, McpError> {
    let requested = required_str(params, "uri")?;
    validate_uri_scheme(requested, &allowed_schemes(server))?;
    let uri = canonicalize_path(requested)?;

    let (entry, uri_params) = resolve_resource(server.registries(), &uri)
        .ok_or_else(|| McpError::not_found("Resource", &uri))?;

    let handler = Arc::clone(&entry.handler);
    let content = run_isolated(async move { handler(uri_params).await })
        .await
        .map_err(|err| {
            warn!(uri = %uri, error = %err, "resource read failed");
            McpError::operational(sanitize_error_message(
                err.message(),
                err.trace(),
                server.config().debug,
            ))
        })?;

    let result = ReadResourceResult {
        contents: vec![read_content(uri, entry.options.mime_type.clone(), content)],
        meta: None,
    };
    serde_json::to_value(result)
        .map_err(|err| McpError::operational(format!("resource result serialization failed: {err}")))
}

fn read_content(uri: String, declared_mime: Option<String>, content: Content) -> ReadResourceContent {
    match content {
        Content::Bytes(bytes) => ReadResourceContent::from(BlobResourceContents {
            blob: BASE64.encode(bytes),
            meta: None,
            mime_type: Some(declared_mime.unwrap_or_else(|| DEFAULT_BINARY_MIME.to_string())),
            uri,
        }),
        Content::Text(text) | Content::Json(Value::String(text)) => {
            ReadResourceContent::from(TextResourceContents {
                meta: None,
                mime_type: Some(declared_mime.unwrap_or_else(|| DEFAULT_TEXT_MIME.to_string())),
                text,
                uri,
            })
        }
        Content::Json(value) => ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some(JSON_MIME.to_string()),
            text: safe_serialize(&value),
            uri,
        }),
    }
}
