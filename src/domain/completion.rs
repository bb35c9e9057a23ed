//! `completion/complete` suggestions for prompt arguments and resource
//! template variables
//!
//! A registered completion callback takes precedence. Without one, the
//! argument's declared enum values are filtered by case-insensitive prefix.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::warn;

use crate::domain::utils::params_object;
use crate::errors::McpError;
use crate::handler::CompleteFn;
use crate::mcp::protocol::{CompleteResult, CompletionValues};
use crate::mcp::server::McpServer;
use crate::schema::InputFields;

pub const MAX_COMPLETIONS: usize = 100;

pub fn complete_from_enum(values: &[String], prefix: &str) -> Vec<String> {
    let prefix = prefix.to_lowercase();
    values
        .iter()
        .filter(|value| value.to_lowercase().starts_with(&prefix))
        .cloned()
        .collect()
}

pub fn cap_completions(mut values: Vec<String>) -> CompletionValues {
    let total = values.len();
    values.truncate(MAX_COMPLETIONS);
    CompletionValues {
        has_more: total > values.len(),
        values,
        total,
    }
}

fn suggest(
    complete: Option<&CompleteFn>,
    input: Option<&InputFields>,
    argument: &str,
    value: &str,
) -> Result<Vec<String>, McpError> {
    if let Some(complete) = complete {
        return panic::catch_unwind(AssertUnwindSafe(|| complete(argument, value))).map_err(|_| {
            warn!(argument = %argument, "completion callback panicked");
            McpError::operational("completion handler panicked")
        });
    }

    Ok(input
        .and_then(|fields| fields.get(argument))
        .and_then(|descriptor| descriptor.enum_values.as_deref())
        .map(|values| complete_from_enum(values, value))
        .unwrap_or_default())
}

pub fn handle_completion_complete(
    server: &McpServer,
    params: Option<&Value>,
) -> Result<Value, McpError> {
    let object = params_object(params).ok_or_else(|| McpError::missing_param("ref"))?;
    let reference = object
        .get("ref")
        .and_then(Value::as_object)
        .ok_or_else(|| McpError::missing_param("ref"))?;
    let argument = object
        .get("argument")
        .and_then(Value::as_object)
        .ok_or_else(|| McpError::missing_param("argument"))?;
    let argument_name = argument
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::missing_param("argument.name"))?;
    let argument_value = argument
        .get("value")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let reference_type = reference
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let suggestions = match reference_type {
        "ref/prompt" | "ref/prompt-argument" => {
            let name = reference
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::missing_param("ref.name"))?;
            let entry = server
                .registries()
                .prompts
                .get(name)
                .ok_or_else(|| McpError::not_found("Prompt", name))?;
            suggest(
                entry.options.complete.as_ref(),
                entry.options.input.as_ref(),
                argument_name,
                argument_value,
            )?
        }
        "ref/resource" => {
            let uri = reference
                .get("uri")
                .and_then(Value::as_str)
                .ok_or_else(|| McpError::missing_param("ref.uri"))?;
            let entry = server
                .registries()
                .resources
                .get(uri)
                .ok_or_else(|| McpError::not_found("Resource", uri))?;
            suggest(
                entry.options.complete.as_ref(),
                entry.options.input.as_ref(),
                argument_name,
                argument_value,
            )?
        }
        other => {
            return Err(McpError::operational(format!(
                "Unsupported completion reference type: {other}"
            )))
        }
    };

    serde_json::to_value(CompleteResult {
        completion: cap_completions(suggestions),
    })
    .map_err(|err| McpError::operational(format!("completion serialization failed: {err}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::handler::{prompt_handler, resource_handler, HandlerError, PromptMessage};
    use crate::registry::{PromptOptions, ResourceOptions};
    use crate::schema::FieldDescriptor;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn colour_fields() -> InputFields {
        InputFields::new().field(
            "colour",
            FieldDescriptor::string().one_of(["red", "green", "blue"]),
        )
    }

    fn server() -> McpServer {
        let server = McpServer::default();
        server.prompt(
            "paint",
            PromptOptions::new("Paint something")
                .input(colour_fields())
                .complete(|argument, value| vec![format!("{argument}:{value}")]),
            prompt_handler(|_args: Value| async {
                Ok::<_, HandlerError>(vec![PromptMessage::user("paint")])
            }),
        );
        server.prompt(
            "sketch",
            PromptOptions::new("Sketch something")
                .complete(|_argument, _value| panic!("completion source unavailable")),
            prompt_handler(|_args: Value| async {
                Ok::<_, HandlerError>(vec![PromptMessage::user("sketch")])
            }),
        );
        server
            .resource(
                "repo://{owner}/{name}",
                ResourceOptions::new("A repository")
                    .complete(|argument, value| match argument {
                        "owner" => vec![format!("{value}-org"), format!("{value}-user")],
                        _ => Vec::new(),
                    }),
                resource_handler(|_params| async { Ok::<_, HandlerError>("repo") }),
            )
            .expect("valid template");
        server
    }

    fn request(reference: Value, name: &str, value: &str) -> Value {
        json!({"ref": reference, "argument": {"name": name, "value": value}})
    }

    #[test]
    fn registered_callback_wins_over_declared_enum() {
        let fields = colour_fields();
        let callback: CompleteFn = Arc::new(|_argument: &str, _value: &str| strings(&["teal"]));
        let values = suggest(Some(&callback), Some(&fields), "colour", "r").expect("suggestions");
        assert_eq!(values, strings(&["teal"]));

        let values = suggest(None, Some(&fields), "colour", "r").expect("suggestions");
        assert_eq!(values, strings(&["red"]));
    }

    #[test]
    fn prompt_callback_receives_argument_and_partial_value() {
        let result = handle_completion_complete(
            &server(),
            Some(&request(json!({"type": "ref/prompt", "name": "paint"}), "colour", "r")),
        )
        .expect("completion result");
        assert_eq!(result["completion"]["values"], json!(["colour:r"]));
        assert_eq!(result["completion"]["total"], 1);
    }

    #[test]
    fn resource_references_use_the_resource_callback() {
        let result = handle_completion_complete(
            &server(),
            Some(&request(
                json!({"type": "ref/resource", "uri": "repo://{owner}/{name}"}),
                "owner",
                "acme",
            )),
        )
        .expect("completion result");
        assert_eq!(
            result["completion"]["values"],
            json!(["acme-org", "acme-user"])
        );
        assert_eq!(result["completion"]["hasMore"], false);
    }

    #[test]
    fn unknown_references_are_operational_errors() {
        let server = server();
        let unsupported = handle_completion_complete(
            &server,
            Some(&request(json!({"type": "ref/unknown"}), "colour", "")),
        )
        .expect_err("unsupported reference");
        assert!(matches!(unsupported, McpError::Operational { .. }));
        assert!(unsupported.to_string().contains("ref/unknown"));

        let missing = handle_completion_complete(
            &server,
            Some(&request(json!({"type": "ref/resource", "uri": "repo://nope"}), "owner", "")),
        )
        .expect_err("unregistered resource");
        assert!(matches!(missing, McpError::Operational { .. }));
    }

    #[test]
    fn panicking_callback_becomes_an_operational_error() {
        let err = handle_completion_complete(
            &server(),
            Some(&request(json!({"type": "ref/prompt", "name": "sketch"}), "style", "")),
        )
        .expect_err("callback panic");
        assert!(matches!(err, McpError::Operational { .. }));
        assert!(err.to_string().contains("completion handler panicked"));
    }

    #[test]
    fn enum_filter_is_case_insensitive_prefix_in_declaration_order() {
        let values = strings(&["Rust", "ruby", "Go", "RUNE"]);
        assert_eq!(complete_from_enum(&values, "ru"), strings(&["Rust", "ruby", "RUNE"]));
        assert_eq!(complete_from_enum(&values, "RuS"), strings(&["Rust"]));
        assert_eq!(complete_from_enum(&values, ""), values);
        assert!(complete_from_enum(&values, "java").is_empty());
    }

    #[test]
    fn results_are_capped_at_one_hundred() {
        let values: Vec<String> = (0..150).map(|n| format!("item-{n}")).collect();
        let capped = cap_completions(values);
        assert_eq!(capped.values.len(), MAX_COMPLETIONS);
        assert_eq!(capped.total, 150);
        assert!(capped.has_more);

        let small = cap_completions(strings(&["a", "b"]));
        assert_eq!(small.total, 2);
        assert!(!small.has_more);
    }
}
