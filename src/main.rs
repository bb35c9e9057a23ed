use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mcp_dispatch::{
    build_app,
    config::Config,
    handler::{
        prompt_handler, resource_handler, HandlerError, PromptMessage, Step, StepSource,
        ToolHandler,
    },
    logging,
    mcp::server::McpServer,
    registry::{PromptOptions, ResourceOptions, ToolOptions},
    schema::{FieldDescriptor, InputFields},
    AppState,
};
use serde_json::{json, Value};
use tracing::info;

struct Countdown {
    remaining: u64,
}

#[async_trait]
impl StepSource for Countdown {
    async fn next_step(&mut self) -> Result<Step, HandlerError> {
        if self.remaining == 0 {
            return Ok(Step::done("done"));
        }
        self.remaining -= 1;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(Step::progress_message(format!("{} remaining", self.remaining)))
    }
}

fn register_builtins(server: &McpServer) -> Result<(), Box<dyn std::error::Error>> {
    server
        .tool(
            "echo",
            ToolOptions::new("Returns its text argument unchanged")
                .input(InputFields::new().field("text", FieldDescriptor::string())),
            ToolHandler::direct(|args: Value| async move {
                args.get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| HandlerError::new("text must be a string"))
            }),
        )
        .tool(
            "countdown",
            ToolOptions::new("Counts down from `from`, reporting progress")
                .input(InputFields::new().field(
                    "from",
                    FieldDescriptor::integer().with_default(json!(5)).optional(),
                ))
                .progress_total(5),
            ToolHandler::stepwise(|args: Value| Countdown {
                remaining: args.get("from").and_then(Value::as_u64).unwrap_or(5),
            }),
        );

    server.resource(
        "server://time",
        ResourceOptions::new("Current server time").name("Server time"),
        resource_handler(|_params| async {
            Ok::<_, HandlerError>(json!({ "now": Utc::now() }))
        }),
    )?;
    server.resource(
        "greeting://{name}",
        ResourceOptions::new("A personalised greeting").mime_type("text/plain"),
        resource_handler(|params| async move {
            let name = params.get("name").cloned().unwrap_or_default();
            Ok::<_, HandlerError>(format!("Hello, {name}!"))
        }),
    )?;

    server.prompt(
        "summarize",
        PromptOptions::new("Summarize a passage of text").input(
            InputFields::new()
                .field("text", FieldDescriptor::string().describe("Text to summarize"))
                .field(
                    "length",
                    FieldDescriptor::string()
                        .one_of(["short", "medium", "long"])
                        .optional(),
                ),
        ),
        prompt_handler(|args: Value| async move {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            let length = args.get("length").and_then(Value::as_str).unwrap_or("short");
            Ok::<_, HandlerError>(vec![PromptMessage::user(format!(
                "Write a {length} summary of:\n\n{text}"
            ))])
        }),
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let server = Arc::new(McpServer::new(config.runtime()));
    register_builtins(&server)?;

    let bind_socket = config.bind_socket()?;
    let app = build_app(AppState::new(server));
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        debug = config.debug,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
