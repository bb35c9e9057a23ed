//! MCP method implementations over the handler registries
//!
//! Each function takes the parsed `params` and returns the JSON-RPC `result`
//! payload or an [`McpError`](crate::errors::McpError); envelope wrapping and
//! auditing happen in [`crate::mcp::server`].

pub mod completion;
pub mod prompts;
pub mod resources;
pub mod tools;
pub mod utils;
