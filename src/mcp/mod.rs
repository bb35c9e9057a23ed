//! Model Context Protocol server handling and JSON-RPC implementations
//!
//! Envelope validation and method routing, the response envelope builders and
//! the wire projections of registered tools, resources and prompts.

pub mod protocol;
pub mod rpc;
pub mod server;
