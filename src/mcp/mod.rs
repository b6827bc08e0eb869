//! MCP surface: the same retrieval operations as the HTTP API, over stdio.
pub mod server;
pub mod tools;
