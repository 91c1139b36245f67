//! MCP (Model Context Protocol) Server Implementation
//!
//! A stdio JSON-RPC 2.0 server exposing the retrieval engine as two tools.


pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::{QueryHandler, SharedEngine, UploadPdfsHandler, register_retrieval_tools};
