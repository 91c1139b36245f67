//! MCP Server Implementation
//!
//! Line-delimited JSON-RPC over stdio: connection state, tool registration and
//! message routing.

use crate::mcp::protocol::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Executes one tool call
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

struct RegisteredTool {
    definition: Tool,
    handler: Box<dyn ToolHandler>,
}

pub struct McpServer {
    server_info: Implementation,
    capabilities: ServerCapabilities,
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    connection_state: RwLock<ConnectionState>,
}

impl McpServer {
    #[inline]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            tools: RwLock::new(BTreeMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    /// Register a tool, replacing any earlier tool with the same name
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();
        self.tools.write().await.insert(
            tool_name.clone(),
            RegisteredTool {
                definition: tool,
                handler: Box::new(handler),
            },
        );
        debug!("Registered tool: {}", tool_name);
    }

    /// Names of the registered tools, sorted
    #[inline]
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    /// Serve on the process's stdin and stdout until the client closes stdin
    #[inline]
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Serve newline-delimited messages from `reader`, writing replies to `writer`
    #[inline]
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read from client")?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(reply) = self.handle_line(line).await {
                send_message(&mut writer, &reply).await?;
            }
        }

        info!("EOF reached, closing connection");
        *self.connection_state.write().await = ConnectionState::Closed;
        Ok(())
    }

    /// Process one raw message; returns the reply to send, if any
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                return Some(error_reply(JsonRpcError::parse_error(), None));
            }
        };

        let id = raw
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

        let message: JsonRpcMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid JSON-RPC message: {}", e);
                return Some(error_reply(JsonRpcError::invalid_request(), id));
            }
        };

        if message.jsonrpc() != JSONRPC_VERSION {
            warn!("Unsupported jsonrpc version: {}", message.jsonrpc());
            return Some(error_reply(JsonRpcError::invalid_request(), id));
        }

        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(&notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(json!({})),
            _ => Err(JsonRpcError::method_not_found()),
        };

        match result {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => {
                if e.code != error_codes::METHOD_NOT_FOUND {
                    error!("Error handling request {}: {}", request.method, e.message);
                }
                error_reply(e, Some(request.id))
            }
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                *self.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => debug!("Received cancellation notification"),
            other => warn!("Unknown notification method: {}", other),
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .ok_or_else(|| {
                JsonRpcError::invalid_params(Some("Initialize request missing parameters".into()))
            })
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(Some(e.to_string())))
            })?;

        let protocol_version = if SUPPORTED_PROTOCOL_VERSIONS
            .contains(&params.protocol_version.as_str())
        {
            params.protocol_version.clone()
        } else {
            warn!(
                "Client requested protocol {}, answering with {}",
                params.protocol_version, MCP_VERSION
            );
            MCP_VERSION.to_string()
        };

        *self.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version,
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some(
                "Upload PDFs with upload_pdfs, then ask questions about them with query"
                    .to_string(),
            ),
        };

        info!("Client initialized: {}", params.client_info.name);
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))
    }

    async fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let tools = self.tools.read().await;
        let result = ListToolsResult {
            tools: tools.values().map(|t| t.definition.clone()).collect(),
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| {
                JsonRpcError::invalid_params(Some("Tool call request missing parameters".into()))
            })
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(Some(e.to_string())))
            })?;

        let tools = self.tools.read().await;
        let tool = tools.get(&params.name).ok_or_else(|| {
            JsonRpcError::invalid_params(Some(format!("Unknown tool: {}", params.name)))
        })?;

        debug!("Calling tool {}", params.name);
        let result = tool
            .handler
            .handle(params)
            .await
            .map_err(|e| JsonRpcError::internal_error(Some(format!("{:#}", e))))?;

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(Some(e.to_string())))
    }
}

fn error_reply(error: JsonRpcError, id: Option<RequestId>) -> JsonRpcMessage {
    JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, id))
}

async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
