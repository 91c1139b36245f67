//! MCP Tools Implementation
//!
//! `upload_pdfs` and `query` over one retrieval engine shared for the whole session.

use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::retrieval::{DocumentStatus, IngestReport, QueryOutcome, RetrievalEngine};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// The session's engine; the lock spans a whole ingestion or query
pub type SharedEngine = Arc<Mutex<RetrievalEngine>>;

pub const NO_FILES_MESSAGE: &str = "No files provided.";
pub const NO_DOCUMENTS_MESSAGE: &str = "Provide at least one PDF before asking questions";
pub const NO_QUERY_MESSAGE: &str = "No query provided.";

/// Reads PDFs from disk and adds them to the engine, one file at a time
pub struct UploadPdfsHandler {
    engine: SharedEngine,
}

/// Answers a question against everything uploaded so far
pub struct QueryHandler {
    engine: SharedEngine,
}

impl UploadPdfsHandler {
    #[inline]
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "upload_pdfs".to_string(),
            description: Some("Extract, fragment and index PDF files for querying".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Paths of the PDF files to index, processed in order"
                    }
                },
                "required": ["paths"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for UploadPdfsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let paths: Vec<PathBuf> = params
            .arguments
            .as_ref()
            .and_then(|args| args.get("paths"))
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        if paths.is_empty() {
            return Ok(CallToolResult::error(NO_FILES_MESSAGE));
        }

        debug!("Uploading {} files", paths.len());

        let engine = Arc::clone(&self.engine);
        let (report, total_fragments) = tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| anyhow!("Retrieval engine lock poisoned"))?;
            let report = engine.ingest_paths(&paths);
            Ok::<_, anyhow::Error>((report, engine.len()))
        })
        .await
        .context("Ingestion task panicked")??;

        info!("{}", report.message());

        let response = report_json(&report, total_fragments);
        let text = serde_json::to_string_pretty(&response)?;
        Ok(if report.is_success() {
            CallToolResult::text(text)
        } else {
            CallToolResult::error(text)
        })
    }
}

impl QueryHandler {
    #[inline]
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "query".to_string(),
            description: Some("Find the uploaded passages most relevant to a question".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Question or search text"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for QueryHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let query = params
            .arguments
            .as_ref()
            .and_then(|args| args.get("query"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        debug!("Query: '{}'", query);

        let engine = Arc::clone(&self.engine);
        let outcome = tokio::task::spawn_blocking(move || {
            let engine = engine
                .lock()
                .map_err(|_| anyhow!("Retrieval engine lock poisoned"))?;
            Ok::<_, anyhow::Error>(engine.query(&query))
        })
        .await
        .context("Query task panicked")??;

        match outcome {
            Ok(QueryOutcome::NoDocuments) => Ok(CallToolResult::error(NO_DOCUMENTS_MESSAGE)),
            Ok(QueryOutcome::EmptyQuery) => Ok(CallToolResult::error(NO_QUERY_MESSAGE)),
            Ok(outcome @ (QueryOutcome::NoMatches | QueryOutcome::Results(_))) => {
                let response = json!({ "results": outcome.results() });
                Ok(CallToolResult::text(serde_json::to_string_pretty(&response)?))
            }
            Err(e) => {
                error!("Error performing query: {}", e);
                Ok(CallToolResult::error(format!("Query error: {}", e)))
            }
        }
    }
}

/// Register both retrieval tools on `server`, sharing `engine`
#[inline]
pub async fn register_retrieval_tools(server: &McpServer, engine: SharedEngine) {
    server
        .register_tool(
            UploadPdfsHandler::tool_definition(),
            UploadPdfsHandler::new(Arc::clone(&engine)),
        )
        .await;
    server
        .register_tool(QueryHandler::tool_definition(), QueryHandler::new(engine))
        .await;
}

fn report_json(report: &IngestReport, total_fragments: usize) -> Value {
    let documents: Vec<Value> = report
        .documents
        .iter()
        .map(|doc| match &doc.status {
            DocumentStatus::Indexed { fragments, .. } => json!({
                "filename": doc.filename,
                "status": "indexed",
                "fragments": fragments,
            }),
            DocumentStatus::Failed { error } => json!({
                "filename": doc.filename,
                "status": "failed",
                "error": error.to_string(),
            }),
            DocumentStatus::Skipped => json!({
                "filename": doc.filename,
                "status": "skipped",
            }),
        })
        .collect();

    json!({
        "message": report.message(),
        "documents": documents,
        "total_fragments": total_fragments,
    })
}
