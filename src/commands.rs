use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::mcp::{McpServer, register_retrieval_tools};
use crate::retrieval::{DocumentStatus, QueryOutcome, RetrievalEngine, SearchResult};

/// Index `files` into a fresh engine and print the answers to one query
#[inline]
pub fn ask(config: &Config, files: &[PathBuf], query: &str, json: bool) -> Result<()> {
    let mut engine =
        RetrievalEngine::from_config(config).context("Failed to create retrieval engine")?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(files.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    let report = engine.ingest_paths_with_progress(files, |outcome| {
        bar.set_message(outcome.filename.clone());
        bar.inc(1);
    });
    bar.finish_and_clear();

    for document in &report.documents {
        match &document.status {
            DocumentStatus::Indexed { fragments, .. } => {
                info!("{}: {} fragments", document.filename, fragments);
            }
            DocumentStatus::Failed { error } => {
                eprintln!("{} {}: {}", style("✗").red(), document.filename, error);
            }
            DocumentStatus::Skipped => {
                eprintln!("{} {}: skipped", style("-").yellow(), document.filename);
            }
        }
    }
    eprintln!("{}", report.message());

    let outcome = engine.query(query).context("Query failed")?;
    if json {
        let results = outcome.into_results();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "results": results }))?
        );
        return Ok(());
    }

    match outcome {
        QueryOutcome::NoDocuments => {
            println!("Provide at least one PDF before asking questions");
        }
        QueryOutcome::EmptyQuery => println!("No query provided."),
        QueryOutcome::NoMatches => println!("No results."),
        QueryOutcome::Results(results) => print_results(&results),
    }

    Ok(())
}

fn print_results(results: &[SearchResult]) {
    println!("{}", style(format!("{} results", results.len())).bold());
    println!();
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. {} {}",
            rank + 1,
            style(&result.source).cyan(),
            style(format!("(distance {:.4})", result.score)).dim()
        );
        println!("    {}", result.text.trim());
        println!();
    }
}

/// Start the MCP server on stdio with an empty in-memory engine
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    info!("Starting MCP server");

    // A missing Ollama only matters once documents arrive
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match tokio::task::spawn_blocking(move || client.health_check()).await? {
            Ok(()) => info!(
                "Ollama connected at {}:{} with model {}",
                config.ollama.host, config.ollama.port, config.ollama.model
            ),
            Err(e) => warn!("Ollama is not ready, uploads will fail until it is: {:#}", e),
        },
        Err(e) => warn!("Invalid Ollama configuration: {:#}", e),
    }

    let engine = RetrievalEngine::from_config(config).context("Failed to create retrieval engine")?;
    let server = McpServer::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    register_retrieval_tools(&server, Arc::new(Mutex::new(engine))).await;

    eprintln!(
        "MCP server ready on stdio with tools: {}",
        server.tool_names().await.join(", ")
    );

    server.serve_stdio().await?;
    info!("MCP server stopped normally");
    Ok(())
}
