use anyhow::Result;
use clap::{Parser, Subcommand};
use pdf_rag::commands::{ask, serve_mcp};
use pdf_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(about = "Index PDFs in memory and retrieve the passages that answer a question")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (overrides PDF_RAG_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and ingestion settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index PDFs and run a single query against them
    Ask {
        /// PDF files to index, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Question to answer
        #[arg(long, short)]
        query: String,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ask { files, query, json } => {
            let config = Config::load(&config_dir)?;
            tokio::task::spawn_blocking(move || ask(&config, &files, &query, json)).await??;
        }
        Commands::Serve => {
            let config = Config::load(&config_dir)?;
            serve_mcp(&config).await?;
        }
    }

    Ok(())
}
