use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to extract text from {source_name}: {message}")]
    Extraction {
        source_name: String,
        message: String,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extraction;
pub mod fragmenter;
pub mod index;
pub mod mcp;
pub mod retrieval;
pub mod store;
