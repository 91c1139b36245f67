// Embeddings module
// The embedding seam used by the retrieval engine, plus the Ollama implementation

pub mod ollama;

pub use ollama::{ModelInfo, OllamaClient};

/// Maps texts to fixed-length vectors.
///
/// Output is positionally aligned with the input and must be deterministic for a
/// fixed model.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
