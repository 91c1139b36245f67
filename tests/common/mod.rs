#![allow(dead_code, reason = "each test binary uses a different subset of helpers")]

// Shared helpers for integration tests

use pdf_rag::embeddings::Embedder;
use pdf_rag::extraction::PlainTextExtractor;
use pdf_rag::retrieval::{FailurePolicy, RetrievalEngine};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const WORD_DIMENSION: usize = 32;

/// Bag-of-words vectors hashed into `WORD_DIMENSION` buckets
pub struct WordHashEmbedder;

impl WordHashEmbedder {
    fn bucket(word: &str) -> usize {
        word.bytes()
            .fold(5381_usize, |hash, b| hash.wrapping_mul(33) ^ usize::from(b))
            % WORD_DIMENSION
    }
}

impl Embedder for WordHashEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; WORD_DIMENSION];
                for word in text.split_whitespace() {
                    vector[Self::bucket(&word.to_lowercase())] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Hands out prepared batches of vectors in call order
pub struct ScriptedEmbedder {
    batches: Mutex<VecDeque<Vec<Vec<f32>>>>,
}

impl ScriptedEmbedder {
    pub fn new(batches: Vec<Vec<Vec<f32>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }
}

impl Embedder for ScriptedEmbedder {
    fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batches
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted embedder lock poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted batch left"))
    }
}

pub fn word_engine(policy: FailurePolicy) -> RetrievalEngine {
    RetrievalEngine::new(WORD_DIMENSION, WordHashEmbedder, PlainTextExtractor)
        .expect("engine should build")
        .with_failure_policy(policy)
}

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}
