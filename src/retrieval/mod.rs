//! Retrieval engine
//!
//! Owns the vector index and the document store for one session, keeps them
//! aligned through ingestion, and answers queries with the two-stage
//! vector-then-lexical ranking.

#[cfg(test)]
mod tests;

pub mod lexical;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::extraction::{Document, ExtractorSet, TextExtractor, document_name};
use crate::fragmenter;
use crate::index::{IndexError, VectorIndex};
use crate::store::DocumentStore;
use crate::{RagError, Result};

/// Number of nearest neighbors fetched per query
pub const TOP_K: usize = 5;

/// Candidates are kept only when their squared L2 distance is strictly above this.
///
/// Lower distance means closer, so this keeps the farther candidates of the top
/// [`TOP_K`]. The direction matches the behaviour existing deployments rely on.
pub const MIN_DISTANCE: f32 = 0.5;

/// What happens to the rest of an upload batch after a document cannot be extracted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the failing document; later documents are skipped
    #[default]
    Abort,
    /// Record the failure and carry on with the next document
    Continue,
}

impl fmt::Display for FailurePolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

/// One ranked query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Squared L2 distance between the query and fragment embeddings
    pub score: f32,
    pub text: String,
    pub source: String,
}

/// Answer to a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Nothing has been ingested yet
    NoDocuments,
    /// The query string was empty
    EmptyQuery,
    /// Every candidate was removed by the distance filter
    NoMatches,
    Results(Vec<SearchResult>),
}

impl QueryOutcome {
    #[inline]
    pub fn results(&self) -> &[SearchResult] {
        match self {
            Self::Results(results) => results,
            Self::NoDocuments | Self::EmptyQuery | Self::NoMatches => &[],
        }
    }

    #[inline]
    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            Self::Results(results) => results,
            Self::NoDocuments | Self::EmptyQuery | Self::NoMatches => Vec::new(),
        }
    }
}

/// How one document of an upload batch fared
#[derive(Debug)]
pub enum DocumentStatus {
    /// All fragments were indexed; ids run from `first_id` to `first_id + fragments - 1`
    Indexed { fragments: usize, first_id: usize },
    /// Nothing from this document was indexed
    Failed { error: RagError },
    /// Not attempted because an earlier document aborted the batch
    Skipped,
}

#[derive(Debug)]
pub struct DocumentOutcome {
    pub filename: String,
    pub status: DocumentStatus,
}

/// Per-document results of an upload batch, in input order
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: Vec<DocumentOutcome>,
}

impl IngestReport {
    #[inline]
    pub fn indexed_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|doc| matches!(doc.status, DocumentStatus::Indexed { .. }))
            .count()
    }

    #[inline]
    pub fn skipped_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|doc| matches!(doc.status, DocumentStatus::Skipped))
            .count()
    }

    #[inline]
    pub fn fragments_added(&self) -> usize {
        self.documents
            .iter()
            .map(|doc| match doc.status {
                DocumentStatus::Indexed { fragments, .. } => fragments,
                DocumentStatus::Failed { .. } | DocumentStatus::Skipped => 0,
            })
            .sum()
    }

    /// Failed documents with their errors
    #[inline]
    pub fn failures(&self) -> impl Iterator<Item = (&str, &RagError)> {
        self.documents.iter().filter_map(|doc| match &doc.status {
            DocumentStatus::Failed { error } => Some((doc.filename.as_str(), error)),
            DocumentStatus::Indexed { .. } | DocumentStatus::Skipped => None,
        })
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none() && self.skipped_count() == 0
    }

    /// Human readable summary of the batch
    #[inline]
    pub fn message(&self) -> String {
        if self.is_success() {
            return format!(
                "{} PDFs processed and indexed successfully.",
                self.documents.len()
            );
        }

        let mut lines: Vec<String> = self
            .failures()
            .map(|(filename, error)| format!("Error processing file {}: {}", filename, error))
            .collect();
        lines.push(format!(
            "{} of {} PDFs processed and indexed successfully.",
            self.indexed_count(),
            self.documents.len()
        ));
        let skipped = self.skipped_count();
        if skipped > 0 {
            lines.push(format!("{} files were not processed.", skipped));
        }
        lines.join("\n")
    }
}

/// In-memory retrieval session: vector index, aligned document store, and the
/// collaborators used to fill and query them
pub struct RetrievalEngine {
    index: VectorIndex,
    store: DocumentStore,
    embedder: Box<dyn Embedder>,
    extractor: Box<dyn TextExtractor>,
    failure_policy: FailurePolicy,
}

impl fmt::Debug for RetrievalEngine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("dimension", &self.index.dimension())
            .field("fragments", &self.store.len())
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl RetrievalEngine {
    /// Create an empty engine for vectors of `dimension` components
    #[inline]
    pub fn new<E, X>(dimension: usize, embedder: E, extractor: X) -> Result<Self>
    where
        E: Embedder + 'static,
        X: TextExtractor + 'static,
    {
        if dimension == 0 {
            return Err(RagError::Config(
                "Embedding dimension must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            index: VectorIndex::new(dimension),
            store: DocumentStore::new(),
            embedder: Box::new(embedder),
            extractor: Box::new(extractor),
            failure_policy: FailurePolicy::default(),
        })
    }

    /// Engine backed by the configured Ollama server and the `pdftotext` extractor
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;
        let embedder = OllamaClient::new(&config.ollama)?;
        let extractor = ExtractorSet::new(&config.extraction);

        Ok(Self::new(config.embedding_dimension(), embedder, extractor)?
            .with_failure_policy(config.ingestion.failure_policy))
    }

    #[inline]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    #[inline]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Number of indexed fragments
    #[inline]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Extract, fragment, embed, and index a batch of documents in order.
    ///
    /// Each document is indexed completely or not at all. Extraction failures follow
    /// the configured [`FailurePolicy`]; embedding failures always end the batch.
    #[inline]
    pub fn ingest(&mut self, documents: &[Document]) -> IngestReport {
        self.ingest_with_progress(documents, |_| {})
    }

    /// [`ingest`](Self::ingest), calling `on_document` after each document is settled
    #[inline]
    pub fn ingest_with_progress<F>(
        &mut self,
        documents: &[Document],
        on_document: F,
    ) -> IngestReport
    where
        F: FnMut(&DocumentOutcome),
    {
        let pending = documents.iter().map(PendingDocument::Loaded).collect();
        self.ingest_pending(pending, on_document)
    }

    /// Read files from disk and ingest them in order.
    ///
    /// A file that cannot be read counts as an extraction failure of that document.
    /// Files after an aborting failure are never read.
    #[inline]
    pub fn ingest_paths<P>(&mut self, paths: &[P]) -> IngestReport
    where
        P: AsRef<Path>,
    {
        self.ingest_paths_with_progress(paths, |_| {})
    }

    /// [`ingest_paths`](Self::ingest_paths), calling `on_document` after each file is settled
    #[inline]
    pub fn ingest_paths_with_progress<P, F>(&mut self, paths: &[P], on_document: F) -> IngestReport
    where
        P: AsRef<Path>,
        F: FnMut(&DocumentOutcome),
    {
        let pending = paths
            .iter()
            .map(|path| PendingDocument::OnDisk(path.as_ref()))
            .collect();
        self.ingest_pending(pending, on_document)
    }

    fn ingest_pending<F>(
        &mut self,
        pending: Vec<PendingDocument<'_>>,
        mut on_document: F,
    ) -> IngestReport
    where
        F: FnMut(&DocumentOutcome),
    {
        info!(
            "Ingesting {} documents (policy: {})",
            pending.len(),
            self.failure_policy
        );

        let mut report = IngestReport {
            documents: Vec::with_capacity(pending.len()),
        };
        let mut aborted = false;

        for document in pending {
            let filename = document.filename();

            if aborted {
                debug!("Skipping {} after earlier failure", filename);
                let outcome = DocumentOutcome {
                    filename,
                    status: DocumentStatus::Skipped,
                };
                on_document(&outcome);
                report.documents.push(outcome);
                continue;
            }

            let result = match document {
                PendingDocument::Loaded(document) => self.ingest_document(document),
                PendingDocument::OnDisk(path) => Document::from_path(path)
                    .map_err(|e| RagError::Extraction {
                        source_name: filename.clone(),
                        message: format!("{:#}", e),
                    })
                    .and_then(|document| self.ingest_document(&document)),
            };

            let status = match result {
                Ok((fragments, first_id)) => DocumentStatus::Indexed {
                    fragments,
                    first_id,
                },
                Err(error) => {
                    error!("Error processing file {}: {}", filename, error);
                    let recoverable = matches!(error, RagError::Extraction { .. })
                        && self.failure_policy == FailurePolicy::Continue;
                    aborted = !recoverable;
                    DocumentStatus::Failed { error }
                }
            };

            let outcome = DocumentOutcome { filename, status };
            on_document(&outcome);
            report.documents.push(outcome);
        }

        info!(
            "Ingestion finished: {}/{} documents indexed, {} fragments total",
            report.indexed_count(),
            report.documents.len(),
            self.len()
        );
        report
    }

    fn ingest_document(&mut self, document: &Document) -> Result<(usize, usize)> {
        let text = self
            .extractor
            .extract(document)
            .map_err(|e| RagError::Extraction {
                source_name: document.filename.clone(),
                message: format!("{:#}", e),
            })?;

        if text.is_empty() {
            warn!("No text extracted from {}", document.filename);
        }

        self.ingest_text(&document.filename, &text)
    }

    /// Fragment, embed, and index already-extracted text under `source`.
    ///
    /// Returns the number of fragments added and the id of the first one. On error
    /// neither the index nor the store has changed.
    #[inline]
    pub fn ingest_text(&mut self, source: &str, text: &str) -> Result<(usize, usize)> {
        let fragments = fragmenter::segment_document(text, source);
        let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();

        let vectors = self
            .embedder
            .embed(&texts)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Embedder returned {} vectors for {} fragments of {}",
                vectors.len(),
                texts.len(),
                source
            )));
        }

        let first_id = self.index.add(&vectors).map_err(dimension_error)?;
        let store_first_id = self.store.append(fragments);
        debug_assert_eq!(first_id, store_first_id);

        debug!(
            "Indexed {} fragments from {} (ids {}..{})",
            texts.len(),
            source,
            first_id,
            self.len()
        );
        Ok((texts.len(), first_id))
    }

    /// Run the retrieval pipeline for one query
    #[inline]
    pub fn query(&self, query: &str) -> Result<QueryOutcome> {
        if self.store.is_empty() {
            info!("Query received before any document was ingested");
            return Ok(QueryOutcome::NoDocuments);
        }
        if query.is_empty() {
            return Ok(QueryOutcome::EmptyQuery);
        }

        let query_vector = self.embed_query(query)?;
        let neighbors = self
            .index
            .search(&query_vector, TOP_K)
            .map_err(dimension_error)?;

        let candidates = neighbors
            .into_iter()
            .map(|neighbor| -> Result<SearchResult> {
                let fragment = self.store.get(neighbor.id).ok_or_else(|| {
                    RagError::Other(anyhow::anyhow!(
                        "Index id {} has no stored fragment",
                        neighbor.id
                    ))
                })?;
                Ok(SearchResult {
                    score: neighbor.distance,
                    text: fragment.text.clone(),
                    source: fragment.source.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let candidate_count = candidates.len();
        let kept: Vec<SearchResult> = candidates
            .into_iter()
            .filter(|result| result.score > MIN_DISTANCE)
            .collect();

        debug!(
            "Query matched {} candidates, {} kept by distance filter",
            candidate_count,
            kept.len()
        );

        if kept.is_empty() {
            return Ok(QueryOutcome::NoMatches);
        }

        Ok(QueryOutcome::Results(lexical::rerank(query, kept)))
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[query.to_string()])
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Embedder returned no vector for query".to_string()))
    }
}

/// A batch entry: bytes already in memory, or a file read when its turn comes
enum PendingDocument<'a> {
    Loaded(&'a Document),
    OnDisk(&'a Path),
}

impl PendingDocument<'_> {
    fn filename(&self) -> String {
        match self {
            Self::Loaded(document) => document.filename.clone(),
            Self::OnDisk(path) => document_name(path),
        }
    }
}

fn dimension_error(error: IndexError) -> RagError {
    match error {
        IndexError::DimensionMismatch {
            expected, actual, ..
        } => RagError::DimensionMismatch { expected, actual },
        IndexError::EmptyIndex => RagError::Index(error),
    }
}
