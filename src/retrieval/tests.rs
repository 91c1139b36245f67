use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::anyhow;
use tempfile::TempDir;

use super::*;
use crate::extraction::PlainTextExtractor;

/// Buckets character codes into a small fixed-size histogram
struct CharHistogramEmbedder {
    dimension: usize,
}

impl Embedder for CharHistogramEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                for c in text.chars() {
                    vector[c as usize % self.dimension] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Returns pre-recorded vectors, one batch per call
struct ScriptedEmbedder {
    batches: Mutex<VecDeque<Vec<Vec<f32>>>>,
}

impl ScriptedEmbedder {
    fn new(batches: Vec<Vec<Vec<f32>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }
}

impl Embedder for ScriptedEmbedder {
    fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batches
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted batch left"))
    }
}

/// Produces vectors one component longer than the index expects
struct OversizedEmbedder {
    dimension: usize,
}

impl Embedder for OversizedEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; self.dimension + 1]).collect())
    }
}

struct UnreachableEmbedder;

impl Embedder for UnreachableEmbedder {
    fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}

const DIM: usize = 8;

fn histogram_engine() -> RetrievalEngine {
    RetrievalEngine::new(
        DIM,
        CharHistogramEmbedder { dimension: DIM },
        PlainTextExtractor,
    )
    .expect("engine should build")
}

fn scripted_engine(batches: Vec<Vec<Vec<f32>>>) -> RetrievalEngine {
    RetrievalEngine::new(2, ScriptedEmbedder::new(batches), PlainTextExtractor)
        .expect("engine should build")
}

fn assert_aligned(engine: &RetrievalEngine) {
    assert_eq!(engine.index().len(), engine.store().len());
}

fn unreadable(name: &str) -> Document {
    Document::new(name, vec![0xff, 0xfe, 0xfd])
}

#[test]
fn zero_dimension_is_rejected() {
    let result = RetrievalEngine::new(0, CharHistogramEmbedder { dimension: 1 }, PlainTextExtractor);

    assert!(matches!(result, Err(RagError::Config(_))));
}

#[test]
fn query_before_ingestion_reports_no_documents() {
    let engine = histogram_engine();

    let outcome = engine.query("anything").expect("query should not fail");

    assert_eq!(outcome, QueryOutcome::NoDocuments);
    assert!(outcome.results().is_empty());
}

#[test]
fn no_documents_is_checked_before_empty_query() {
    let engine = histogram_engine();

    let outcome = engine.query("").expect("query should not fail");

    assert_eq!(outcome, QueryOutcome::NoDocuments);
}

#[test]
fn empty_query_after_ingestion_is_signalled() {
    let mut engine = histogram_engine();
    engine
        .ingest_text("a.pdf", "Some text")
        .expect("ingest should succeed");

    let outcome = engine.query("").expect("query should not fail");

    assert_eq!(outcome, QueryOutcome::EmptyQuery);
}

#[test]
fn trailing_period_fragment_is_indexed() {
    let mut engine = histogram_engine();

    let report = engine.ingest(&[Document::new("a.txt", "The cat sat. The dog ran.")]);

    assert!(report.is_success());
    assert_eq!(report.fragments_added(), 3);
    assert_eq!(engine.len(), 3);
    assert_aligned(&engine);

    let texts: Vec<&str> = engine
        .store()
        .iter()
        .map(|(_, fragment)| fragment.text.as_str())
        .collect();
    assert_eq!(texts, vec!["The cat sat", " The dog ran", ""]);
    assert!(engine.store().iter().all(|(_, f)| f.source == "a.txt"));
}

#[test]
fn text_without_periods_is_one_fragment() {
    let mut engine = histogram_engine();
    let text = "A single paragraph without any sentence terminator";

    let (fragments, first_id) = engine
        .ingest_text("plain.pdf", text)
        .expect("ingest should succeed");

    assert_eq!((fragments, first_id), (1, 0));
    assert_eq!(engine.store().get(0).map(|f| f.text.as_str()), Some(text));
}

#[test]
fn ids_are_dense_across_ingestion_calls() {
    let mut engine = histogram_engine();

    let first = engine.ingest(&[Document::new("one.txt", "A. B")]);
    let second = engine.ingest(&[
        Document::new("two.txt", "C. D. E"),
        Document::new("three.txt", "F"),
    ]);

    let first_ids: Vec<usize> = first
        .documents
        .iter()
        .chain(second.documents.iter())
        .filter_map(|doc| match doc.status {
            DocumentStatus::Indexed { first_id, .. } => Some(first_id),
            DocumentStatus::Failed { .. } | DocumentStatus::Skipped => None,
        })
        .collect();

    assert_eq!(first_ids, vec![0, 2, 5]);
    assert_eq!(engine.len(), 6);
    assert_aligned(&engine);
    assert_eq!(
        engine.store().get(5).map(|f| f.source.as_str()),
        Some("three.txt")
    );
}

#[test]
fn identical_fragment_ranks_first_after_rerank() {
    // Fragments sit on the x axis; the query vector is far from all of them so
    // every candidate passes the distance filter and lexical order decides.
    let mut engine = scripted_engine(vec![
        vec![vec![1.0, 0.0], vec![2.0, 0.0]],
        vec![vec![3.0, 0.0], vec![4.0, 0.0]],
        vec![vec![10.0, 10.0]],
    ]);
    engine
        .ingest_text("animals.pdf", "The cat sat on the mat. Dogs bark")
        .expect("first document should ingest");
    engine
        .ingest_text("letters.pdf", "Alpha beta. Gamma delta")
        .expect("second document should ingest");

    let outcome = engine.query(" Dogs bark").expect("query should succeed");
    let results = outcome.results();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].text, " Dogs bark");
    assert_eq!(results[0].source, "animals.pdf");
    assert!((lexical::similarity(" Dogs bark", &results[0].text) - 1.0).abs() < f64::EPSILON);
    // distance from (10, 10) to (2, 0)
    assert!((results[0].score - 164.0).abs() < f32::EPSILON);
}

#[test]
fn closest_candidates_inside_min_distance_are_dropped() {
    let mut engine = histogram_engine();
    engine
        .ingest_text("a.pdf", "exact match")
        .expect("ingest should succeed");

    // The query embeds to the same vector as the only fragment: distance 0
    let outcome = engine.query("exact match").expect("query should succeed");

    assert_eq!(outcome, QueryOutcome::NoMatches);
}

#[test]
fn distance_filter_keeps_only_scores_above_threshold() {
    let mut engine = scripted_engine(vec![
        vec![
            vec![0.0, 0.0],
            vec![0.5, 0.0],
            vec![0.8, 0.0],
            vec![0.0, 2.0],
        ],
        vec![vec![0.0, 0.0]],
    ]);
    engine
        .ingest_text("doc.pdf", "zero. half. point eight. two")
        .expect("ingest should succeed");

    let outcome = engine.query("two").expect("query should succeed");
    let mut scores: Vec<f32> = outcome.results().iter().map(|r| r.score).collect();
    scores.sort_by(f32::total_cmp);

    // 0.0 and 0.25 are at or below the threshold; 0.64 and 4.0 survive
    assert_eq!(scores.len(), 2);
    assert!((scores[0] - 0.64).abs() < 1e-6);
    assert!((scores[1] - 4.0).abs() < 1e-6);
}

#[test]
fn at_most_top_k_results_are_returned() {
    let fragments: Vec<Vec<f32>> = (1..=8).map(|i| vec![i as f32, 0.0]).collect();
    let mut engine = scripted_engine(vec![fragments, vec![vec![-10.0, 0.0]]]);
    engine
        .ingest_text("many.pdf", "a. b. c. d. e. f. g. h")
        .expect("ingest should succeed");

    let outcome = engine.query("q").expect("query should succeed");
    let mut texts: Vec<&str> = outcome.results().iter().map(|r| r.text.as_str()).collect();
    texts.sort_unstable();

    assert_eq!(texts, vec![" b", " c", " d", " e", "a"]);
}

#[test]
fn equal_lexical_ratios_keep_distance_order() {
    let mut engine = scripted_engine(vec![
        vec![vec![3.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]],
        vec![vec![0.0, 0.0]],
    ]);
    engine
        .ingest_text("doc.pdf", "xxx.yyy.zzz")
        .expect("ingest should succeed");

    let outcome = engine.query("abc").expect("query should succeed");
    let texts: Vec<&str> = outcome.results().iter().map(|r| r.text.as_str()).collect();

    assert_eq!(texts, vec!["yyy", "zzz", "xxx"]);
}

#[test]
fn wrong_dimension_leaves_engine_unchanged() {
    let mut engine = histogram_engine();
    engine
        .ingest_text("before.pdf", "Already. Indexed")
        .expect("ingest should succeed");
    let before = engine.len();

    let mut oversized = RetrievalEngine::new(
        DIM,
        OversizedEmbedder { dimension: DIM },
        PlainTextExtractor,
    )
    .expect("engine should build");
    let error = oversized
        .ingest_text("bad.pdf", "One. Two")
        .expect_err("wrong dimension should fail");

    assert!(matches!(
        error,
        RagError::DimensionMismatch {
            expected: DIM,
            actual,
        } if actual == DIM + 1
    ));
    assert!(oversized.is_empty());
    assert_aligned(&oversized);
    assert_eq!(engine.len(), before);
}

#[test]
fn dimension_mismatch_aborts_batch_even_when_continuing() {
    let mut engine = RetrievalEngine::new(
        DIM,
        OversizedEmbedder { dimension: DIM },
        PlainTextExtractor,
    )
    .expect("engine should build")
    .with_failure_policy(FailurePolicy::Continue);

    let report = engine.ingest(&[
        Document::new("a.txt", "First. Document"),
        Document::new("b.txt", "Second"),
    ]);

    assert!(matches!(
        report.documents[0].status,
        DocumentStatus::Failed {
            error: RagError::DimensionMismatch { .. }
        }
    ));
    assert!(matches!(report.documents[1].status, DocumentStatus::Skipped));
    assert!(engine.is_empty());
    assert_aligned(&engine);
}

#[test]
fn extraction_failure_aborts_batch_by_default() {
    let mut engine = histogram_engine();
    assert_eq!(engine.failure_policy(), FailurePolicy::Abort);

    let report = engine.ingest(&[
        Document::new("good.txt", "Fine. Text"),
        unreadable("broken.pdf"),
        Document::new("later.txt", "Never read"),
    ]);

    assert!(matches!(
        report.documents[0].status,
        DocumentStatus::Indexed { fragments: 2, .. }
    ));
    assert!(matches!(
        &report.documents[1].status,
        DocumentStatus::Failed {
            error: RagError::Extraction { source_name, .. }
        } if source_name == "broken.pdf"
    ));
    assert!(matches!(report.documents[2].status, DocumentStatus::Skipped));
    assert_eq!(engine.len(), 2);
    assert_aligned(&engine);

    let message = report.message();
    assert!(message.starts_with("Error processing file broken.pdf: "));
    assert!(message.contains("1 of 3 PDFs processed and indexed successfully."));
    assert!(message.contains("1 files were not processed."));
}

#[test]
fn extraction_failure_continues_when_configured() {
    let mut engine = histogram_engine().with_failure_policy(FailurePolicy::Continue);

    let report = engine.ingest(&[
        unreadable("broken.pdf"),
        Document::new("good.txt", "Fine. Text"),
    ]);

    assert!(matches!(
        report.documents[0].status,
        DocumentStatus::Failed { .. }
    ));
    assert!(matches!(
        report.documents[1].status,
        DocumentStatus::Indexed {
            fragments: 2,
            first_id: 0,
        }
    ));
    assert_eq!(report.indexed_count(), 1);
    assert_eq!(report.skipped_count(), 0);
    assert!(!report.is_success());
    assert_eq!(engine.len(), 2);
}

#[test]
fn missing_file_continues_when_configured() {
    let dir = TempDir::new().expect("should create temp dir");
    let good = dir.path().join("good.txt");
    std::fs::write(&good, "Fine. Text").expect("should write file");
    let missing = dir.path().join("missing.txt");
    let mut engine = histogram_engine().with_failure_policy(FailurePolicy::Continue);

    let report = engine.ingest_paths(&[missing, good]);

    assert!(matches!(
        &report.documents[0].status,
        DocumentStatus::Failed {
            error: RagError::Extraction { source_name, message }
        } if source_name == "missing.txt" && message.contains("Failed to read")
    ));
    assert_eq!(report.documents[1].filename, "good.txt");
    assert!(matches!(
        report.documents[1].status,
        DocumentStatus::Indexed {
            fragments: 2,
            first_id: 0,
        }
    ));
    assert_eq!(engine.len(), 2);
    assert_aligned(&engine);
}

#[test]
fn missing_file_aborts_batch_but_keeps_earlier_documents() {
    let dir = TempDir::new().expect("should create temp dir");
    let first = dir.path().join("first.txt");
    let later = dir.path().join("later.txt");
    std::fs::write(&first, "Kept").expect("should write file");
    std::fs::write(&later, "Never read").expect("should write file");
    let mut engine = histogram_engine();

    let report = engine.ingest_paths(&[first, dir.path().join("gone.pdf"), later]);

    assert!(matches!(
        report.documents[0].status,
        DocumentStatus::Indexed { fragments: 1, .. }
    ));
    assert!(matches!(
        report.documents[1].status,
        DocumentStatus::Failed {
            error: RagError::Extraction { .. }
        }
    ));
    assert_eq!(report.documents[2].filename, "later.txt");
    assert!(matches!(report.documents[2].status, DocumentStatus::Skipped));
    assert!(report.message().starts_with("Error processing file gone.pdf: "));
    assert_eq!(engine.store().sources(), vec!["first.txt"]);
    assert_aligned(&engine);
}

#[test]
fn embedding_failure_aborts_batch_even_when_continuing() {
    let mut engine = RetrievalEngine::new(DIM, UnreachableEmbedder, PlainTextExtractor)
        .expect("engine should build")
        .with_failure_policy(FailurePolicy::Continue);

    let report = engine.ingest(&[Document::new("a.txt", "x"), Document::new("b.txt", "y")]);

    assert!(matches!(
        &report.documents[0].status,
        DocumentStatus::Failed {
            error: RagError::Embedding(message)
        } if message.contains("connection refused")
    ));
    assert!(matches!(report.documents[1].status, DocumentStatus::Skipped));
    assert!(engine.is_empty());
}

#[test]
fn vector_count_mismatch_is_an_embedding_error() {
    let mut engine = scripted_engine(vec![vec![vec![1.0, 1.0]]]);

    let error = engine
        .ingest_text("short.pdf", "one. two. three")
        .expect_err("too few vectors should fail");

    assert!(matches!(error, RagError::Embedding(_)));
    assert!(engine.is_empty());
    assert_aligned(&engine);
}

#[test]
fn successful_batch_message() {
    let mut engine = histogram_engine();

    let report = engine.ingest(&[Document::new("a.txt", "A"), Document::new("b.txt", "B")]);

    assert_eq!(report.message(), "2 PDFs processed and indexed successfully.");
    assert_eq!(report.failures().count(), 0);
}

#[test]
fn empty_batch_ingests_nothing() {
    let mut engine = histogram_engine();

    let report = engine.ingest(&[]);

    assert!(report.documents.is_empty());
    assert!(engine.is_empty());
}

#[test]
fn query_embedding_failure_is_returned() {
    let mut engine = scripted_engine(vec![vec![vec![1.0, 0.0]]]);
    engine.ingest_text("a.pdf", "one").expect("ingest should succeed");

    let error = engine.query("q").expect_err("no scripted vector is left for the query");

    assert!(matches!(error, RagError::Embedding(_)));
}

#[test]
fn failure_policy_display() {
    assert_eq!(FailurePolicy::Abort.to_string(), "abort");
    assert_eq!(FailurePolicy::Continue.to_string(), "continue");
}

#[test]
fn progress_callback_sees_every_document() {
    let mut engine = histogram_engine();
    let mut seen = Vec::new();

    engine.ingest_with_progress(
        &[
            Document::new("a.txt", "A"),
            unreadable("b.pdf"),
            Document::new("c.txt", "C"),
        ],
        |outcome| seen.push(outcome.filename.clone()),
    );

    assert_eq!(seen, vec!["a.txt", "b.pdf", "c.txt"]);
}
