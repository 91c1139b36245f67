use super::*;

fn result(text: &str, score: f32) -> SearchResult {
    SearchResult {
        score,
        text: text.to_string(),
        source: "doc.pdf".to_string(),
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-12,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn identical_strings_have_ratio_one() {
    assert_close(similarity("The cat sat", "The cat sat"), 1.0);
    assert_close(similarity("", ""), 1.0);
}

#[test]
fn disjoint_or_empty_strings_have_ratio_zero() {
    assert_close(similarity("abc", ""), 0.0);
    assert_close(similarity("abc", "xyz"), 0.0);
}

#[test]
fn ratio_matches_reference_values() {
    assert_close(similarity("abcd", "bcde"), 0.75);
    assert_close(similarity("abxcd", "abcd"), 8.0 / 9.0);
    assert_close(similarity("the cat sat", "The cat sat"), 20.0 / 22.0);
    assert_close(similarity("where did the cat sit", "The cat sat"), 0.5625);
    assert_close(similarity("where did the cat sit", " The dog ran"), 12.0 / 33.0);
}

#[test]
fn ratio_counts_characters_not_bytes() {
    assert_close(similarity("ação", "acao"), 0.5);
}

#[test]
fn matching_blocks_are_ordered() {
    let matcher = SequenceMatcher::new("abxcd", "abcd");

    assert_eq!(
        matcher.matching_blocks(),
        vec![
            MatchingBlock {
                a_start: 0,
                b_start: 0,
                size: 2,
            },
            MatchingBlock {
                a_start: 3,
                b_start: 2,
                size: 2,
            },
        ]
    );
}

#[test]
fn longest_match_prefers_earliest_block() {
    let matcher = SequenceMatcher::new(" abcd", "abcd abcd");

    assert_eq!(
        matcher.find_longest_match(0, 5, 0, 9),
        MatchingBlock {
            a_start: 0,
            b_start: 4,
            size: 5,
        }
    );
}

#[test]
fn popular_characters_in_long_text_are_only_matched_by_extension() {
    // In a 200+ char second sequence, characters seen more than len/100 + 1 times
    // are not indexed, so only the run reachable from the block start matches.
    assert_close(similarity("a", &"a".repeat(200)), 2.0 / 201.0);
    assert_close(similarity("xyxy", &"xy".repeat(150)), 8.0 / 304.0);
    // The heuristic only looks at the second sequence
    assert_close(similarity(&"a".repeat(200), "a"), 2.0 / 201.0);
}

#[test]
fn rerank_sorts_by_descending_similarity() {
    let results = vec![
        result(" The dog ran", 0.9),
        result("The cat sat", 1.2),
        result("", 2.0),
    ];

    let reranked = rerank("where did the cat sit", results);

    let texts: Vec<&str> = reranked.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["The cat sat", " The dog ran", ""]);
}

#[test]
fn rerank_is_stable_for_equal_ratios() {
    let results = vec![result("xyz", 3.0), result("uvw", 1.0), result("abc", 2.0)];

    let reranked = rerank("abc", results);

    // "xyz" and "uvw" both score 0.0 and keep their relative order
    let scores: Vec<f32> = reranked.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![2.0, 3.0, 1.0]);
}

#[test]
fn rerank_is_deterministic() {
    let results = vec![
        result("alpha beta", 1.0),
        result("beta gamma", 1.5),
        result("gamma delta", 2.5),
        result("alpha", 3.5),
    ];

    let first = rerank("alpha gamma", results.clone());
    let second = rerank("alpha gamma", results);

    assert_eq!(first, second);
}
