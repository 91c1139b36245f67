//! Lexical similarity used to reorder vector search candidates.
//!
//! The ratio is the Ratcliff/Obershelp "gestalt" measure: find the longest common
//! block, recurse on the unmatched pieces to either side, and report
//! `2 * matched / (len(a) + len(b))`. Matching follows the conventions of Python's
//! `difflib.SequenceMatcher` with no junk predicate, including its automatic
//! treatment of very frequent characters in long second sequences as junk.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use super::SearchResult;

/// Second sequences at least this long get the popular-character heuristic
const AUTOJUNK_MIN_LEN: usize = 200;

/// A maximal run of equal characters: `a[a_start..a_start + size] == b[b_start..b_start + size]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

/// Compares two strings character by character
#[derive(Debug)]
pub struct SequenceMatcher {
    a: Vec<char>,
    b: Vec<char>,
    b2j: HashMap<char, Vec<usize>>,
}

impl SequenceMatcher {
    #[inline]
    pub fn new(a: &str, b: &str) -> Self {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let b2j = index_positions(&b);
        Self { a, b, b2j }
    }

    /// Longest matching block within `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Among equally long blocks the one starting earliest in `a` wins, then the one
    /// starting earliest in `b`.
    #[inline]
    pub fn find_longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> MatchingBlock {
        let mut best_i = alo;
        let mut best_j = blo;
        let mut best_size = 0;

        // j2len[j] = length of the longest match ending with a[i - 1] and b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_j2len.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next_j2len;
        }

        // Popular characters were left out of b2j; extend across them on both sides
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        MatchingBlock {
            a_start: best_i,
            b_start: best_j,
            size: best_size,
        }
    }

    /// All matching blocks in ascending order, with adjacent blocks merged
    #[inline]
    pub fn matching_blocks(&self) -> Vec<MatchingBlock> {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let block = self.find_longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            let (i, j, k) = (block.a_start, block.b_start, block.size);
            blocks.push(block);
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                pending.push((i + k, ahi, j + k, bhi));
            }
        }
        blocks.sort_by_key(|block| (block.a_start, block.b_start));

        let mut merged: Vec<MatchingBlock> = Vec::with_capacity(blocks.len());
        for block in blocks {
            match merged.last_mut() {
                Some(last)
                    if last.a_start + last.size == block.a_start
                        && last.b_start + last.size == block.b_start =>
                {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        merged
    }

    /// Similarity in `[0, 1]`; `1.0` for identical strings, including two empty ones
    #[inline]
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|block| block.size).sum();
        2.0 * matched as f64 / total as f64
    }
}

/// Positions of every character in `b`, minus popular characters when `b` is long
fn index_positions(b: &[char]) -> HashMap<char, Vec<usize>> {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &c) in b.iter().enumerate() {
        b2j.entry(c).or_default().push(j);
    }

    if b.len() >= AUTOJUNK_MIN_LEN {
        let threshold = b.len() / 100 + 1;
        b2j.retain(|_, positions| positions.len() <= threshold);
    }
    b2j
}

/// Similarity ratio between `query` and `text`
#[inline]
pub fn similarity(query: &str, text: &str) -> f64 {
    SequenceMatcher::new(query, text).ratio()
}

/// Reorder results by descending lexical similarity to the raw query.
///
/// The sort is stable: results with equal ratios keep their vector-search order.
#[inline]
pub fn rerank(query: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut scored: Vec<(f64, SearchResult)> = results
        .into_iter()
        .map(|result| (similarity(query, &result.text), result))
        .collect();

    scored.sort_by(|(left, _), (right, _)| right.total_cmp(left));
    scored.into_iter().map(|(_, result)| result).collect()
}
