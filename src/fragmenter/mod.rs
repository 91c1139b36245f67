
use tracing::debug;

/// Delimiter that separates fragments within extracted document text
pub const FRAGMENT_DELIMITER: char = '.';

/// A span of document text queued for indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// The fragment text, exactly as it appeared between delimiters
    pub text: String,
    /// Name of the document this fragment came from
    pub source: String,
}

/// Split raw document text into fragments on every period.
///
/// Nothing is trimmed or dropped: text without a period comes back as a single
/// fragment, and a trailing period produces a trailing empty fragment.
#[inline]
pub fn segment(text: &str) -> Vec<String> {
    let fragments: Vec<String> = text.split(FRAGMENT_DELIMITER).map(str::to_owned).collect();

    debug!(
        "Segmented {} chars into {} fragments",
        text.len(),
        fragments.len()
    );

    fragments
}

/// Segment a document and tag every fragment with its source name
#[inline]
pub fn segment_document(text: &str, source: &str) -> Vec<Fragment> {
    segment(text)
        .into_iter()
        .map(|text| Fragment {
            text,
            source: source.to_owned(),
        })
        .collect()
}
