#[cfg(test)]
mod tests;

use tracing::debug;

use crate::fragmenter::Fragment;

/// Positional store of fragment text and source name.
///
/// Entry `i` describes the vector stored under id `i` in the
/// [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    fragments: Vec<Fragment>,
}

impl DocumentStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Append fragments in order, returning the id of the first one
    #[inline]
    pub fn append(&mut self, fragments: Vec<Fragment>) -> usize {
        let first_id = self.fragments.len();
        let count = fragments.len();
        self.fragments.extend(fragments);
        debug!("Stored {} fragments starting at id {}", count, first_id);
        first_id
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<&Fragment> {
        self.fragments.get(id)
    }

    /// Iterate over `(id, fragment)` pairs in insertion order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Fragment)> {
        self.fragments.iter().enumerate()
    }

    /// Distinct source names in first-seen order
    #[inline]
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        for (_, fragment) in self.iter() {
            if !sources.contains(&fragment.source.as_str()) {
                sources.push(&fragment.source);
            }
        }
        sources
    }
}
