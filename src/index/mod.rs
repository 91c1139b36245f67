
use std::cmp::Ordering;

use thiserror::Error;
use tracing::debug;

/// Errors raised by the vector index
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Vector at position {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        position: usize,
    },
    #[error("Cannot search an empty index")]
    EmptyIndex,
}

/// A search hit: the row id of a stored vector and its squared L2 distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub distance: f32,
}

/// Append-only flat index with exact squared-Euclidean nearest-neighbor search.
///
/// Vectors are stored contiguously in insertion order; the row id of a vector is its
/// insertion position.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    #[inline]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            return 0;
        }
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Validate a batch of vectors against the index dimension without storing anything
    #[inline]
    pub fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        match vectors
            .iter()
            .position(|vector| vector.len() != self.dimension)
        {
            Some(position) => Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vectors[position].len(),
                position,
            }),
            None => Ok(()),
        }
    }

    /// Append vectors, assigning each the next sequential id.
    ///
    /// The whole batch is validated first; on error nothing is appended.
    /// Returns the id assigned to the first vector of the batch.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<usize, IndexError> {
        self.check_dimensions(vectors)?;

        let first_id = self.len();
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }

        debug!(
            "Added {} vectors to index (ids {}..{})",
            vectors.len(),
            first_id,
            self.len()
        );
        Ok(first_id)
    }

    /// Exact k-nearest-neighbor search by squared Euclidean distance.
    ///
    /// Every stored vector is scored. Results are ascending by distance, ties broken by
    /// lower id. Fewer than `k` results are returned when the index holds fewer vectors.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
                position: 0,
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, vector)| Neighbor {
                id,
                distance: squared_l2(query, vector),
            })
            .collect();

        neighbors.sort_by(compare_neighbors);
        neighbors.truncate(k);

        debug!(
            "Searched {} vectors, returning {} neighbors",
            self.len(),
            neighbors.len()
        );
        Ok(neighbors)
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// Squared Euclidean distance between two equal-length vectors
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
