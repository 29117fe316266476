//! Exact k-nearest-neighbor search under cosine distance.
//!
//! Brute force over the whole catalog. Rows are stored contiguously with
//! their squared norms precomputed, and the structure is never mutated
//! after [`SimilarityIndex::build`], so it can be shared across threads
//! without locking.

use crate::error::ModelError;
use std::cmp::Ordering;

/// Distance between opposite vectors.
pub const MAX_DISTANCE: f64 = 2.0;

/// One neighbor returned by [`SimilarityIndex::query`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row index in the catalog.
    pub row: usize,
    /// Cosine distance in `[0, 2]` (lower is more similar).
    pub distance: f64,
}

impl Neighbor {
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

#[derive(Debug)]
pub struct SimilarityIndex {
    dim: usize,
    data: Vec<f64>,
    sq_norms: Vec<f64>,
}

impl SimilarityIndex {
    /// Build the index over `vectors`, row `i` of the catalog being `vectors[i]`.
    pub fn build<V: AsRef<[f64]>>(vectors: &[V]) -> Result<Self, ModelError> {
        let first = vectors.first().ok_or(ModelError::EmptyCatalog)?;
        let dim = first.as_ref().len();
        if dim == 0 {
            return Err(ModelError::Invalid("feature vectors are empty".into()));
        }

        let mut data = Vec::with_capacity(dim * vectors.len());
        let mut sq_norms = Vec::with_capacity(vectors.len());
        for (row, v) in vectors.iter().enumerate() {
            let v = v.as_ref();
            if v.len() != dim {
                return Err(ModelError::DimensionMismatch {
                    row,
                    expected: dim,
                    found: v.len(),
                });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(ModelError::Invalid(format!(
                    "row {row} has a non-finite value"
                )));
            }
            data.extend_from_slice(v);
            sq_norms.push(dot(v, v));
        }

        Ok(Self {
            dim,
            data,
            sq_norms,
        })
    }

    pub fn len(&self) -> usize {
        self.sq_norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sq_norms.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// Up to `k` nearest rows to `query`, by ascending distance and then
    /// ascending row index. Asking for more rows than exist is not an error.
    ///
    /// `query` must have [`dim`](Self::dim) values; callers validate this.
    pub fn query(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        self.query_capped(query, k, MAX_DISTANCE)
    }

    /// Like [`query`](Self::query), with every distance first lowered to at
    /// most `cap`. Rows past the cap tie and come back in row order.
    pub fn query_capped(&self, query: &[f64], k: usize, cap: f64) -> Vec<Neighbor> {
        debug_assert_eq!(query.len(), self.dim);
        let k = k.min(self.len());
        if k == 0 {
            return Vec::new();
        }

        let query_sq_norm = dot(query, query);
        let mut neighbors: Vec<Neighbor> = (0..self.len())
            .map(|row| Neighbor {
                row,
                distance: cosine_distance(
                    query,
                    query_sq_norm,
                    self.row(row),
                    self.sq_norms[row],
                )
                .min(cap),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, by_distance_then_row);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(by_distance_then_row);
        neighbors
    }
}

fn by_distance_then_row(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.row.cmp(&b.row))
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `1 - cos(a, b)`, clamped to `[0, 2]`.
///
/// The denominator is `sqrt(|a|² |b|²)` rather than `|a| |b|`: for identical
/// inputs `dot == |a|²` bit for bit and `sqrt(x * x) == x` in IEEE
/// arithmetic, so self-distance is exactly zero. A zero vector, or one
/// whose squared norm overflows, is at distance 1 from everything.
fn cosine_distance(a: &[f64], a_sq_norm: f64, b: &[f64], b_sq_norm: f64) -> f64 {
    let denom = (a_sq_norm * b_sq_norm).sqrt();
    if !denom.is_normal() {
        return 1.0;
    }
    let cos = dot(a, b) / denom;
    if !cos.is_finite() {
        return 1.0;
    }
    1.0 - cos.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_similarity_is_exact() {
        let vectors = vec![
            vec![0.3, -1.7, 2.2, 0.01],
            vec![-0.123456789, 4.5, 1e-3, -9.87],
            vec![1.0 / 3.0, 2.0 / 3.0, -0.7071067811865476, 12.5],
        ];
        let index = SimilarityIndex::build(&vectors).unwrap();
        for (row, v) in vectors.iter().enumerate() {
            let top = index.query(v, 1);
            assert_eq!(top[0].row, row);
            assert_eq!(top[0].distance, 0.0);
            assert_eq!(top[0].similarity(), 1.0);
        }
    }

    #[test]
    fn test_orders_by_distance() {
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        let index = SimilarityIndex::build(&vectors).unwrap();
        let result = index.query(&[1.0, 0.1], 3);
        let rows: Vec<usize> = result.iter().map(|n| n.row).collect();
        assert_eq!(rows, vec![1, 2, 0]);
        assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_ties_break_by_row() {
        // Parallel vectors share a distance to any query.
        let vectors = vec![
            vec![5.0, 0.0],
            vec![2.0, 2.0],
            vec![1.0, 0.0],
            vec![3.0, 0.0],
        ];
        let index = SimilarityIndex::build(&vectors).unwrap();
        let result = index.query(&[1.0, 0.0], 2);
        assert_eq!(result.iter().map(|n| n.row).collect::<Vec<_>>(), vec![0, 2]);
        let all = index.query(&[1.0, 0.0], 4);
        assert_eq!(
            all.iter().map(|n| n.row).collect::<Vec<_>>(),
            vec![0, 2, 3, 1]
        );
    }

    #[test]
    fn test_k_larger_than_catalog() {
        let index = SimilarityIndex::build(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
        assert_eq!(index.query(&[1.0, 1.0], 10).len(), 2);
        assert!(index.query(&[1.0, 1.0], 0).is_empty());
    }

    #[test]
    fn test_opposite_and_zero_vectors() {
        let index = SimilarityIndex::build(&[vec![1.0, 0.0], vec![0.0, 0.0]]).unwrap();
        let result = index.query(&[-1.0, 0.0], 2);
        assert_eq!(result[0].row, 1);
        assert_eq!(result[0].distance, 1.0);
        assert_eq!(result[1].distance, 2.0);
    }

    #[test]
    fn test_capped_distances_tie_by_row() {
        let vectors = vec![
            vec![-1.0, 0.1],
            vec![1.0, 0.0],
            vec![-1.0, 0.0],
            vec![-1.0, 0.5],
        ];
        let index = SimilarityIndex::build(&vectors).unwrap();

        let raw = index.query(&[1.0, 0.0], 4);
        assert_eq!(raw.iter().map(|n| n.row).collect::<Vec<_>>(), vec![1, 3, 0, 2]);

        let capped = index.query_capped(&[1.0, 0.0], 4, 1.0);
        assert_eq!(
            capped.iter().map(|n| n.row).collect::<Vec<_>>(),
            vec![1, 0, 2, 3]
        );
        assert!(capped[1..].iter().all(|n| n.distance == 1.0));

        // The cap also decides which rows make the cut.
        let top2 = index.query_capped(&[1.0, 0.0], 2, 1.0);
        assert_eq!(top2.iter().map(|n| n.row).collect::<Vec<_>>(), vec![1, 0]);
    }

    #[test]
    fn test_huge_query_values_stay_finite() {
        let index = SimilarityIndex::build(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        let result = index.query(&[1e200, 1e200], 2);
        assert!(result.iter().all(|n| n.distance.is_finite()));
        assert!(result.iter().all(|n| n.distance == 1.0));
        assert_eq!(result[0].row, 0);
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert!(matches!(
            SimilarityIndex::build(&empty),
            Err(ModelError::EmptyCatalog)
        ));
        assert!(matches!(
            SimilarityIndex::build(&[vec![1.0, 2.0], vec![1.0]]),
            Err(ModelError::DimensionMismatch {
                row: 1,
                expected: 2,
                found: 1
            })
        ));
        assert!(SimilarityIndex::build(&[vec![f64::NAN]]).is_err());
    }
}
