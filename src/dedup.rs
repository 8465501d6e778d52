//! Greedy near-duplicate removal in embedding space.
//!
//! Candidates are visited in input order and compared against every frame
//! kept so far. A different traversal order yields a different kept set; the
//! input order is the defined behavior.

use crate::semantic::{l2_normalize, FlatIndex, IndexError};

#[derive(Clone, Debug, PartialEq)]
pub struct DeduplicationResult<T> {
    /// Order-preserving subsequence of the input
    pub kept: Vec<T>,
    pub removed_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("{items} items but {vectors} vectors")]
    LengthMismatch { items: usize, vectors: usize },

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Clone, Copy, Debug)]
pub struct Deduplicator {
    threshold: f32,
}

impl Deduplicator {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Keep each item unless its vector reaches `threshold` cosine
    /// similarity with an already kept one. Zero vectors score 0 against
    /// everything and are always kept.
    ///
    /// The comparison is inclusive (`>=`), unlike a strict "exceeds": a
    /// candidate exactly at the threshold is dropped.
    pub fn dedupe<T, V>(&self, items: &[T], vectors: &[V]) -> Result<DeduplicationResult<T>, DedupError>
    where
        T: Clone,
        V: AsRef<[f32]>,
    {
        if items.len() != vectors.len() {
            return Err(DedupError::LengthMismatch {
                items: items.len(),
                vectors: vectors.len(),
            });
        }

        let Some(first) = vectors.first() else {
            return Ok(DeduplicationResult {
                kept: vec![],
                removed_count: 0,
            });
        };

        let mut index = FlatIndex::new(first.as_ref().len());
        let mut kept = Vec::with_capacity(items.len());

        for (item, vector) in items.iter().zip(vectors) {
            let normalized = l2_normalize(vector.as_ref());
            let duplicate = index
                .max_inner_product(&normalized)?
                .is_some_and(|best| best >= self.threshold);

            if !duplicate {
                index.add(normalized)?;
                kept.push(item.clone());
            }
        }

        Ok(DeduplicationResult {
            removed_count: items.len() - kept.len(),
            kept,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(deg: f32) -> Vec<f32> {
        let rad = deg.to_radians();
        vec![rad.cos(), rad.sin()]
    }

    #[test]
    fn test_keeps_first_of_each_group() {
        let v = vec![1.0, 0.0, 0.0];
        let w = vec![0.0, 1.0, 0.0];
        let x = vec![0.0, 0.0, 1.0];
        let near_x = vec![0.0, 0.05, 1.0];
        let vectors = vec![v.clone(), v, w, x, near_x];
        let items: Vec<usize> = (0..5).collect();

        let result = Deduplicator::new(0.9).dedupe(&items, &vectors).unwrap();
        assert_eq!(result.kept, vec![0, 2, 3]);
        assert_eq!(result.removed_count, 2);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let items = ["a", "b"];
        let vectors = [vec![1.0, 0.0], vec![1.0, 0.0]];

        let result = Deduplicator::new(1.0).dedupe(&items, &vectors).unwrap();
        assert_eq!(result.kept, vec!["a"]);
    }

    #[test]
    fn test_idempotent_on_distinct_set() {
        let dedup = Deduplicator::new(0.9);
        let items = ["a", "b", "c"];
        let vectors = [unit(0.0), unit(60.0), unit(120.0)];

        let once = dedup.dedupe(&items, &vectors).unwrap();
        assert_eq!(once.kept, items.to_vec());

        let twice = dedup.dedupe(&once.kept, &vectors).unwrap();
        assert_eq!(twice, once);
        assert_eq!(twice.removed_count, 0);
    }

    #[test]
    fn test_zero_vector_is_kept() {
        let items = ["zero", "a", "zero-again"];
        let vectors = [vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 0.0]];

        let result = Deduplicator::new(0.5).dedupe(&items, &vectors).unwrap();
        assert_eq!(result.kept, items.to_vec());
    }

    #[test]
    fn test_length_mismatch() {
        let result = Deduplicator::new(0.9).dedupe(&["a", "b"], &[vec![1.0]]);
        assert!(matches!(
            result,
            Err(DedupError::LengthMismatch { items: 2, vectors: 1 })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = Deduplicator::new(0.9).dedupe(&["a", "b"], &[vec![1.0, 0.0], vec![1.0]]);
        assert!(matches!(result, Err(DedupError::Index(_))));
    }

    #[test]
    fn test_empty_input() {
        let items: [&str; 0] = [];
        let vectors: [Vec<f32>; 0] = [];
        let result = Deduplicator::new(0.9).dedupe(&items, &vectors).unwrap();
        assert!(result.kept.is_empty());
        assert_eq!(result.removed_count, 0);
    }

    #[test]
    fn test_result_depends_on_order() {
        // a~b and b~c reach the threshold, a~c does not
        let threshold = 30f32.to_radians().cos();
        let dedup = Deduplicator::new(threshold);
        let (a, b, c) = (unit(0.0), unit(25.0), unit(50.0));

        let forward = dedup
            .dedupe(&["a", "b", "c"], &[a.clone(), b.clone(), c.clone()])
            .unwrap();
        assert_eq!(forward.kept, vec!["a", "c"]);

        let swapped = dedup.dedupe(&["b", "a", "c"], &[b, a, c]).unwrap();
        assert_eq!(swapped.kept, vec!["b"]);
        assert_eq!(swapped.removed_count, 2);
    }
}
