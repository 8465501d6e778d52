//! Flat in-memory vector index and similarity helpers.
//!
//! Rows are expected to be L2-normalized, so inner product equals cosine
//! similarity. Search is exhaustive; segment-sized inputs keep it cheap.

/// Exhaustive inner-product index over normalized rows.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    rows: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Create a new empty index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row. The caller normalizes; zero rows are accepted and
    /// score 0 against everything.
    pub fn add(&mut self, normalized: Vec<f32>) -> Result<(), IndexError> {
        self.check(&normalized)?;
        self.rows.push(normalized);
        Ok(())
    }

    /// Highest inner product between `query` and any stored row, or `None`
    /// when the index is empty.
    pub fn max_inner_product(&self, query: &[f32]) -> Result<Option<f32>, IndexError> {
        self.check(query)?;

        Ok(self
            .rows
            .iter()
            .map(|row| dot(row, query))
            .fold(None, |best: Option<f32>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            }))
    }

    fn check(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: v.len(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Unit-length copy of `v`. A zero vector stays zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / norm).collect()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0 for zero-norm inputs or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (na, nb) = (l2_norm(a), l2_norm(b));
    if na < f32::EPSILON || nb < f32::EPSILON {
        return 0.0;
    }

    dot(a, b) / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index() {
        let index = FlatIndex::new(384);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        let wrong_dims = vec![1.0, 0.0, 0.0, 0.0];

        let result = index.add(wrong_dims);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert!(index.is_empty());
    }

    #[test]
    fn test_empty_index_has_no_best() {
        let index = FlatIndex::new(2);
        assert_eq!(index.max_inner_product(&[1.0, 0.0]).unwrap(), None);
    }

    #[test]
    fn test_max_inner_product() {
        let mut index = FlatIndex::new(3);
        index.add(vec![1.0, 0.0, 0.0]).unwrap();
        index.add(vec![0.0, 1.0, 0.0]).unwrap();

        let query = l2_normalize(&[1.0, 0.1, 0.0]);
        let best = index.max_inner_product(&query).unwrap().unwrap();
        assert!((best - query[0]).abs() < 1e-6);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        index.add(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(index.max_inner_product(&[1.0, 0.0]).is_err());
    }

    #[test]
    fn test_normalize() {
        let v = l2_normalize(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);

        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
