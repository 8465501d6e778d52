//! Cross-modal ranking of kept frames against a segment summary.

use std::{collections::HashMap, path::PathBuf};

use crate::semantic::{cosine_similarity, EmbeddingCache, SharedEmbedding};

#[derive(Clone, Debug, PartialEq)]
pub struct AlignedFrameSet {
    /// Best match first, at most `max_k` entries
    pub ranked: Vec<PathBuf>,
    /// Similarity of the top frame, `None` when positional fallback was used
    pub best_similarity: Option<f32>,
}

impl AlignedFrameSet {
    fn positional(kept: &[PathBuf], max_k: usize) -> Self {
        Self {
            ranked: kept.iter().take(max_k).cloned().collect(),
            best_similarity: None,
        }
    }
}

pub struct TextAligner<'a> {
    cache: &'a EmbeddingCache,
}

impl<'a> TextAligner<'a> {
    pub fn new(cache: &'a EmbeddingCache) -> Self {
        Self { cache }
    }

    /// Pick the `max_k` frames closest to `summary`.
    ///
    /// Never fails: a blank summary, an unavailable text embedding or no
    /// frame vectors at all degrade to the first `max_k` frames. Frames the
    /// provider could not embed fill leftover slots in their original order.
    pub fn align(
        &self,
        kept: &[PathBuf],
        vectors: &HashMap<PathBuf, SharedEmbedding>,
        summary: &str,
        max_k: usize,
    ) -> AlignedFrameSet {
        if kept.is_empty() || max_k == 0 {
            return AlignedFrameSet {
                ranked: vec![],
                best_similarity: None,
            };
        }

        if summary.trim().is_empty() {
            return AlignedFrameSet::positional(kept, max_k);
        }

        let query = match self.cache.text_embedding(summary) {
            Ok(query) => query,
            Err(e) => {
                log::warn!(
                    "[{}] text embedding failed, using positional selection: {e}",
                    self.cache.task_id()
                );
                return AlignedFrameSet::positional(kept, max_k);
            }
        };

        let mut known: HashMap<&PathBuf, SharedEmbedding> = kept
            .iter()
            .filter_map(|path| {
                vectors
                    .get(path)
                    .cloned()
                    .or_else(|| self.cache.get(path))
                    .map(|v| (path, v))
            })
            .collect();

        let missing: Vec<PathBuf> = kept
            .iter()
            .filter(|path| !known.contains_key(path))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let computed = self.cache.get_or_compute(&missing);
            for path in kept {
                if let Some(v) = computed.get(path) {
                    known.insert(path, v.clone());
                }
            }
        }

        let mut scored = Vec::with_capacity(kept.len());
        let mut unranked = Vec::new();
        for path in kept {
            match known.get(path) {
                Some(v) => scored.push((path, cosine_similarity(&query.values, &v.values))),
                None => unranked.push(path),
            }
        }

        if scored.is_empty() {
            return AlignedFrameSet::positional(kept, max_k);
        }

        // stable: equal scores keep input order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let best_similarity = scored.first().map(|(_, score)| *score);

        let ranked = scored
            .into_iter()
            .map(|(path, _)| path)
            .chain(unranked)
            .take(max_k)
            .cloned()
            .collect();

        AlignedFrameSet {
            ranked,
            best_similarity,
        }
    }
}
