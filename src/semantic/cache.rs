use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use sha2::{Digest, Sha256};

use super::{
    embeddings::{EmbeddingError, EmbeddingVector, Modality, SharedEmbedding},
    queue::ProviderHandle,
};
use crate::eid::TaskId;

/// Hex SHA-256 of `text`, used as the cache key for text embeddings.
pub fn text_digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Append-only vector store owned by a single task.
///
/// Lookups never block on the provider. Misses are batched and sent through
/// the shared [`ProviderHandle`]; a batch that fails is logged and left out
/// of the result, so callers must cope with partial coverage.
pub struct EmbeddingCache {
    task_id: TaskId,
    provider: ProviderHandle,
    batch_size: usize,
    images: RwLock<HashMap<PathBuf, SharedEmbedding>>,
    texts: RwLock<HashMap<String, SharedEmbedding>>,
}

impl EmbeddingCache {
    pub fn new(task_id: TaskId, provider: ProviderHandle, batch_size: usize) -> Self {
        Self {
            task_id,
            provider,
            batch_size: batch_size.max(1),
            images: RwLock::new(HashMap::new()),
            texts: RwLock::new(HashMap::new()),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn get(&self, path: &Path) -> Option<SharedEmbedding> {
        self.images
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    /// Number of cached image vectors.
    pub fn len(&self) -> usize {
        self.images.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Image vectors for `paths`, computing the missing ones batch by batch.
    pub fn get_or_compute(&self, paths: &[PathBuf]) -> HashMap<PathBuf, SharedEmbedding> {
        let mut out = HashMap::with_capacity(paths.len());
        let mut missing = Vec::new();

        {
            let images = self.images.read().unwrap_or_else(|e| e.into_inner());
            for path in paths {
                match images.get(path) {
                    Some(v) => {
                        out.insert(path.clone(), v.clone());
                    }
                    None if !missing.contains(path) => missing.push(path.clone()),
                    None => {}
                }
            }
        }

        if missing.is_empty() {
            return out;
        }

        log::debug!(
            "[{}] embedding {} frames ({} cached)",
            self.task_id,
            missing.len(),
            out.len()
        );

        for batch in missing.chunks(self.batch_size) {
            let Some((embedded, vectors)) = self.embed_batch(batch) else {
                continue;
            };

            let mut images = self.images.write().unwrap_or_else(|e| e.into_inner());
            for (path, values) in embedded.iter().zip(vectors) {
                let entry = images.entry(path.clone()).or_insert_with(|| {
                    Arc::new(EmbeddingVector {
                        key: path.to_string_lossy().into_owned(),
                        values,
                        modality: Modality::Image,
                    })
                });
                out.insert(path.clone(), entry.clone());
            }
        }

        out
    }

    /// Sends one batch. Frames the provider reports as unreadable are left
    /// out and the rest is sent once more; any other failure drops the batch.
    fn embed_batch(&self, batch: &[PathBuf]) -> Option<(Vec<PathBuf>, Vec<Vec<f32>>)> {
        let mut batch = batch.to_vec();
        let mut retried = false;

        loop {
            match self.provider.embed_images(batch.clone()) {
                Ok(vectors) => return Some((batch, vectors)),
                Err(EmbeddingError::Unreadable { paths }) if !retried => {
                    log::warn!(
                        "[{}] skipping {} unreadable frames",
                        self.task_id,
                        paths.len()
                    );
                    batch.retain(|path| !paths.contains(path));
                    if batch.is_empty() {
                        return None;
                    }
                    retried = true;
                }
                Err(e) => {
                    log::warn!(
                        "[{}] skipping batch of {} frames: {e}",
                        self.task_id,
                        batch.len()
                    );
                    return None;
                }
            }
        }
    }

    /// Query-mode embedding of `text`, computed at most once per task
    /// unless the provider fails.
    pub fn text_embedding(&self, text: &str) -> Result<SharedEmbedding, EmbeddingError> {
        let key = text_digest(text);

        if let Some(v) = self
            .texts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(v.clone());
        }

        let values = self.provider.embed_text(text)?;

        let mut texts = self.texts.write().unwrap_or_else(|e| e.into_inner());
        let entry = texts.entry(key.clone()).or_insert_with(|| {
            Arc::new(EmbeddingVector {
                key,
                values,
                modality: Modality::Text,
            })
        });
        Ok(entry.clone())
    }
}
