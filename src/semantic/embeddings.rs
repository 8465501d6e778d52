//! Provider abstraction shared by the remote and local embedding backends.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Text,
}

/// An embedding as stored in the cache. Never mutated after insertion.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingVector {
    /// Frame path or text digest
    pub key: String,
    pub values: Vec<f32>,
    pub modality: Modality,
}

pub type SharedEmbedding = Arc<EmbeddingVector>;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("provider returned {got} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("no reply from embedding queue within {0:?}")]
    Timeout(Duration),

    #[error("embedding queue is closed")]
    QueueClosed,

    #[cfg(feature = "local-embeddings")]
    #[error("model error: {0}")]
    Model(String),

    /// Raised before any request is sent, listing only the offending inputs.
    #[error("{} input images could not be read", paths.len())]
    Unreadable { paths: Vec<PathBuf> },
}

/// Backend turning images and text into vectors in one shared space.
///
/// Image inputs are encoded in document mode, text in query mode, since
/// cross-modal search needs the asymmetric encoding.
pub trait EmbeddingProvider: Send {
    fn name(&self) -> &str;

    /// One vector per input, in input order. Inputs that cannot be read
    /// fail the call with [`EmbeddingError::Unreadable`] naming them.
    fn embed_images(&mut self, images: &[PathBuf]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn embed_text(&mut self, query: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Fails with [`EmbeddingError::Unreadable`] when any input cannot be opened.
#[cfg(feature = "local-embeddings")]
pub fn ensure_readable(images: &[PathBuf]) -> Result<(), EmbeddingError> {
    let paths: Vec<PathBuf> = images
        .iter()
        .filter(|path| std::fs::File::open(path).is_err())
        .cloned()
        .collect();

    if paths.is_empty() {
        Ok(())
    } else {
        Err(EmbeddingError::Unreadable { paths })
    }
}
