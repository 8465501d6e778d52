//! Embedding infrastructure for frame deduplication and text alignment.
//!
//! # Architecture
//!
//! - `embeddings`: provider trait, vector type and errors
//! - `cohere`: remote multimodal provider over HTTP
//! - `local`: fastembed CLIP provider (feature `local-embeddings`)
//! - `queue`: single consumer thread that serializes every provider call
//! - `cache`: per-task path/text -> vector store in front of the queue
//! - `index`: flat inner-product index and similarity helpers

mod cache;
mod cohere;
pub mod embeddings;
mod index;
#[cfg(feature = "local-embeddings")]
mod local;
mod queue;

use std::path::Path;

use anyhow::Context;

pub use cache::EmbeddingCache;
pub use cohere::CohereProvider;
pub use embeddings::{EmbeddingError, EmbeddingProvider, SharedEmbedding};
pub use index::{cosine_similarity, l2_normalize, FlatIndex, IndexError};
#[cfg(feature = "local-embeddings")]
pub use local::FastembedProvider;
pub use queue::{ProviderHandle, ProviderQueue};

use crate::config::{EmbeddingConfig, ProviderKind};

/// Instantiate the configured provider.
pub fn build_provider(
    config: &EmbeddingConfig,
    base_path: &Path,
) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderKind::Cohere => {
            let api_key = config
                .resolved_api_key()
                .context("COHERE_API_KEY is not set and embedding.api_key is empty")?;
            let provider = CohereProvider::new(
                &api_key,
                &config.base_url,
                &config.model,
                config.request_timeout(),
            )?;
            Ok(Box::new(provider))
        }
        #[cfg(feature = "local-embeddings")]
        ProviderKind::Fastembed => {
            let cache_dir = config
                .fastembed_cache_dir
                .clone()
                .unwrap_or_else(|| base_path.to_path_buf());
            Ok(Box::new(FastembedProvider::new(cache_dir)?))
        }
        #[cfg(not(feature = "local-embeddings"))]
        ProviderKind::Fastembed => {
            let _ = base_path;
            anyhow::bail!("built without the local-embeddings feature")
        }
    }
}
