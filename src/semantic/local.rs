//! Local CLIP provider backed by fastembed.
//!
//! The image and text halves of CLIP ViT-B/32 share one vector space, which
//! is what cross-modal ranking needs. Models are downloaded on first use.

use std::path::PathBuf;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};

use super::embeddings::{ensure_readable, EmbeddingError, EmbeddingProvider};

const MODEL_NAME: &str = "clip-vit-b-32";

pub struct FastembedProvider {
    image: ImageEmbedding,
    text: TextEmbedding,
}

impl FastembedProvider {
    /// Load both models, caching files under `cache_dir/models`.
    pub fn new(cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::Model(format!("failed to create models directory: {}", e))
        })?;

        log::info!("loading {MODEL_NAME} from {}", models_dir.display());

        let image = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_cache_dir(models_dir.clone())
                .with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::Model(e.to_string()))?;

        let text = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::Model(e.to_string()))?;

        Ok(Self { image, text })
    }
}

impl EmbeddingProvider for FastembedProvider {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn embed_images(&mut self, images: &[PathBuf]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if images.is_empty() {
            return Ok(vec![]);
        }
        ensure_readable(images)?;

        let vectors = self
            .image
            .embed(images.to_vec(), None)
            .map_err(|e| EmbeddingError::Model(e.to_string()))?;

        if vectors.len() != images.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: images.len(),
                got: vectors.len(),
            });
        }

        Ok(vectors)
    }

    fn embed_text(&mut self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.text
            .embed(vec![query], None)
            .map_err(|e| EmbeddingError::Model(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Model("no embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires model download"]
    fn test_text_and_image_share_dimensions() {
        let tmp = tempfile::tempdir().unwrap();
        let frame = tmp.path().join("frame.png");
        image::RgbImage::from_pixel(64, 64, image::Rgb([200, 30, 30]))
            .save(&frame)
            .unwrap();

        let mut provider = FastembedProvider::new(tmp.path().to_path_buf()).unwrap();
        let images = provider.embed_images(&[frame]).unwrap();
        let text = provider.embed_text("a red square").unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].len(), text.len());
    }
}
