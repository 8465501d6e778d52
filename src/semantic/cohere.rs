//! Cohere v2 `/embed` client for images and text.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};

use super::embeddings::{EmbeddingError, EmbeddingProvider};

const IMAGE_INPUT_TYPE: &str = "image";
const QUERY_INPUT_TYPE: &str = "search_query";
const FALLBACK_MIME: &str = "image/jpeg";

/// Blocking client that talks to a Cohere-compatible embed endpoint.
pub struct CohereProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl CohereProvider {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .context("invalid embedding API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/v2/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }

    fn post(&self, request: &EmbedRequest) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let resp = self.client.post(&self.endpoint).json(request).send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = resp
            .json()
            .map_err(|e| EmbeddingError::Decode(e.to_string()))?;

        if parsed.embeddings.float.len() != request.inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: request.inputs.len(),
                got: parsed.embeddings.float.len(),
            });
        }

        Ok(parsed.embeddings.float)
    }
}

impl EmbeddingProvider for CohereProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn embed_images(&mut self, images: &[PathBuf]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if images.is_empty() {
            return Ok(vec![]);
        }

        let mut inputs = Vec::with_capacity(images.len());
        let mut unreadable = Vec::new();
        for path in images {
            match data_uri(path) {
                Ok(url) => inputs.push(EmbedInput {
                    content: vec![ContentPart::ImageUrl {
                        image_url: ImageUrl { url },
                    }],
                }),
                Err(e) => {
                    log::warn!("cannot read frame {}: {e}", path.display());
                    unreadable.push(path.clone());
                }
            }
        }
        if !unreadable.is_empty() {
            return Err(EmbeddingError::Unreadable { paths: unreadable });
        }

        self.post(&EmbedRequest::new(&self.model, IMAGE_INPUT_TYPE, inputs))
    }

    fn embed_text(&mut self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let inputs = vec![EmbedInput {
            content: vec![ContentPart::Text {
                text: query.to_string(),
            }],
        }];

        self.post(&EmbedRequest::new(&self.model, QUERY_INPUT_TYPE, inputs))?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                got: 0,
            })
    }
}

/// Inline the image as a `data:` URI, sniffing the MIME type from content.
fn data_uri(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mime = infer::get(&bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(FALLBACK_MIME);

    Ok(format!("data:{mime};base64,{}", STANDARD.encode(&bytes)))
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input_type: &'static str,
    embedding_types: [&'static str; 1],
    inputs: Vec<EmbedInput>,
}

impl<'a> EmbedRequest<'a> {
    fn new(model: &'a str, input_type: &'static str, inputs: Vec<EmbedInput>) -> Self {
        Self {
            model,
            input_type,
            embedding_types: ["float"],
            inputs,
        }
    }
}

#[derive(Serialize)]
struct EmbedInput {
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: FloatEmbeddings,
}

#[derive(Deserialize)]
struct FloatEmbeddings {
    #[serde(default)]
    float: Vec<Vec<f32>>,
}
