use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::{extract::FpsPolicy, storage};

const CONFIG_FILE: &str = "config.yaml";
const HOME_ENV: &str = "KEYFRAME_NOTES_HOME";
const API_KEY_ENV: &str = "COHERE_API_KEY";

const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.9;
const DEFAULT_FRAME_FPS: f64 = 0.2;
const DEFAULT_MAX_CONCURRENT_SEGMENTS: usize = 5;
const DEFAULT_MAX_ALIGNED_FRAMES: usize = 3;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 24;
const DEFAULT_API_DELAY_MS: u64 = 100;

const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
const DEFAULT_SCALE_HEIGHT: u32 = 360;
const DEFAULT_JPEG_QUALITY: u8 = 5;
const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TARGET_FRAME_COUNT: u32 = 10;
const DEFAULT_FPS_MIN: f64 = 0.1;
const DEFAULT_FPS_MAX: f64 = 1.0;

const DEFAULT_EMBED_MODEL: &str = "embed-v4.0";
const DEFAULT_EMBED_BASE_URL: &str = "https://api.cohere.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_QUEUE_TIMEOUT_SECS: u64 = 300;

/// Settings for the frame-sampling subprocess.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Output frame height; width follows the aspect ratio
    #[serde(default = "default_scale_height")]
    pub scale_height: u32,

    /// ffmpeg `-q:v` value (2 = best, 31 = worst)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Kill the tool if a single segment takes longer than this
    #[serde(default = "default_extract_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_target_frame_count")]
    pub target_frame_count: u32,

    #[serde(default = "default_fps_min")]
    pub fps_min: f64,

    #[serde(default = "default_fps_max")]
    pub fps_max: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
            scale_height: DEFAULT_SCALE_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            timeout_secs: DEFAULT_EXTRACT_TIMEOUT_SECS,
            target_frame_count: DEFAULT_TARGET_FRAME_COUNT,
            fps_min: DEFAULT_FPS_MIN,
            fps_max: DEFAULT_FPS_MAX,
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote multimodal embedding API
    #[default]
    Cohere,
    /// Local CLIP models, no network
    Fastembed,
}

/// Settings for the embedding provider and its request queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_embed_model")]
    pub model: String,

    #[serde(default = "default_embed_base_url")]
    pub base_url: String,

    /// Overridden by the COHERE_API_KEY environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Longest a segment waits for a queued provider call, queueing included
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,

    /// Where local models are cached; defaults to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fastembed_cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            base_url: DEFAULT_EMBED_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            queue_timeout_secs: DEFAULT_QUEUE_TIMEOUT_SECS,
            fastembed_cache_dir: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Frames whose cosine similarity to a kept frame reaches this are dropped
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Sampling rate used when a segment has no positive duration
    #[serde(default = "default_frame_fps")]
    pub frame_fps: f64,

    #[serde(default = "default_max_concurrent_segments")]
    pub max_concurrent_segments: usize,

    #[serde(default = "default_true")]
    pub enable_text_alignment: bool,

    #[serde(default = "default_max_aligned_frames")]
    pub max_aligned_frames: usize,

    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,

    /// Pause after every provider call
    #[serde(default = "default_api_delay_ms")]
    pub api_delay_ms: u64,

    /// Keep raw extraction directories for debugging
    #[serde(default)]
    pub keep_temp_frames: bool,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            frame_fps: DEFAULT_FRAME_FPS,
            max_concurrent_segments: DEFAULT_MAX_CONCURRENT_SEGMENTS,
            enable_text_alignment: true,
            max_aligned_frames: DEFAULT_MAX_ALIGNED_FRAMES,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            api_delay_ms: DEFAULT_API_DELAY_MS,
            keep_temp_frames: false,
            extractor: ExtractorConfig::default(),
            embedding: EmbeddingConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_frame_fps() -> f64 {
    DEFAULT_FRAME_FPS
}

fn default_max_concurrent_segments() -> usize {
    DEFAULT_MAX_CONCURRENT_SEGMENTS
}

fn default_true() -> bool {
    true
}

fn default_max_aligned_frames() -> usize {
    DEFAULT_MAX_ALIGNED_FRAMES
}

fn default_embedding_batch_size() -> usize {
    DEFAULT_EMBEDDING_BATCH_SIZE
}

fn default_api_delay_ms() -> u64 {
    DEFAULT_API_DELAY_MS
}

fn default_ffmpeg_path() -> String {
    DEFAULT_FFMPEG_PATH.to_string()
}

fn default_scale_height() -> u32 {
    DEFAULT_SCALE_HEIGHT
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_extract_timeout_secs() -> u64 {
    DEFAULT_EXTRACT_TIMEOUT_SECS
}

fn default_target_frame_count() -> u32 {
    DEFAULT_TARGET_FRAME_COUNT
}

fn default_fps_min() -> f64 {
    DEFAULT_FPS_MIN
}

fn default_fps_max() -> f64 {
    DEFAULT_FPS_MAX
}

fn default_embed_model() -> String {
    DEFAULT_EMBED_MODEL.to_string()
}

fn default_embed_base_url() -> String {
    DEFAULT_EMBED_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_queue_timeout_secs() -> u64 {
    DEFAULT_QUEUE_TIMEOUT_SECS
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            bail!(
                "similarity_threshold must be in (0.0, 1.0], got {}",
                self.similarity_threshold
            );
        }

        if !(self.frame_fps > 0.0 && self.frame_fps.is_finite()) {
            bail!("frame_fps must be positive, got {}", self.frame_fps);
        }

        if self.max_concurrent_segments == 0 {
            bail!("max_concurrent_segments must be at least 1");
        }

        if self.max_aligned_frames == 0 {
            bail!("max_aligned_frames must be at least 1");
        }

        if self.embedding_batch_size == 0 {
            bail!("embedding_batch_size must be at least 1");
        }

        let ext = &self.extractor;
        if ext.ffmpeg_path.trim().is_empty() {
            bail!("extractor.ffmpeg_path must not be empty");
        }
        if ext.scale_height == 0 {
            bail!("extractor.scale_height must be greater than 0");
        }
        if ext.timeout_secs == 0 {
            bail!("extractor.timeout_secs must be greater than 0");
        }
        if ext.target_frame_count == 0 {
            bail!("extractor.target_frame_count must be at least 1");
        }
        if !(ext.fps_min > 0.0 && ext.fps_min <= ext.fps_max && ext.fps_max.is_finite()) {
            bail!(
                "extractor fps bounds must satisfy 0 < fps_min <= fps_max, got {}..{}",
                ext.fps_min,
                ext.fps_max
            );
        }

        let emb = &self.embedding;
        if emb.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if emb.request_timeout_secs == 0 || emb.queue_timeout_secs == 0 {
            bail!("embedding timeouts must be greater than 0");
        }

        Ok(())
    }

    /// Directory holding `config.yaml` and cached models.
    pub fn default_base_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var(HOME_ENV) {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .map_err(|e| anyhow!("failed to resolve home directory: {e:?}"))?
            .context("home directory is not set")?;

        Ok(home.join(".keyframe-notes"))
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            let config_str = serde_yml::to_string(&Self::default())?;
            storage::write_atomic(&config_path, config_str.as_bytes())
                .context("failed to write default config")?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        storage::write_atomic(&self.base_path.join(CONFIG_FILE), config_str.as_bytes())
            .context("failed to save config")?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn fps_policy(&self) -> FpsPolicy {
        FpsPolicy {
            target_frame_count: self.extractor.target_frame_count,
            fps_min: self.extractor.fps_min,
            fps_max: self.extractor.fps_max,
            default_fps: self.frame_fps,
        }
    }

    pub fn api_delay(&self) -> Duration {
        Duration::from_millis(self.api_delay_ms)
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.embedding.api_key.is_some() {
            config.embedding.api_key = Some("<redacted>".to_string());
        }
        config
    }
}
