//! Frame sampling through an external ffmpeg process.
//!
//! The pipeline only depends on the [`FrameSource`] trait; [`FfmpegExtractor`]
//! is the production implementation.

use std::{
    fs::File,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread::sleep,
    time::{Duration, Instant},
};

use crate::config::ExtractorConfig;

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXT: &str = ".jpg";
const LOG_FILE: &str = "ffmpeg.log";
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_CHARS: usize = 2000;

/// Parameters of the adaptive sampling-rate rule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsPolicy {
    pub target_frame_count: u32,
    pub fps_min: f64,
    pub fps_max: f64,
    /// Used when the duration is not positive
    pub default_fps: f64,
}

/// `clamp(target / duration, fps_min, fps_max)`, bounding frames per segment
/// regardless of segment length.
pub fn choose_fps(duration: f64, policy: &FpsPolicy) -> f64 {
    if !(duration > 0.0) || !duration.is_finite() {
        return policy.default_fps;
    }

    (policy.target_frame_count as f64 / duration).clamp(policy.fps_min, policy.fps_max)
}

/// A sampled frame on disk, owned by the segment that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtractedFrame {
    pub path: PathBuf,
    pub origin_segment: usize,
}

impl AsRef<Path> for ExtractedFrame {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

#[derive(Clone, Debug)]
pub struct ExtractionRequest {
    pub video_path: PathBuf,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub fps: f64,
    pub output_dir: PathBuf,
    pub origin_segment: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("video not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("invalid time range {start}s..{end}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("frame tool '{tool}' is unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("failed to start frame tool: {0}")]
    Spawn(std::io::Error),

    #[error("frame tool exited with {status}: {stderr}")]
    ToolFailed { status: ExitStatus, stderr: String },

    #[error("frame tool did not finish within {0:?}")]
    Timeout(Duration),

    #[error("no frames were extracted")]
    NoFrames,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can turn a video time range into frame files.
pub trait FrameSource: Send + Sync {
    fn extract(&self, request: &ExtractionRequest) -> Result<Vec<ExtractedFrame>, ExtractionError>;
}

pub struct FfmpegExtractor {
    ffmpeg_path: String,
    scale_height: u32,
    jpeg_quality: u8,
    timeout: Duration,
}

impl FfmpegExtractor {
    /// Build an extractor and make sure the tool can be executed.
    pub fn new(config: &ExtractorConfig) -> Result<Self, ExtractionError> {
        let extractor = Self::from_config(config);
        extractor.check_available()?;
        Ok(extractor)
    }

    /// Build an extractor without probing the tool.
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            scale_height: config.scale_height,
            jpeg_quality: config.jpeg_quality,
            timeout: config.timeout(),
        }
    }

    fn check_available(&self) -> Result<(), ExtractionError> {
        let unavailable = |reason: String| ExtractionError::ToolUnavailable {
            tool: self.ffmpeg_path.clone(),
            reason,
        };

        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| unavailable(e.to_string()))?;

        if !status.success() {
            return Err(unavailable(format!("-version exited with {status}")));
        }

        Ok(())
    }

    fn arguments(&self, request: &ExtractionRequest) -> Vec<String> {
        let duration = request.end_seconds - request.start_seconds;
        let pattern = request
            .output_dir
            .join(format!("{FRAME_PREFIX}%06d{FRAME_EXT}"));

        vec![
            "-ss".to_string(),
            format!("{:.3}", request.start_seconds),
            "-i".to_string(),
            request.video_path.to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{duration:.3}"),
            "-vf".to_string(),
            format!("fps={},scale=-1:{}", request.fps, self.scale_height),
            "-q:v".to_string(),
            self.jpeg_quality.to_string(),
            "-y".to_string(),
            pattern.to_string_lossy().to_string(),
        ]
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, ExtractionError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }

            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    log::warn!("failed to kill stuck frame tool: {e}");
                }
                let _ = child.wait();
                return Err(ExtractionError::Timeout(self.timeout));
            }

            sleep(POLL_INTERVAL);
        }
    }
}

impl FrameSource for FfmpegExtractor {
    fn extract(&self, request: &ExtractionRequest) -> Result<Vec<ExtractedFrame>, ExtractionError> {
        if !request.video_path.exists() {
            return Err(ExtractionError::VideoNotFound(request.video_path.clone()));
        }

        if !(request.start_seconds < request.end_seconds) {
            return Err(ExtractionError::InvalidRange {
                start: request.start_seconds,
                end: request.end_seconds,
            });
        }

        std::fs::create_dir_all(&request.output_dir)?;
        let log_path = request.output_dir.join(LOG_FILE);
        let stderr = File::create(&log_path)?;

        log::debug!(
            "extracting {} [{:.3}s-{:.3}s] at {} fps",
            request.video_path.display(),
            request.start_seconds,
            request.end_seconds,
            request.fps
        );

        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.arguments(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(ExtractionError::Spawn)?;

        let status = self.wait_with_timeout(&mut child)?;
        if !status.success() {
            let log = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(ExtractionError::ToolFailed {
                status,
                stderr: tail(&log, STDERR_TAIL_CHARS),
            });
        }

        let frames = collect_frames(&request.output_dir, request.origin_segment)?;
        if frames.is_empty() {
            return Err(ExtractionError::NoFrames);
        }

        Ok(frames)
    }
}

/// Frame files written by the tool, in sequence order.
fn collect_frames(dir: &Path, origin_segment: usize) -> std::io::Result<Vec<ExtractedFrame>> {
    let mut paths = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(FRAME_PREFIX) && name.ends_with(FRAME_EXT))
                    .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| ExtractedFrame {
            path,
            origin_segment,
        })
        .collect())
}

fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}
