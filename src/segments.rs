//! Time-bounded summaries consumed from the summarization step.

use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::timecode::{self, TimecodeError};

/// One contiguous window of the source video with its text summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoSegment {
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub summary: String,
}

impl VideoSegment {
    pub fn new(start_time: &str, end_time: &str, summary: &str) -> Self {
        Self {
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            summary: summary.to_string(),
        }
    }

    /// Start and end of the segment in seconds.
    pub fn bounds(&self) -> Result<(f64, f64), TimecodeError> {
        Ok((
            timecode::parse_seconds(&self.start_time)?,
            timecode::parse_seconds(&self.end_time)?,
        ))
    }

    /// `end - start`, or 0 when either timecode is unreadable.
    pub fn duration_seconds(&self) -> f64 {
        match self.bounds() {
            Ok((start, end)) => end - start,
            Err(_) => 0.0,
        }
    }

    /// Directory name under `frames/` holding this segment's key frames.
    /// The 1-based `segment_id` keeps segments with equal timecodes apart.
    pub fn directory_name(&self, segment_id: usize) -> String {
        let clean = |t: &str| t.trim().replace(':', "-").replace(['/', '\\'], "_");
        format!(
            "segment_{segment_id:03}_{}_to_{}",
            clean(&self.start_time),
            clean(&self.end_time)
        )
    }
}

/// The `{"summaries": [...]}` document.
#[derive(Debug, Default, Deserialize)]
pub struct SummaryFile {
    #[serde(default)]
    pub summaries: Vec<VideoSegment>,
}

impl SummaryFile {
    pub fn parse(json: &str) -> anyhow::Result<Vec<VideoSegment>> {
        let file: SummaryFile =
            serde_json::from_str(json).context("summary document is malformed")?;

        if file.summaries.is_empty() {
            bail!("summary document contains no segments");
        }

        Ok(file.summaries)
    }

    pub fn load(path: &Path) -> anyhow::Result<Vec<VideoSegment>> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read summaries from {}", path.display()))?;
        Self::parse(&json)
    }
}
