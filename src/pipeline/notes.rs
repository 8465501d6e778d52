use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use super::{errors::NotesError, segment::SegmentOutcome};
use crate::{segments::VideoSegment, storage};

pub const NOTES_FILE: &str = "multimodal_notes.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentResult {
    /// 1-based position in the input
    pub segment_id: usize,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub summary: String,
    /// Paths relative to the output directory
    pub key_frames: Vec<String>,
    pub frame_count: usize,
}

impl SegmentResult {
    pub fn new(index: usize, segment: &VideoSegment, key_frames: Vec<String>) -> Self {
        Self {
            segment_id: index + 1,
            start_time: segment.start_time.clone(),
            end_time: segment.end_time.clone(),
            duration_seconds: segment.duration_seconds(),
            summary: segment.summary.clone(),
            frame_count: key_frames.len(),
            key_frames,
        }
    }

    /// Result for a segment that produced nothing; text and bounds survive.
    pub fn degraded(index: usize, segment: &VideoSegment) -> Self {
        Self::new(index, segment, vec![])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub source_video: String,
    pub total_segments: usize,
    pub generated_at: String,
    pub processing_mode: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_frames: usize,
    pub segments_with_frames: usize,
    #[serde(default)]
    pub failed_segments: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotesDocument {
    pub video_info: VideoInfo,
    pub segments: Vec<SegmentResult>,
    pub statistics: Statistics,
}

impl NotesDocument {
    /// Write `multimodal_notes.json` into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> Result<std::path::PathBuf, NotesError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(NOTES_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        storage::write_atomic(&path, &json)?;
        Ok(path)
    }
}

pub struct NotesAssembler {
    source_video: String,
    workers: usize,
}

impl NotesAssembler {
    pub fn new(source_video: &Path, workers: usize) -> Self {
        Self {
            source_video: source_video
                .file_name()
                .unwrap_or(source_video.as_os_str())
                .to_string_lossy()
                .into_owned(),
            workers,
        }
    }

    /// One entry per input segment, in input order. Failed or missing
    /// outcomes become degraded entries.
    pub fn assemble(
        &self,
        segments: &[VideoSegment],
        mut outcomes: BTreeMap<usize, SegmentOutcome>,
    ) -> NotesDocument {
        let mut statistics = Statistics::default();

        let results: Vec<SegmentResult> = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| match outcomes.remove(&index) {
                Some(Ok(result)) => result,
                Some(Err(failure)) => {
                    log::debug!("segment {} degraded: {failure}", index + 1);
                    statistics.failed_segments += 1;
                    SegmentResult::degraded(index, segment)
                }
                None => {
                    log::error!("segment {} produced no outcome", index + 1);
                    statistics.failed_segments += 1;
                    SegmentResult::degraded(index, segment)
                }
            })
            .collect();

        statistics.total_frames = results.iter().map(|r| r.frame_count).sum();
        statistics.segments_with_frames = results.iter().filter(|r| r.frame_count > 0).count();

        NotesDocument {
            video_info: VideoInfo {
                source_video: self.source_video.clone(),
                total_segments: results.len(),
                generated_at: chrono::Local::now().to_rfc3339(),
                processing_mode: format!("concurrent (workers={})", self.workers),
            },
            segments: results,
            statistics,
        }
    }
}
