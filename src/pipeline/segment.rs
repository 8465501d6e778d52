use std::{
    cell::Cell,
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use super::{errors::NotesError, notes::SegmentResult};
use crate::{
    align::TextAligner,
    config::Config,
    dedup::Deduplicator,
    extract::{choose_fps, ExtractionRequest, FrameSource},
    prefilter::prefilter,
    segments::VideoSegment,
    semantic::{EmbeddingCache, SharedEmbedding},
    storage,
};

pub const FRAMES_DIR: &str = "frames";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentStage {
    Pending,
    Extracting,
    Filtering,
    Embedding,
    Deduplicating,
    Aligning,
    Saved,
    Failed,
}

impl fmt::Display for SegmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentStage::Pending => "pending",
            SegmentStage::Extracting => "extracting",
            SegmentStage::Filtering => "filtering",
            SegmentStage::Embedding => "embedding",
            SegmentStage::Deduplicating => "deduplicating",
            SegmentStage::Aligning => "aligning",
            SegmentStage::Saved => "saved",
            SegmentStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a segment ended in `Failed`, and in which stage.
#[derive(Debug, thiserror::Error)]
#[error("segment {segment_id} failed while {stage}: {reason}")]
pub struct SegmentFailure {
    pub segment_id: usize,
    pub stage: SegmentStage,
    pub reason: NotesError,
}

pub type SegmentOutcome = Result<SegmentResult, SegmentFailure>;

/// Everything a segment run borrows from its task.
pub struct SegmentContext<'a> {
    pub config: &'a Config,
    pub source: &'a dyn FrameSource,
    pub cache: &'a EmbeddingCache,
    pub video_path: &'a Path,
    pub output_dir: &'a Path,
}

/// Runs one segment through extract, filter, embed, dedupe, align and save.
///
/// Stages run strictly in that order and are never retried. Any error, or a
/// panic, ends the run in `Failed`.
pub struct SegmentPipeline<'a> {
    ctx: &'a SegmentContext<'a>,
}

impl<'a> SegmentPipeline<'a> {
    pub fn new(ctx: &'a SegmentContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn run(&self, index: usize, segment: &VideoSegment) -> SegmentOutcome {
        let segment_id = index + 1;
        let stage = Cell::new(SegmentStage::Pending);

        let result = catch_unwind(AssertUnwindSafe(|| self.execute(index, segment, &stage)));

        let reason = match result {
            Ok(Ok(result)) => {
                log::info!(
                    "segment {segment_id} [{} - {}]: {} key frames",
                    segment.start_time,
                    segment.end_time,
                    result.frame_count
                );
                return Ok(result);
            }
            Ok(Err(e)) => e,
            Err(payload) => NotesError::Panic(panic_message(&*payload)),
        };

        log::debug!(
            "segment {segment_id}: {} -> {}",
            stage.get(),
            SegmentStage::Failed
        );
        let failure = SegmentFailure {
            segment_id,
            stage: stage.get(),
            reason,
        };
        log::error!("{failure}");
        Err(failure)
    }

    fn execute(
        &self,
        index: usize,
        segment: &VideoSegment,
        stage: &Cell<SegmentStage>,
    ) -> Result<SegmentResult, NotesError> {
        let segment_id = index + 1;
        let config = self.ctx.config;
        let enter = |next: SegmentStage| {
            log::debug!("segment {segment_id}: {} -> {next}", stage.get());
            stage.set(next);
        };

        let (start_seconds, end_seconds) = segment.bounds()?;

        enter(SegmentStage::Extracting);
        let scratch = tempfile::Builder::new()
            .prefix(&format!("keyframes-{segment_id}-"))
            .tempdir()?;
        let request = ExtractionRequest {
            video_path: self.ctx.video_path.to_path_buf(),
            start_seconds,
            end_seconds,
            fps: choose_fps(end_seconds - start_seconds, &config.fps_policy()),
            output_dir: scratch.path().to_path_buf(),
            origin_segment: index,
        };
        let frames = self.ctx.source.extract(&request)?;

        enter(SegmentStage::Filtering);
        let unique = prefilter(&frames);
        log::debug!(
            "segment {segment_id}: {} of {} frames survive hashing",
            unique.len(),
            frames.len()
        );
        let paths: Vec<PathBuf> = unique.into_iter().map(|frame| frame.path).collect();

        enter(SegmentStage::Embedding);
        let vectors = self.ctx.cache.get_or_compute(&paths);

        enter(SegmentStage::Deduplicating);
        let kept = self.deduplicate(segment_id, &paths, &vectors)?;

        enter(SegmentStage::Aligning);
        let selected = if config.enable_text_alignment {
            let aligned = TextAligner::new(self.ctx.cache).align(
                &kept,
                &vectors,
                &segment.summary,
                config.max_aligned_frames,
            );
            if let Some(best) = aligned.best_similarity {
                log::debug!("segment {segment_id}: best text match {best:.3}");
            }
            aligned.ranked
        } else {
            kept
        };

        let frames_dir = self
            .ctx
            .output_dir
            .join(FRAMES_DIR)
            .join(segment.directory_name(segment_id));
        let saved = storage::save_frames(&selected, &frames_dir)?;
        let key_frames = saved
            .iter()
            .map(|path| storage::relative_to(path, self.ctx.output_dir))
            .collect();
        enter(SegmentStage::Saved);

        if config.keep_temp_frames {
            let kept_dir = scratch.keep();
            log::debug!("segment {segment_id}: raw frames kept in {}", kept_dir.display());
        }

        Ok(SegmentResult::new(index, segment, key_frames))
    }

    /// Frames without a vector are dropped, unless none has one; then the
    /// hashed frames pass through untouched.
    fn deduplicate(
        &self,
        segment_id: usize,
        paths: &[PathBuf],
        vectors: &HashMap<PathBuf, SharedEmbedding>,
    ) -> Result<Vec<PathBuf>, NotesError> {
        let (covered, values): (Vec<PathBuf>, Vec<&[f32]>) = paths
            .iter()
            .filter_map(|path| vectors.get(path).map(|v| (path.clone(), v.values.as_slice())))
            .unzip();

        if covered.is_empty() {
            if !paths.is_empty() {
                log::warn!(
                    "segment {segment_id}: no embeddings available, skipping deduplication"
                );
            }
            return Ok(paths.to_vec());
        }

        if covered.len() < paths.len() {
            log::warn!(
                "segment {segment_id}: dropping {} frames without embeddings",
                paths.len() - covered.len()
            );
        }

        let result = Deduplicator::new(self.ctx.config.similarity_threshold).dedupe(&covered, &values)?;
        log::debug!(
            "segment {segment_id}: dedup kept {}, removed {}",
            result.kept.len(),
            result.removed_count
        );
        Ok(result.kept)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(SegmentStage::Deduplicating.to_string(), "deduplicating");
        assert_eq!(SegmentStage::Saved.to_string(), "saved");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }
}
