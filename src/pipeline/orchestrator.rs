use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use indicatif::ProgressBar;

use super::{
    errors::NotesError,
    notes::{NotesAssembler, NotesDocument},
    segment::{SegmentContext, SegmentOutcome, SegmentPipeline},
};
use crate::{
    config::Config,
    eid::TaskId,
    extract::FrameSource,
    segments::VideoSegment,
    semantic::{EmbeddingCache, ProviderHandle},
};

/// Runs every segment of one task on a bounded pool of worker threads.
///
/// Each call to [`run`](Self::run) is a separate task with its own
/// [`EmbeddingCache`]; only the provider queue is shared between tasks.
pub struct ConcurrentOrchestrator<'a> {
    config: &'a Config,
    source: &'a dyn FrameSource,
    provider: ProviderHandle,
    progress: ProgressBar,
}

impl<'a> ConcurrentOrchestrator<'a> {
    pub fn new(config: &'a Config, source: &'a dyn FrameSource, provider: ProviderHandle) -> Self {
        Self {
            config,
            source,
            provider,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Process all segments and assemble the notes in input order.
    ///
    /// Segment failures are folded into the document; an error here means
    /// the output directory itself is unusable.
    pub fn run(
        &self,
        video_path: &Path,
        segments: &[VideoSegment],
        output_dir: &Path,
    ) -> Result<NotesDocument, NotesError> {
        std::fs::create_dir_all(output_dir)?;

        let task_id = TaskId::new();
        let cache = EmbeddingCache::new(
            task_id.clone(),
            self.provider.clone(),
            self.config.embedding_batch_size,
        );
        let workers = self
            .config
            .max_concurrent_segments
            .clamp(1, segments.len().max(1));

        log::info!(
            "task {task_id}: {} segments of {} with {workers} workers",
            segments.len(),
            video_path.display()
        );

        let ctx = SegmentContext {
            config: self.config,
            source: self.source,
            cache: &cache,
            video_path,
            output_dir,
        };

        self.progress.set_length(segments.len() as u64);

        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, SegmentOutcome)>();

        thread::scope(|s| {
            for _ in 0..workers {
                let tx = tx.clone();
                let (ctx, next, progress) = (&ctx, &next, &self.progress);
                s.spawn(move || {
                    let pipeline = SegmentPipeline::new(ctx);
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(segment) = segments.get(index) else {
                            break;
                        };

                        let outcome = pipeline.run(index, segment);
                        progress.inc(1);
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let outcomes: BTreeMap<usize, SegmentOutcome> = rx.into_iter().collect();
        self.progress.finish_and_clear();

        let document = NotesAssembler::new(video_path, workers).assemble(segments, outcomes);
        log::info!(
            "task {task_id}: {} key frames across {}/{} segments ({} cached embeddings)",
            document.statistics.total_frames,
            document.statistics.segments_with_frames,
            document.video_info.total_segments,
            cache.len()
        );

        Ok(document)
    }
}
