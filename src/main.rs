use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

mod align;
mod cli;
mod config;
mod dedup;
mod eid;
mod extract;
mod pipeline;
mod prefilter;
mod segments;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod timecode;

use config::Config;
use extract::FfmpegExtractor;
use pipeline::ConcurrentOrchestrator;
use segments::SummaryFile;
use semantic::ProviderQueue;

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    match ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments") {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => log::debug!("progress template rejected: {e}"),
    }
    pb
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let base_path = Config::default_base_path()?;
    let mut config = Config::load_with(&base_path)?;

    match args.command {
        cli::Command::Config {} => {
            print!("{}", serde_yml::to_string(&config.redacted())?);
            Ok(())
        }

        cli::Command::Generate {
            video,
            summaries,
            output,
            workers,
            threshold,
            no_align,
            provider,
        } => {
            if let Some(workers) = workers {
                config.max_concurrent_segments = workers;
            }
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            if no_align {
                config.enable_text_alignment = false;
            }
            if let Some(provider) = provider {
                config.embedding.provider = provider;
            }
            config.validate().context("invalid command line overrides")?;

            if !video.is_file() {
                bail!("video not found: {}", video.display());
            }

            let segments = SummaryFile::load(&summaries)?;
            let extractor = FfmpegExtractor::new(&config.extractor)?;

            let provider = semantic::build_provider(&config.embedding, config.base_path())?;
            log::info!("embedding with {}", provider.name());
            let handle = ProviderQueue::spawn(
                provider,
                config.api_delay(),
                config.embedding.queue_timeout(),
            )
            .context("failed to start embedding queue")?;

            let _span = tracing::info_span!("generate", video = %video.display()).entered();
            let document = ConcurrentOrchestrator::new(&config, &extractor, handle)
                .with_progress(progress_bar())
                .run(&video, &segments, &output)?;

            let path = document.write_to(&output)?;

            println!("{}", path.display());
            println!(
                "{} segments, {} with frames, {} key frames",
                document.video_info.total_segments,
                document.statistics.segments_with_frames,
                document.statistics.total_frames
            );

            Ok(())
        }
    }
}
