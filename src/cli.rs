use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ProviderKind;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract, deduplicate and align key frames for every summary segment
    Generate {
        /// Source video
        #[clap(short, long)]
        video: PathBuf,

        /// JSON file with `{"summaries": [{start_time, end_time, summary}]}`
        #[clap(short, long)]
        summaries: PathBuf,

        /// Directory receiving the frames and multimodal_notes.json
        #[clap(short, long)]
        output: PathBuf,

        /// Segments processed in parallel
        #[clap(short, long)]
        workers: Option<usize>,

        /// Similarity at which two frames count as duplicates
        #[clap(short, long)]
        threshold: Option<f32>,

        /// Keep every deduplicated frame instead of the best matches
        #[clap(long, default_value = "false")]
        no_align: bool,

        /// Embedding backend
        #[clap(long, value_enum)]
        provider: Option<ProviderKind>,
    },

    /// Print the effective configuration
    Config {},
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_args() {
        let args = Args::try_parse_from([
            "keyframe-notes",
            "generate",
            "--video",
            "talk.mp4",
            "--summaries",
            "s.json",
            "--output",
            "out",
            "--workers",
            "2",
            "--no-align",
            "--provider",
            "fastembed",
        ])
        .unwrap();

        match args.command {
            Command::Generate {
                video,
                workers,
                no_align,
                provider,
                threshold,
                ..
            } => {
                assert_eq!(video, PathBuf::from("talk.mp4"));
                assert_eq!(workers, Some(2));
                assert!(no_align);
                assert_eq!(provider, Some(ProviderKind::Fastembed));
                assert_eq!(threshold, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_generate_requires_video() {
        assert!(Args::try_parse_from(["keyframe-notes", "generate", "-s", "s.json", "-o", "out"]).is_err());
    }
}
