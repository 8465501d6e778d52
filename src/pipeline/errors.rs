use crate::{dedup::DedupError, extract::ExtractionError, semantic::EmbeddingError, timecode::TimecodeError};

#[derive(Debug, thiserror::Error)]
pub enum NotesError {
    #[error(transparent)]
    Timecode(#[from] TimecodeError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize notes: {0}")]
    Json(#[from] serde_json::Error),

    #[error("segment worker panicked: {0}")]
    Panic(String),
}
