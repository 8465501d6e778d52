//! Per-segment processing and the concurrent driver around it.

mod errors;
mod notes;
mod orchestrator;
mod segment;

pub use orchestrator::ConcurrentOrchestrator;
#[cfg(test)]
pub use notes::{NotesDocument, NOTES_FILE};
