use rusty_ulid::Ulid;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, ops::Deref};

/// Identifier of one notes-generation task.
///
/// Every embedding cache is tagged with the task that owns it so log lines
/// from concurrent jobs can be told apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct TaskId(String);

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for TaskId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        TaskId(id.to_string())
    }
}

impl TaskId {
    #[inline]
    pub fn new() -> TaskId {
        TaskId(Ulid::generate().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}
