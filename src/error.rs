//! Error types for the scheduling core.

use crate::models::TaskId;

/// Top-level error type for planner operations.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// A referenced record does not exist or belongs to another user.
    #[error("{what} {id} not found")]
    NotFound {
        /// Kind of record ("task", "template", "exception").
        what: &'static str,
        /// Identifier as displayed to the user.
        id: String,
    },

    /// The requested change collides with existing state (duplicate
    /// exception, undo of a missing exception, stale revision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The auto-scheduler persisted some placements before a write failed.
    #[error("auto-schedule stopped after placing {} task(s); task {failed} failed: {source}", placed.len())]
    PartialBatchFailure {
        /// Tasks that were placed and persisted before the failure.
        placed: Vec<TaskId>,
        /// Task whose placement could not be persisted.
        failed: TaskId,
        /// Underlying storage error.
        #[source]
        source: Box<ScheduleError>,
    },

    /// Configuration file could not be parsed or holds invalid values.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error from the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data file holds malformed JSON.
    #[error("data error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ScheduleError {
    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Whether the failed operation may have left state partially changed.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PartialBatchFailure { .. })
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScheduleError>;
