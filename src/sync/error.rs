use thiserror::Error;

use crate::merge::MergeError;
use crate::state::StateError;
use crate::types::EntityKind;

/// Errors surfaced by the coordinator's service interface.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} sync is already running")]
    AlreadyRunning(EntityKind),

    /// Rejected before any ID was dispatched.
    #[error("Invalid sync configuration: {0}")]
    FatalConfiguration(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl SyncError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::FatalConfiguration(msg.into())
    }
}
