use thiserror::Error;

use crate::validation::ValidationError;

/// Errors surfaced synchronously by the sync coordinator and the training service.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// A dependency has not been synchronized to the platform head yet.
    #[error("resource {0} is not ready")]
    NotReady(String),

    /// Another sync currently owns the repo lock. Retry later.
    #[error("repo {owner}/{repo_id} is being synchronized")]
    SyncInProgress { owner: String, repo_id: String },

    /// Lost the race to create the lock record.
    #[error("duplicate creating of sync lock for repo {0}")]
    DuplicateCreating(String),

    /// Lock version advanced underneath us.
    #[error("concurrent updating of sync lock for repo {0}")]
    ConcurrentUpdating(String),

    #[error("too many trainings")]
    AdmissionExhausted,

    #[error("invalid cmd of creating training: {0}")]
    InvalidCommand(#[from] ValidationError),

    /// I/O failure from an external collaborator.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl TrainingError {
    /// True for conditions the caller is expected to retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotReady(_)
                | Self::SyncInProgress { .. }
                | Self::DuplicateCreating(_)
                | Self::ConcurrentUpdating(_)
                | Self::AdmissionExhausted
        )
    }
}
