use thiserror::Error;

use crate::engine::EngineError;
use crate::ledger::LedgerError;

use super::record::RetryRejection;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Download not found: {0}")]
    NotFound(String),

    #[error("job {0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Validation(String),

    #[error("Download is not in error state")]
    NotRetriable,

    #[error("Maximum retry attempts reached")]
    MaxRetriesReached,

    #[error("Download is still being finalized")]
    Busy,

    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("history store failure: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, JobError>;

impl From<RetryRejection> for JobError {
    fn from(value: RetryRejection) -> Self {
        match value {
            RetryRejection::NotInErrorState => JobError::NotRetriable,
            RetryRejection::MaxRetriesReached => JobError::MaxRetriesReached,
            RetryRejection::Busy => JobError::Busy,
        }
    }
}
