use crate::types::CaseId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed case {case_id}: {reason}")]
    MalformedCase { case_id: CaseId, reason: String },

    #[error("run lease is held by another invocation")]
    LeaseHeld,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Transient store errors are retried per case with bounded backoff.
    /// Everything else surfaces immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
