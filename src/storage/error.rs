use thiserror::Error;

use crate::domain::ledger::Revision;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("ledger was modified concurrently (read at {expected}, now at {found})")]
    Conflict { expected: Revision, found: Revision },

    #[error("malformed row for {url}: {reason}")]
    MalformedRow { url: String, reason: String },

    #[error("invalid comment: {0}")]
    InvalidComment(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
