use thiserror::Error;

use crate::{catalog::error::CatalogError, storage::error::StorageError};

pub const NOT_FOUND_MESSAGE: &str = "Track not found. Please try again.";
pub const UNAUTHORIZED_MESSAGE: &str =
    "The current user is not allowed to vote, please contact the playlist owner to get voting access.";

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("{0}")]
    InvalidQuery(String),

    #[error("{}", NOT_FOUND_MESSAGE)]
    NotFound,

    #[error("{0}")]
    AlreadyInPlaylist(String),

    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,

    #[error("{0} is not waiting for votes")]
    NotPending(String),

    #[error("ledger error: {0}")]
    Persistence(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}
