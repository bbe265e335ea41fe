use std::fmt::Display;

use log::error;
use rouille::Response;

use crate::{
    storage::error::StorageError,
    voting::error::{NOT_FOUND_MESSAGE, VoteError},
};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// no usable bearer token
    Unauthorized(String),
    /// token is valid but its holder may not vote
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidComment(msg) => ApiError::BadRequest(msg),

            StorageError::Database(_)
            | StorageError::Conflict { .. }
            | StorageError::MalformedRow { .. }
            | StorageError::Internal(_) => {
                error!("storage failure: {err}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl From<VoteError> for ApiError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::InvalidQuery(msg) => ApiError::BadRequest(msg),
            VoteError::NotFound => ApiError::NotFound(NOT_FOUND_MESSAGE.into()),
            VoteError::NotPending(_) => ApiError::NotFound(err.to_string()),
            VoteError::AlreadyInPlaylist(reason) => ApiError::Conflict(reason),
            VoteError::Unauthorized => ApiError::Forbidden(err.to_string()),
            VoteError::Persistence(e) => ApiError::from(e),
            VoteError::Catalog(e) => {
                error!("catalog failure: {e}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::Conflict(_) => 409,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        Response::text(self.to_string()).with_status_code(status)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => write!(f, "{msg}"),
        }
    }
}
