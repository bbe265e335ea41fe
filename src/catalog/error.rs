use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog rejected the credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("catalog answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected catalog response: {0}")]
    Decode(String),
}
