//! Error taxonomy for the core (§7 of the design).
//!
//! Validation errors are local and never retried. NotFound/Permission map
//! directly from HTTP status. BadOffset is recovered by the write path on
//! retry and only ever surfaces on a genuinely first-attempt bad offset.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("offset already applied (bad offset) at {0}")]
    BadOffset(String),

    #[error("REST error: op={op} path={path} status={status} body={body}")]
    Rest {
        op: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
