//! Error types for `Dream Library` core library.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::store::StoreError;

/// Result type alias using `Dream Library` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Dream Library` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Book catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
