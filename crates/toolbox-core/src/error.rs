//! Error types for toolbox-core

use thiserror::Error;

use crate::auth::AuthError;
use crate::cache::StorageError;
use crate::remote::RemoteError;

/// Result type alias using toolbox-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in toolbox-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote document store error
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// Local storage error
    #[error("Local storage error: {0}")]
    Storage(#[from] StorageError),

    /// Identity provider error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
