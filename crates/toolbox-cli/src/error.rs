use std::io;

use thiserror::Error;
use toolbox_core::auth::{AuthError, AuthFailure};
use toolbox_core::cache::StorageError;
use toolbox_core::remote::RemoteError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] toolbox_core::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthFailure),
    #[error("Identity provider error: {0}")]
    Identity(#[from] AuthError),
    #[error("Not signed in. Run `toolbox auth login` first.")]
    NotSignedIn,
    #[error("No pinned link with URL {0}")]
    LinkNotFound(String),
    #[error("Sync failed for: {0}")]
    SyncFailed(String),
}
