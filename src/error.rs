use crate::account::{AuthError, StoreError};
use crate::config::ConfigError;
use thiserror::Error;

/// Errors that stop the service from starting or shutting down cleanly.
/// Per-request failures never surface here.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("hasher setup failed: {0}")]
    Hasher(#[from] AuthError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
