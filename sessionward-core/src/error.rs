//! Top-level error types for sessionward.

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::interceptor::RequestError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Top-level error type encompassing all sessionward errors.
#[derive(Debug, Error)]
pub enum SessionwardError {
    /// Error from credential storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error talking to the authentication endpoints.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Error from the session lifecycle.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error from an authorized request.
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
