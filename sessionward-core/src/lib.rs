//! # Sessionward Core
//!
//! Client-side session management for a token-authenticated HTTP service.
//!
//! This crate provides:
//! - A credential store for the access/refresh token pair, persisted to a
//!   file, the OS keyring, or memory
//! - Fail-closed expiry inspection of JWT access tokens
//! - A renewal coordinator that keeps at most one renewal call in flight
//! - An interceptor that retries a request once after renewing on HTTP 401
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sessionward_core::{ApiClient, LogListener, SessionConfig, SessionManager};
//! use std::sync::Arc;
//!
//! async fn whoami(config: &SessionConfig) -> Result<String, sessionward_core::SessionwardError> {
//!     let session = Arc::new(SessionManager::from_config(config, Arc::new(LogListener)).await?);
//!     let client = ApiClient::new(session, config)?;
//!     let user = client.current_user().await?;
//!     Ok(user.email)
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod expiry;
pub mod gateway;
pub mod interceptor;
pub mod listener;
pub mod model;
pub mod renewal;
pub mod session;
pub mod store;

// Re-export commonly used types at crate root
pub use model::{
    ApiEnvelope,
    CredentialPair,
    SessionGrant,
    UserProfile,
};

pub use store::{
    FileStore,
    MemoryStore,
    Secret,
    SecretStore,
    StorageBackend,
    StoreError,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use credentials::CredentialStore;

pub use gateway::{
    GatewayError,
    HttpSessionGateway,
    SessionGateway,
};

pub use listener::{
    ChannelListener,
    LogListener,
    SessionListener,
};

pub use renewal::RenewalCoordinator;

pub use session::{
    SessionError,
    SessionManager,
};

pub use interceptor::{
    ApiClient,
    Interceptor,
    RequestError,
    RetryMarker,
};

pub use config::SessionConfig;

pub use error::SessionwardError;
