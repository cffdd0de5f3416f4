//! Secret storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Trait for key/value secret storage backends
//! - [`MemoryStore`] - In-memory implementation for testing
//! - [`FileStore`] - JSON file implementation that survives restarts
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_store`] - Helper to select a backend from configuration
//!
//! # Storage Key Convention
//!
//! The credential store writes three independent entries:
//! `access_token`, `refresh_token` and `user`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sessionward_core::store::{MemoryStore, Secret, SecretStore};
//!
//! let store = MemoryStore::new();
//! store.set("access_token", &Secret::new("a.b.c")).await?;
//!
//! let retrieved = store.get("access_token").await?;
//! assert_eq!(retrieved.unwrap().expose(), "a.b.c");
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

mod file;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
/// The buffer is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.0)
    }

    /// Whether the secret holds an empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for secret store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },

    /// No platform data directory could be determined.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// Abstraction over key/value secret storage backends.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for testing
/// - [`FileStore`] - JSON file in the platform data directory
/// - `KeyringStore` (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a secret at the given key.
    ///
    /// Overwrites any existing value.
    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a secret by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Store several secrets as one update.
    ///
    /// The last entry is the commit marker. This default removes it first and
    /// writes it last, so an interrupted update leaves the marker absent
    /// instead of paired with stale entries. Backends that can write all
    /// entries at once override it.
    async fn set_many(&self, entries: &[(&str, &Secret)]) -> Result<(), StoreError> {
        let Some(((marker_key, marker), rest)) = entries.split_last() else {
            return Ok(());
        };

        self.delete(marker_key).await?;
        for (key, secret) in rest {
            self.set(key, secret).await?;
        }
        self.set(marker_key, marker).await
    }
}

/// Which backend holds the persisted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory only; nothing survives a restart.
    Memory,
    /// JSON file on disk.
    #[default]
    File,
    /// OS keyring.
    Keyring,
}

/// Create a secret store for the requested backend.
///
/// # Backend Selection Logic
///
/// - `Keyring`: attempts a [`KeyringStore`], falling back to the file store
///   with a warning if the keyring is unavailable or the feature is disabled
/// - `File`: a [`FileStore`] at `path`, or at [`FileStore::default_path`]
/// - `Memory`: a [`MemoryStore`]
pub fn create_store(
    backend: StorageBackend,
    path: Option<PathBuf>,
    keyring_service: &str,
) -> Result<Box<dyn SecretStore>, StoreError> {
    match backend {
        StorageBackend::Memory => {
            tracing::debug!("Using in-memory session storage");
            Ok(Box::new(MemoryStore::new()))
        }
        StorageBackend::File => open_file_store(path),
        StorageBackend::Keyring => {
            #[cfg(feature = "keyring-store")]
            match KeyringStore::try_new(keyring_service) {
                Ok(store) => {
                    tracing::info!("Using OS keyring for session storage");
                    return Ok(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!("Keyring unavailable ({}), falling back to file store", e);
                }
            }

            #[cfg(not(feature = "keyring-store"))]
            tracing::warn!(
                "Keyring storage requested for {} but keyring-store feature not enabled, \
                 falling back to file store",
                keyring_service
            );

            open_file_store(path)
        }
    }
}

fn open_file_store(path: Option<PathBuf>) -> Result<Box<dyn SecretStore>, StoreError> {
    let path = match path {
        Some(path) => path,
        None => FileStore::default_path()?,
    };
    tracing::debug!("Using file session storage at {:?}", path);
    Ok(Box::new(FileStore::open(path)?))
}
