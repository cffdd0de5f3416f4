//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SessionwardError;
use crate::store::StorageBackend;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Settings for the session manager and the authorized API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Root of the remote service; `auth/login` and friends are resolved
    /// against it.
    pub base_url: String,

    /// Timeout for every HTTP request, in seconds.
    pub request_timeout_secs: u64,

    /// Upper bound on one renewal call, in seconds.
    pub renew_timeout_secs: u64,

    /// Where the session is persisted.
    pub storage: StorageBackend,

    /// Session file location for the file backend.
    pub storage_path: Option<PathBuf>,

    /// Service name under which keyring entries are created.
    pub keyring_service: String,

    /// Renew an expired access token before sending instead of waiting for
    /// the server to reject it.
    pub renew_before_send: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            renew_timeout_secs: 10,
            storage: StorageBackend::default(),
            storage_path: None,
            keyring_service: "sessionward".to_string(),
            renew_before_send: false,
        }
    }
}

impl SessionConfig {
    /// The parsed base URL.
    pub fn base_url(&self) -> Result<Url, SessionwardError> {
        Url::parse(&self.base_url).map_err(|e| SessionwardError::Config {
            message: format!("invalid base_url {:?}: {}", self.base_url, e),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn renew_timeout(&self) -> Duration {
        Duration::from_secs(self.renew_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:8080/api");
        assert_eq!(config.renew_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage, StorageBackend::File);
        assert!(!config.renew_before_send);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: SessionConfig = serde_json::from_value(serde_json::json!({
            "base_url": "https://shop.example.com/api",
            "storage": "keyring"
        }))
        .unwrap();

        assert_eq!(config.base_url, "https://shop.example.com/api");
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_base_url() {
        let config = SessionConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.base_url(), Err(SessionwardError::Config { .. })));
    }
}
