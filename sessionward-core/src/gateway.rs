//! The session gateway: the only component that talks to the remote
//! authentication endpoints.
//!
//! [`SessionGateway`] is the capability the rest of the crate depends on;
//! [`HttpSessionGateway`] implements it over HTTP against
//! `POST {base}/auth/login`, `POST {base}/auth/refresh` and
//! `POST {base}/auth/logout`, each answering with an [`ApiEnvelope`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::model::{ApiEnvelope, LoginRequest, RefreshTokenRequest, SessionGrant};
use crate::store::Secret;

/// Error type for gateway operations.
///
/// Cloneable so a single renewal failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The endpoint could not be reached.
    #[error("network error: {message}")]
    Network { message: String },

    /// The endpoint did not answer in time.
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The remote authority refused the request (bad credentials, revoked or
    /// expired refresh token, ...).
    #[error("rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

/// Capability to log in, renew and revoke sessions at the remote authority.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Exchange user credentials for a new session.
    async fn login(&self, email: &str, password: &str) -> Result<SessionGrant, GatewayError>;

    /// Exchange a refresh token for a new session.
    async fn renew(&self, refresh_token: &Secret) -> Result<SessionGrant, GatewayError>;

    /// Invalidate a refresh token at the remote authority.
    async fn revoke(&self, refresh_token: &Secret) -> Result<(), GatewayError>;
}

/// Resolve `path` against `base`, keeping the base path as a prefix.
///
/// `http://host/api` + `auth/login` gives `http://host/api/auth/login`.
pub(crate) fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}

/// [`SessionGateway`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionGateway {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl HttpSessionGateway {
    /// Create a gateway for the service rooted at `base_url`.
    ///
    /// Every call is bounded by `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    /// Base URL of the remote service.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<ApiEnvelope<T>, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = join_path(&self.base_url, path).map_err(|e| GatewayError::InvalidResponse {
            message: format!("invalid endpoint {}: {}", path, e),
        })?;

        tracing::debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&text)
                .map(|envelope| envelope.message_or("request rejected"))
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse {
                message: format!("unexpected body from {}: {}", path, e),
            })?;

        if !envelope.success {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: envelope.message_or("request rejected"),
            });
        }

        Ok(envelope)
    }

    fn transport_error(&self, e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            GatewayError::Network {
                message: e.to_string(),
            }
        }
    }
}

fn require_grant(envelope: ApiEnvelope<SessionGrant>) -> Result<SessionGrant, GatewayError> {
    envelope.data.ok_or_else(|| GatewayError::InvalidResponse {
        message: "response carried no session".to_string(),
    })
}

#[async_trait]
impl SessionGateway for HttpSessionGateway {
    async fn login(&self, email: &str, password: &str) -> Result<SessionGrant, GatewayError> {
        let envelope = self
            .post("auth/login", &LoginRequest { email, password })
            .await?;
        require_grant(envelope)
    }

    async fn renew(&self, refresh_token: &Secret) -> Result<SessionGrant, GatewayError> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.expose(),
        };
        let envelope = self.post("auth/refresh", &body).await?;
        require_grant(envelope)
    }

    async fn revoke(&self, refresh_token: &Secret) -> Result<(), GatewayError> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.expose(),
        };
        self.post::<_, serde_json::Value>("auth/logout", &body)
            .await
            .map(|_| ())
    }
}
