//! The session manager.
//!
//! [`SessionManager`] is the service object an application builds once at
//! start-up and shares (behind an `Arc`) with everything that makes
//! authenticated calls. It owns the credential store and the renewal
//! coordinator and exposes the session lifecycle: login, renewal, logout.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use sessionward_core::{LogListener, SessionConfig, SessionManager};
//! use std::sync::Arc;
//!
//! let config = SessionConfig::default();
//! let session = SessionManager::from_config(&config, Arc::new(LogListener)).await?;
//!
//! let user = session.login("kim@example.com", "correct horse").await?;
//! println!("Welcome, {}", user.display_name());
//!
//! let token = session.renew().await?;
//! session.logout().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::error::SessionwardError;
use crate::expiry;
use crate::gateway::{GatewayError, HttpSessionGateway, SessionGateway};
use crate::listener::SessionListener;
use crate::model::{CredentialPair, UserProfile};
use crate::renewal::RenewalCoordinator;
use crate::store::{Secret, create_store};

/// Error type for session lifecycle operations.
///
/// Cloneable so one renewal outcome can be shared by every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// There is no stored session to renew or use.
    #[error("not logged in")]
    NotLoggedIn,

    /// The remote authority refused the login.
    #[error("login failed: {0}")]
    LoginFailed(GatewayError),

    /// The session could not be renewed; it has ended.
    #[error("session renewal failed: {0}")]
    RenewalFailed(GatewayError),

    /// A login or logout happened while the renewal was in flight.
    #[error("session changed while renewal was in flight")]
    Superseded,

    /// The renewal task did not run to completion.
    #[error("renewal task aborted: {message}")]
    Aborted { message: String },

    /// The credential store failed.
    #[error("session storage error: {message}")]
    Storage { message: String },
}

/// Owner of one client's session.
pub struct SessionManager {
    store: Arc<CredentialStore>,
    gateway: Arc<dyn SessionGateway>,
    coordinator: RenewalCoordinator,
    revoke_timeout: Duration,
}

impl SessionManager {
    /// Create a manager from already-built parts.
    pub fn new(
        store: CredentialStore,
        gateway: Arc<dyn SessionGateway>,
        listener: Arc<dyn SessionListener>,
        renew_timeout: Duration,
    ) -> Self {
        let store = Arc::new(store);
        let coordinator = RenewalCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            listener,
            renew_timeout,
        );
        Self {
            store,
            gateway,
            coordinator,
            revoke_timeout: renew_timeout,
        }
    }

    /// Build the storage backend and HTTP gateway described by `config`, then
    /// load any persisted session.
    pub async fn from_config(
        config: &SessionConfig,
        listener: Arc<dyn SessionListener>,
    ) -> Result<Self, SessionwardError> {
        let backend = create_store(
            config.storage,
            config.storage_path.clone(),
            &config.keyring_service,
        )?;
        let store = CredentialStore::load(backend).await?;
        let gateway = HttpSessionGateway::new(config.base_url()?, config.request_timeout())?;

        Ok(Self::new(
            store,
            Arc::new(gateway),
            listener,
            config.renew_timeout(),
        ))
    }

    /// The current credential pair, if logged in.
    pub fn credentials(&self) -> Option<CredentialPair> {
        self.store.get()
    }

    /// The current access token, if logged in. Never renews.
    pub fn access_token(&self) -> Option<Secret> {
        self.store.get().map(|pair| pair.access_token)
    }

    /// The user profile stored with the session.
    pub fn user(&self) -> Option<UserProfile> {
        self.store.user()
    }

    /// Whether credentials are present.
    pub fn is_logged_in(&self) -> bool {
        self.store.is_present()
    }

    /// Whether a renewal is in flight.
    pub fn is_renewing(&self) -> bool {
        self.coordinator.is_renewing()
    }

    /// When the current access token expires, if it carries a readable claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.access_token()
            .and_then(|token| expiry::expires_at(token.expose()))
    }

    /// Log in and store the new session.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        let grant = self
            .gateway
            .login(email, password)
            .await
            .map_err(SessionError::LoginFailed)?;

        let user = grant.user.clone();
        self.coordinator.establish(grant).await?;
        tracing::info!("Logged in as {}", user.email);
        Ok(user)
    }

    /// Renew the session, sharing any renewal already in flight.
    ///
    /// See [`RenewalCoordinator::renew`].
    pub fn renew(&self) -> impl Future<Output = Result<Secret, SessionError>> + Send + 'static {
        self.coordinator.renew()
    }

    /// A valid access token at `now`, renewing first if the stored one has
    /// expired or cannot be decoded.
    pub async fn ensure_access_token(&self, now: DateTime<Utc>) -> Result<Secret, SessionError> {
        let token = self.access_token().ok_or(SessionError::NotLoggedIn)?;
        if !expiry::is_expired(token.expose(), now) {
            tracing::debug!("Using stored access token");
            return Ok(token);
        }

        tracing::info!("Access token expired, renewing before use");
        self.renew().await
    }

    /// Log out.
    ///
    /// The refresh token is revoked at the remote authority on a best-effort
    /// basis; local credentials are cleared whatever the outcome.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let Some(pair) = self.store.get() else {
            tracing::debug!("Logout requested with no active session");
            return Ok(());
        };

        match tokio::time::timeout(self.revoke_timeout, self.gateway.revoke(&pair.refresh_token))
            .await
        {
            Ok(Ok(())) => tracing::debug!("Refresh token revoked"),
            Ok(Err(e)) => tracing::warn!("Failed to revoke refresh token: {}", e),
            Err(_) => tracing::warn!("Timed out revoking refresh token"),
        }

        self.coordinator.discard().await?;
        tracing::info!("Logged out");
        Ok(())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
