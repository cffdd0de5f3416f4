//! Single-flight session renewal.
//!
//! [`RenewalCoordinator`] is a two-state machine, `Idle` and `Renewing`.
//! The first [`renew`](RenewalCoordinator::renew) call while idle starts an
//! episode: one gateway call with the stored refresh token, run as its own
//! task so it finishes even if every caller goes away. Calls made while an
//! episode is running attach to the same shared outcome.
//!
//! Checking the state and attaching happen under one lock with no await in
//! between, so no caller can slip in a second gateway call.
//!
//! The coordinator is also the only writer of the [`CredentialStore`]:
//! logins and logouts go through [`establish`](RenewalCoordinator::establish)
//! and [`discard`](RenewalCoordinator::discard).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use crate::credentials::CredentialStore;
use crate::gateway::{GatewayError, SessionGateway};
use crate::listener::SessionListener;
use crate::model::{CredentialPair, SessionGrant, UserProfile};
use crate::session::SessionError;
use crate::store::Secret;

type RenewalOutcome = Result<Secret, SessionError>;
type SharedRenewal = Shared<BoxFuture<'static, RenewalOutcome>>;

enum RenewalState {
    Idle,
    Renewing { episode: u64, outcome: SharedRenewal },
}

/// Coordinates renewal so that at most one gateway renewal call is in flight.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct RenewalCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<CredentialStore>,
    gateway: Arc<dyn SessionGateway>,
    listener: Arc<dyn SessionListener>,
    renew_timeout: Duration,
    state: Mutex<RenewalState>,
    next_episode: AtomicU64,
    /// Bumped on every login and logout; an episode started under an older
    /// generation must not write its result.
    generation: AtomicU64,
}

impl RenewalCoordinator {
    /// Create a coordinator over `store`.
    ///
    /// Each gateway renewal call is abandoned after `renew_timeout`.
    pub fn new(
        store: Arc<CredentialStore>,
        gateway: Arc<dyn SessionGateway>,
        listener: Arc<dyn SessionListener>,
        renew_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                listener,
                renew_timeout,
                state: Mutex::new(RenewalState::Idle),
                next_episode: AtomicU64::new(1),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Whether a renewal episode is currently running.
    pub fn is_renewing(&self) -> bool {
        matches!(*self.inner.state.lock(), RenewalState::Renewing { .. })
    }

    /// Renew the session, or join the renewal already in flight.
    ///
    /// Resolves to the new access token. Every caller of one episode gets the
    /// same outcome. On failure the stored credentials have been cleared and
    /// the listener has been told, once, before the returned future resolves.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn renew(&self) -> impl Future<Output = RenewalOutcome> + Send + 'static {
        let mut state = self.inner.state.lock();

        if let RenewalState::Renewing { episode, outcome } = &*state {
            tracing::debug!("Joining in-flight renewal episode {}", episode);
            return outcome.clone();
        }

        let episode = self.inner.next_episode.fetch_add(1, Ordering::Relaxed);
        let generation = self.inner.generation.load(Ordering::SeqCst);
        tracing::debug!("Starting renewal episode {}", episode);

        // The task cannot reset the state before we store it: it needs this
        // lock to do so.
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_episode(episode, generation).await });
        let outcome = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(SessionError::Aborted {
                    message: e.to_string(),
                }),
            }
        }
        .boxed()
        .shared();

        *state = RenewalState::Renewing {
            episode,
            outcome: outcome.clone(),
        };
        outcome
    }

    /// Install the credentials of a fresh login.
    pub(crate) async fn establish(&self, grant: SessionGrant) -> Result<(), SessionError> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let (pair, user) = grant.into_parts();
        if let Err(e) = self.inner.store.set(pair, user).await {
            tracing::warn!("New session is active but could not be persisted: {}", e);
        }
        Ok(())
    }

    /// Remove the stored credentials.
    pub(crate) async fn discard(&self) -> Result<(), SessionError> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .store
            .clear()
            .await
            .map_err(|e| SessionError::Storage {
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for RenewalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalCoordinator")
            .field("renewing", &self.is_renewing())
            .field("renew_timeout", &self.inner.renew_timeout)
            .finish()
    }
}

impl Inner {
    /// Run one episode for the session that was current at `generation`.
    async fn run_episode(&self, episode: u64, generation: u64) -> RenewalOutcome {
        let is_superseded = || self.generation.load(Ordering::SeqCst) != generation;

        // A login or logout may land before the task first runs.
        let result = if is_superseded() {
            Err(SessionError::Superseded)
        } else {
            self.exchange_refresh_token().await
        };
        let superseded = is_superseded();

        let result = match result {
            _ if superseded => {
                tracing::info!(
                    "Session changed during renewal episode {}, dropping its result",
                    episode
                );
                Err(SessionError::Superseded)
            }
            Ok((pair, user)) => {
                let access_token = pair.access_token.clone();
                if let Err(e) = self.store.set(pair, user).await {
                    tracing::warn!("Renewed session is active but could not be persisted: {}", e);
                }
                tracing::info!("Session renewed (episode {})", episode);
                Ok(access_token)
            }
            Err(e) => {
                tracing::error!("Session renewal failed (episode {}): {}", episode, e);
                if let Err(clear_err) = self.store.clear().await {
                    tracing::warn!("Failed to clear stored credentials: {}", clear_err);
                }
                Err(e)
            }
        };

        {
            let mut state = self.state.lock();
            if matches!(&*state, RenewalState::Renewing { episode: current, .. } if *current == episode)
            {
                *state = RenewalState::Idle;
            }
        }

        if let Err(e) = &result {
            if !matches!(e, SessionError::Superseded) {
                self.listener.session_ended(e);
            }
        }

        result
    }

    async fn exchange_refresh_token(&self) -> Result<(CredentialPair, UserProfile), SessionError> {
        let refresh_token = self
            .store
            .get()
            .map(|pair| pair.refresh_token)
            .ok_or(SessionError::NotLoggedIn)?;

        let grant = tokio::time::timeout(self.renew_timeout, self.gateway.renew(&refresh_token))
            .await
            .map_err(|_| {
                SessionError::RenewalFailed(GatewayError::Timeout {
                    seconds: self.renew_timeout.as_secs(),
                })
            })?
            .map_err(SessionError::RenewalFailed)?;

        Ok(grant.into_parts())
    }
}
