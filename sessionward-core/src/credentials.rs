//! The credential store.
//!
//! [`CredentialStore`] holds the current [`CredentialPair`] and the
//! [`UserProfile`] that came with it. The pair lives in memory for readers and
//! is written through to a [`SecretStore`] so it survives restarts.
//!
//! # Persisted layout
//!
//! Three independent entries, always written and removed together:
//! - `access_token` - the access token string
//! - `refresh_token` - the refresh token string
//! - `user` - the user profile as JSON

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::model::{CredentialPair, UserProfile};
use crate::store::{Secret, SecretStore, StoreError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone)]
struct StoredSession {
    pair: CredentialPair,
    user: Option<UserProfile>,
}

/// Client-local storage of the current session credentials.
///
/// Reads never fail and never wait: they clone the in-memory pair, which is
/// swapped as a whole on every update. Only the session manager writes.
pub struct CredentialStore {
    backend: Box<dyn SecretStore>,
    current: RwLock<Option<StoredSession>>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Load the persisted session from `backend`.
    ///
    /// A half-persisted pair (one token without the other) is treated as no
    /// session and removed from the backend.
    pub async fn load(backend: Box<dyn SecretStore>) -> Result<Self, StoreError> {
        let access = backend.get(ACCESS_TOKEN_KEY).await?;
        let refresh = backend.get(REFRESH_TOKEN_KEY).await?;

        let current = match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => {
                let user = match backend.get(USER_KEY).await? {
                    Some(raw) => match serde_json::from_str(raw.expose()) {
                        Ok(user) => Some(user),
                        Err(e) => {
                            tracing::warn!("Ignoring unreadable stored user profile: {}", e);
                            None
                        }
                    },
                    None => None,
                };
                tracing::debug!("Loaded persisted session");
                Some(StoredSession {
                    pair: CredentialPair {
                        access_token,
                        refresh_token,
                    },
                    user,
                })
            }
            (None, None) => None,
            _ => {
                tracing::warn!("Found a partially persisted credential pair, discarding it");
                if let Err(e) = delete_all(backend.as_ref()).await {
                    tracing::warn!("Failed to remove partial credential pair: {}", e);
                }
                None
            }
        };

        Ok(Self {
            backend,
            current: RwLock::new(current),
            write_lock: Mutex::new(()),
        })
    }

    /// The current credential pair, or `None` when logged out.
    pub fn get(&self) -> Option<CredentialPair> {
        self.current.read().as_ref().map(|s| s.pair.clone())
    }

    /// The user profile stored with the current pair.
    pub fn user(&self) -> Option<UserProfile> {
        self.current.read().as_ref().and_then(|s| s.user.clone())
    }

    /// Whether a credential pair is present.
    pub fn is_present(&self) -> bool {
        self.current.read().is_some()
    }

    /// Replace the pair and user profile.
    ///
    /// Readers see the new pair as soon as this is called. The backend write
    /// follows as one batch with the refresh token as its commit marker. If it
    /// fails, the persisted session is removed rather than left mixed, and the
    /// new pair stays live in memory only.
    pub(crate) async fn set(
        &self,
        pair: CredentialPair,
        user: UserProfile,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let user_json = Secret::new(serde_json::to_string(&user)?);
        let access_token = pair.access_token.clone();
        let refresh_token = pair.refresh_token.clone();

        *self.current.write() = Some(StoredSession {
            pair,
            user: Some(user),
        });

        let written = self
            .backend
            .set_many(&[
                (USER_KEY, &user_json),
                (ACCESS_TOKEN_KEY, &access_token),
                (REFRESH_TOKEN_KEY, &refresh_token),
            ])
            .await;

        if let Err(e) = written {
            tracing::warn!("Persisting session failed, removing stored session: {}", e);
            if let Err(cleanup) = delete_all(self.backend.as_ref()).await {
                tracing::warn!("Failed to remove stored session: {}", cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove the pair and user profile.
    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        *self.current.write() = None;
        delete_all(self.backend.as_ref()).await
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.is_present())
            .finish()
    }
}

/// Delete every entry, attempting all three even if one fails.
///
/// The refresh token goes first so that an interrupted delete leaves a
/// partial pair, which `load` discards.
async fn delete_all(backend: &dyn SecretStore) -> Result<(), StoreError> {
    let mut first_error = None;
    for key in [REFRESH_TOKEN_KEY, ACCESS_TOKEN_KEY, USER_KEY] {
        if let Err(e) = backend.delete(key).await {
            tracing::warn!("Failed to delete stored {}: {}", key, e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) fn test_user() -> UserProfile {
    UserProfile {
        id: 1,
        email: "kim@example.com".to_string(),
        name: "Kim".to_string(),
        nickname: None,
        phone_number: None,
        role: Some("USER".to_string()),
        status: Some("ACTIVE".to_string()),
        profile_image_url: None,
        last_login_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn empty_store() -> CredentialStore {
        CredentialStore::load(Box::new(MemoryStore::new())).await.unwrap()
    }

    /// Backend over a shared memory store that refuses chosen operations.
    struct FailingStore {
        inner: Arc<MemoryStore>,
        fail_set: Option<&'static str>,
        fail_delete: bool,
    }

    impl FailingStore {
        fn healthy(inner: &Arc<MemoryStore>) -> Box<Self> {
            Self::failing(inner, None, false)
        }

        fn failing(
            inner: &Arc<MemoryStore>,
            fail_set: Option<&'static str>,
            fail_delete: bool,
        ) -> Box<Self> {
            Box::new(Self {
                inner: Arc::clone(inner),
                fail_set,
                fail_delete,
            })
        }
    }

    fn disk_full() -> StoreError {
        StoreError::BackendError {
            message: "disk full".to_string(),
        }
    }

    #[async_trait]
    impl SecretStore for FailingStore {
        async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
            if self.fail_set == Some(key) {
                return Err(disk_full());
            }
            self.inner.set(key, secret).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            if self.fail_delete {
                return Err(disk_full());
            }
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_empty_store_is_absent() {
        let store = empty_store().await;
        assert!(store.get().is_none());
        assert!(store.user().is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = empty_store().await;

        store
            .set(CredentialPair::new("T1", "R1"), test_user())
            .await
            .unwrap();

        assert_eq!(store.get(), Some(CredentialPair::new("T1", "R1")));
        assert_eq!(store.user().unwrap().email, "kim@example.com");
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = empty_store().await;
        store
            .set(CredentialPair::new("T1", "R1"), test_user())
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert!(store.get().is_none());
        assert!(store.user().is_none());
        assert!(store.backend.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
        assert!(store.backend.get(REFRESH_TOKEN_KEY).await.unwrap().is_none());
        assert!(store.backend.get(USER_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_survives_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let store = CredentialStore::load(Box::new(FileStore::open(&path).unwrap()))
            .await
            .unwrap();
        store
            .set(CredentialPair::new("T1", "R1"), test_user())
            .await
            .unwrap();
        drop(store);

        let reloaded = CredentialStore::load(Box::new(FileStore::open(&path).unwrap()))
            .await
            .unwrap();
        assert_eq!(reloaded.get(), Some(CredentialPair::new("T1", "R1")));
        assert_eq!(reloaded.user(), Some(test_user()));
    }

    #[tokio::test]
    async fn test_partial_pair_is_discarded_on_load() {
        let mut data = HashMap::new();
        data.insert(ACCESS_TOKEN_KEY.to_string(), Secret::new("T1"));
        data.insert(USER_KEY.to_string(), Secret::new("{}"));

        let store = CredentialStore::load(Box::new(MemoryStore::with_data(data)))
            .await
            .unwrap();

        assert!(store.get().is_none());
        assert!(store.backend.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
        assert!(store.backend.get(USER_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_never_persists_mixed_pair() {
        let shared = Arc::new(MemoryStore::new());
        let first = CredentialStore::load(FailingStore::healthy(&shared)).await.unwrap();
        first
            .set(CredentialPair::new("TA", "RA"), test_user())
            .await
            .unwrap();

        let second = CredentialStore::load(FailingStore::failing(
            &shared,
            Some(REFRESH_TOKEN_KEY),
            false,
        ))
        .await
        .unwrap();
        let result = second.set(CredentialPair::new("TB", "RB"), test_user()).await;

        assert!(result.is_err());
        assert_eq!(second.get(), Some(CredentialPair::new("TB", "RB")));
        let reloaded = CredentialStore::load(FailingStore::healthy(&shared)).await.unwrap();
        assert_eq!(reloaded.get(), None);
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_no_mixed_pair() {
        let shared = Arc::new(MemoryStore::new());
        let first = CredentialStore::load(FailingStore::healthy(&shared)).await.unwrap();
        first
            .set(CredentialPair::new("TA", "RA"), test_user())
            .await
            .unwrap();

        // No cleanup runs after the failed refresh token write, as after a
        // crash between the two writes.
        let backend = FailingStore::failing(&shared, Some(REFRESH_TOKEN_KEY), false);
        let (access, refresh) = (Secret::new("TB"), Secret::new("RB"));
        let result = backend
            .set_many(&[(ACCESS_TOKEN_KEY, &access), (REFRESH_TOKEN_KEY, &refresh)])
            .await;
        assert!(result.is_err());
        assert_eq!(shared.get(ACCESS_TOKEN_KEY).await.unwrap(), Some(access));
        assert!(shared.get(REFRESH_TOKEN_KEY).await.unwrap().is_none());

        let reloaded = CredentialStore::load(FailingStore::healthy(&shared)).await.unwrap();
        assert_eq!(reloaded.get(), None);
        assert!(shared.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_pair_ignored_even_if_wipe_fails() {
        let mut data = HashMap::new();
        data.insert(ACCESS_TOKEN_KEY.to_string(), Secret::new("T1"));
        let shared = Arc::new(MemoryStore::with_data(data));

        let store = CredentialStore::load(FailingStore::failing(&shared, None, true))
            .await
            .unwrap();

        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_user_keeps_pair() {
        let mut data = HashMap::new();
        data.insert(ACCESS_TOKEN_KEY.to_string(), Secret::new("T1"));
        data.insert(REFRESH_TOKEN_KEY.to_string(), Secret::new("R1"));
        data.insert(USER_KEY.to_string(), Secret::new("not json"));

        let store = CredentialStore::load(Box::new(MemoryStore::with_data(data)))
            .await
            .unwrap();

        assert_eq!(store.get(), Some(CredentialPair::new("T1", "R1")));
        assert!(store.user().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_pair() {
        let store = Arc::new(empty_store().await);
        store
            .set(CredentialPair::new("TA", "RA"), test_user())
            .await
            .unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..200 {
                    let pair = if i % 2 == 0 {
                        CredentialPair::new("TB", "RB")
                    } else {
                        CredentialPair::new("TA", "RA")
                    };
                    store.set(pair, test_user()).await.unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for _ in 0..500 {
                        let pair = store.get().unwrap();
                        let access = pair.access_token.expose();
                        let refresh = pair.refresh_token.expose();
                        assert_eq!(&access[1..], &refresh[1..], "mixed pair observed");
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
