//! Credential storage and proactive token refresh
//!
//! Long-lived platform tokens expire; the [`TokenManager`] refreshes them
//! ahead of expiry so a run never starts with a dying credential. The
//! credential store is explicit state passed in by reference, read and
//! replaced as a whole document.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RefreshError, Result, StorageError};
use crate::storage::ObjectStore;
use crate::types::PlatformId;

/// Refresh fires when less than this much validity remains. Graph-style
/// long-lived tokens last 60 days.
pub const DEFAULT_REFRESH_WINDOW_DAYS: i64 = 20;

/// A platform credential as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub access_token: String,
    /// Absent for platforms whose tokens do not expire.
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// The in-process handle to a platform's current access token.
///
/// Clients read it per request; the manager installs refreshed tokens,
/// so a refresh mid-run takes effect without rebuilding clients.
#[derive(Clone)]
pub struct SharedToken(Arc<RwLock<String>>);

impl SharedToken {
    pub fn new(token: String) -> Self {
        Self(Arc::new(RwLock::new(token)))
    }

    pub fn get(&self) -> String {
        self.0.read().unwrap().clone()
    }

    pub fn set(&self, token: String) {
        *self.0.write().unwrap() = token;
    }
}

/// Read/replace access to persisted credentials.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self, platform: PlatformId) -> Result<Option<StoredCredential>>;

    /// Replace the stored credential in one write.
    async fn replace(&self, platform: PlatformId, credential: &StoredCredential) -> Result<()>;
}

/// Token store persisting credentials as JSON documents in the object
/// store, one per platform.
pub struct ObjectTokenStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectTokenStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn key(platform: PlatformId) -> String {
        format!("config/{}_token.json", platform)
    }
}

#[async_trait]
impl TokenStore for ObjectTokenStore {
    async fn load(&self, platform: PlatformId) -> Result<Option<StoredCredential>> {
        match self.store.get_json(&Self::key(platform)).await? {
            Some(value) => {
                let credential = serde_json::from_value(value)
                    .map_err(|e| StorageError::Parse(e.to_string()))?;
                Ok(Some(credential))
            }
            None => Ok(None),
        }
    }

    async fn replace(&self, platform: PlatformId, credential: &StoredCredential) -> Result<()> {
        let value = serde_json::to_value(credential)
            .map_err(|e| StorageError::Parse(e.to_string()))?;
        self.store.put_json(&Self::key(platform), &value).await?;
        info!(
            "Stored credential for {} (expires: {:?})",
            platform, credential.expires_at
        );
        Ok(())
    }
}

/// A platform's token refresh capability.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    fn platform(&self) -> PlatformId;

    /// The live token handle refreshed tokens are installed into.
    fn token(&self) -> &SharedToken;

    /// Exchange the current token for a fresh one and its expiry.
    async fn exchange(
        &self,
        current: &str,
    ) -> std::result::Result<(String, DateTime<Utc>), RefreshError>;
}

pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    refresh_window: Duration,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            refresh_window: Duration::days(DEFAULT_REFRESH_WINDOW_DAYS),
        }
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Refresh the platform's credential when it is inside the refresh
    /// window: fires iff `now >= expiry - window` (boundary inclusive).
    ///
    /// The new credential is persisted as a whole-document replace before
    /// the in-process token is updated, so a crash between the two leaves
    /// the store holding the newer token.
    pub async fn check_and_refresh(
        &self,
        refresher: &dyn TokenRefresher,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), RefreshError> {
        let platform = refresher.platform();

        let stored = self
            .store
            .load(platform)
            .await
            .map_err(|e| RefreshError::Store(e.to_string()))?;

        let Some(credential) = stored else {
            // Nothing persisted yet: the configured token governs and
            // there is no expiry to track.
            return Ok(());
        };

        let Some(expires_at) = credential.expires_at else {
            return Ok(());
        };

        if now < expires_at - self.refresh_window {
            return Ok(());
        }

        info!(
            "Refreshing {} token (expires {}, window {} days)",
            platform,
            expires_at,
            self.refresh_window.num_days()
        );

        let (new_token, new_expiry) = refresher.exchange(&credential.access_token).await?;

        let replacement = StoredCredential {
            access_token: new_token.clone(),
            expires_at: Some(new_expiry),
            updated_at: now,
        };
        self.store
            .replace(platform, &replacement)
            .await
            .map_err(|e| RefreshError::Store(e.to_string()))?;

        refresher.token().set(new_token);
        Ok(())
    }

    /// The stored token for a platform, if one has been persisted.
    pub async fn stored_token(&self, platform: PlatformId) -> Result<Option<String>> {
        Ok(self
            .store
            .load(platform)
            .await?
            .map(|c| c.access_token))
    }
}

/// Install the stored token into a client's handle when one exists,
/// preferring it over the configured bootstrap token.
pub async fn adopt_stored_token(
    manager: &TokenManager,
    platform: PlatformId,
    token: &SharedToken,
) -> Result<()> {
    if let Some(stored) = manager.stored_token(platform).await? {
        token.set(stored);
    } else {
        warn!(
            "No stored credential for {}; using configured token",
            platform
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRefresher {
        token: SharedToken,
        exchanges: AtomicUsize,
        fail: bool,
    }

    impl FakeRefresher {
        fn new() -> Self {
            Self {
                token: SharedToken::new("old-token".to_string()),
                exchanges: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        fn platform(&self) -> PlatformId {
            PlatformId::Instagram
        }

        fn token(&self) -> &SharedToken {
            &self.token
        }

        async fn exchange(
            &self,
            current: &str,
        ) -> std::result::Result<(String, DateTime<Utc>), RefreshError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RefreshError::Exchange("HTTP 400".to_string()));
            }
            assert_eq!(current, "old-token");
            Ok((
                "new-token".to_string(),
                "2026-06-01T00:00:00Z".parse().unwrap(),
            ))
        }
    }

    async fn store_with_expiry(expires_at: Option<&str>) -> (Arc<MemoryStore>, TokenManager) {
        let object_store = Arc::new(MemoryStore::new());
        let token_store = Arc::new(ObjectTokenStore::new(object_store.clone()));
        token_store
            .replace(
                PlatformId::Instagram,
                &StoredCredential {
                    access_token: "old-token".to_string(),
                    expires_at: expires_at.map(|s| s.parse().unwrap()),
                    updated_at: "2026-01-01T00:00:00Z".parse().unwrap(),
                },
            )
            .await
            .unwrap();
        let manager =
            TokenManager::new(token_store).with_refresh_window(Duration::days(20));
        (object_store, manager)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_refresh_fires_at_exact_boundary() {
        // expiry 2026-03-21, window 20 days: boundary is 2026-03-01.
        let (_, manager) = store_with_expiry(Some("2026-03-21T00:00:00Z")).await;
        let refresher = FakeRefresher::new();

        manager
            .check_and_refresh(&refresher, ts("2026-03-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(refresher.exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.token.get(), "new-token");
    }

    #[tokio::test]
    async fn test_no_refresh_just_before_boundary() {
        let (_, manager) = store_with_expiry(Some("2026-03-21T00:00:00Z")).await;
        let refresher = FakeRefresher::new();

        manager
            .check_and_refresh(&refresher, ts("2026-02-28T23:59:59Z"))
            .await
            .unwrap();

        assert_eq!(refresher.exchanges.load(Ordering::SeqCst), 0);
        assert_eq!(refresher.token.get(), "old-token");
    }

    #[tokio::test]
    async fn test_refresh_fires_past_boundary() {
        let (_, manager) = store_with_expiry(Some("2026-03-21T00:00:00Z")).await;
        let refresher = FakeRefresher::new();

        manager
            .check_and_refresh(&refresher, ts("2026-03-15T12:00:00Z"))
            .await
            .unwrap();

        assert_eq!(refresher.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_expiring_credential_never_refreshes() {
        let (_, manager) = store_with_expiry(None).await;
        let refresher = FakeRefresher::new();

        manager
            .check_and_refresh(&refresher, ts("2099-01-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(refresher.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_is_ok() {
        let object_store = Arc::new(MemoryStore::new());
        let manager = TokenManager::new(Arc::new(ObjectTokenStore::new(object_store)));
        let refresher = FakeRefresher::new();

        manager
            .check_and_refresh(&refresher, ts("2026-03-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(refresher.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exchange_failure_surfaces_and_preserves_store() {
        let (object_store, manager) = store_with_expiry(Some("2026-03-01T00:00:00Z")).await;
        let refresher = FakeRefresher::failing();

        let result = manager
            .check_and_refresh(&refresher, ts("2026-03-01T00:00:00Z"))
            .await;

        assert!(matches!(result, Err(RefreshError::Exchange(_))));
        // Old credential untouched; token not swapped.
        assert_eq!(refresher.token.get(), "old-token");
        let token_store = ObjectTokenStore::new(object_store);
        let stored = token_store.load(PlatformId::Instagram).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "old-token");
    }

    #[tokio::test]
    async fn test_refresh_replaces_stored_credential_atomically() {
        let (object_store, manager) = store_with_expiry(Some("2026-03-01T00:00:00Z")).await;
        let refresher = FakeRefresher::new();

        manager
            .check_and_refresh(&refresher, ts("2026-03-01T00:00:00Z"))
            .await
            .unwrap();

        let token_store = ObjectTokenStore::new(object_store);
        let stored = token_store.load(PlatformId::Instagram).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "new-token");
        assert_eq!(stored.expires_at, Some(ts("2026-06-01T00:00:00Z")));
    }

    #[tokio::test]
    async fn test_adopt_stored_token() {
        let (object_store, manager) = store_with_expiry(Some("2026-12-01T00:00:00Z")).await;
        let _ = object_store;
        let token = SharedToken::new("from-config".to_string());

        adopt_stored_token(&manager, PlatformId::Instagram, &token)
            .await
            .unwrap();
        assert_eq!(token.get(), "old-token");
    }
}
