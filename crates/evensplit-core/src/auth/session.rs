use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::storage::DeviceStorage;

/// Storage key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Whether a user is currently signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

impl AuthState {
    pub fn of(token: Option<&str>) -> Self {
        match token {
            Some(t) if !t.is_empty() => AuthState::Authenticated,
            _ => AuthState::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

struct Inner {
    tx: watch::Sender<Option<String>>,
    storage: Arc<dyn DeviceStorage>,
    initialized: AtomicBool,
    // Set inside the watch write lock by every `set_token`
    replaced: AtomicBool,
    // Held across each persistence write so durable state follows the
    // latest in-memory value
    persist_lock: Mutex<()>,
}

/// Single owner of the bearer token.
///
/// Clones share the same token. The token is replaced as a whole by
/// `set_token`, the only mutator; readers never observe a partial update.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn DeviceStorage>) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                tx,
                storage,
                initialized: AtomicBool::new(false),
                replaced: AtomicBool::new(false),
                persist_lock: Mutex::new(()),
            }),
        }
    }

    /// Hydrate the token from durable storage.
    ///
    /// Only the first call reads storage; later calls return the current
    /// state. A missing or unreadable token leaves the session anonymous.
    /// A token already set through `set_token` wins over the stored one.
    pub async fn initialize(&self) -> AuthState {
        let _guard = self.inner.persist_lock.lock().await;
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            return self.state();
        }

        let stored = match self.inner.storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token, starting anonymous");
                None
            }
        };

        let hydrated = self.inner.tx.send_if_modified(|current| {
            if self.inner.replaced.load(Ordering::SeqCst) {
                return false;
            }
            *current = stored;
            true
        });

        let state = self.state();
        if hydrated {
            debug!(?state, "Session hydrated from storage");
        } else {
            debug!(?state, "Token set before hydration, stored value ignored");
        }
        state
    }

    /// Replace the token and write it through to durable storage.
    ///
    /// `None` and empty strings clear the session. Subscribers are notified
    /// before the write completes. A failed write is logged and ignored; the
    /// in-memory token stays authoritative. Returns the state before the
    /// replacement.
    pub async fn set_token(&self, token: Option<String>) -> AuthState {
        let token = token.filter(|t| !t.is_empty());
        let new_state = AuthState::of(token.as_deref());
        let mut previous = None;
        self.inner.tx.send_modify(|current| {
            self.inner.replaced.store(true, Ordering::SeqCst);
            previous = std::mem::replace(current, token);
        });
        let previous = AuthState::of(previous.as_deref());

        if previous != new_state {
            info!(from = ?previous, to = ?new_state, "Session state changed");
        }

        self.persist().await;
        previous
    }

    /// End the session at the user's request
    pub async fn logout(&self) -> AuthState {
        self.set_token(None).await
    }

    async fn persist(&self) {
        let _guard = self.inner.persist_lock.lock().await;
        // Write whatever is current now, not what this caller set
        let current = self.inner.tx.borrow().clone();

        let result = match current {
            Some(ref token) => self.inner.storage.set(TOKEN_KEY, token),
            None => self.inner.storage.remove(TOKEN_KEY),
        };

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session token");
        }
    }

    /// Current token, if any
    pub fn token(&self) -> Option<String> {
        self.inner.tx.borrow().clone()
    }

    pub fn state(&self) -> AuthState {
        AuthState::of(self.inner.tx.borrow().as_deref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Observe token replacements
    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            rx: self.inner.tx.subscribe(),
        }
    }
}

/// Read-only view of a `SessionStore` that can wait for changes.
#[derive(Clone)]
pub struct SessionWatch {
    rx: watch::Receiver<Option<String>>,
}

impl SessionWatch {
    pub fn state(&self) -> AuthState {
        AuthState::of(self.rx.borrow().as_deref())
    }

    /// Wait for the next token replacement and return the resulting state.
    /// Returns `None` once every `SessionStore` handle has been dropped.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.rx.changed().await.ok()?;
        Some(AuthState::of(self.rx.borrow_and_update().as_deref()))
    }

    /// Mark the current value as seen
    pub fn mark_seen(&mut self) -> AuthState {
        AuthState::of(self.rx.borrow_and_update().as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::recording::{RecordingStorage, StorageOp};

    fn store_with(storage: Arc<RecordingStorage>) -> SessionStore {
        SessionStore::new(storage)
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let store = store_with(Arc::new(RecordingStorage::new()));
        for token in ["abc", "eyJhbGciOi.payload.sig", "x"] {
            store.set_token(Some(token.to_string())).await;
            assert_eq!(store.token().as_deref(), Some(token));
            assert!(store.is_authenticated());
        }
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let storage = Arc::new(RecordingStorage::new());
        let store = store_with(storage.clone());
        store.set_token(Some("abc".into())).await;

        assert_eq!(store.set_token(None).await, AuthState::Authenticated);
        let after_once = (store.token(), store.state());
        assert_eq!(store.set_token(None).await, AuthState::Anonymous);
        assert_eq!((store.token(), store.state()), after_once);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_token_is_anonymous() {
        let storage = Arc::new(RecordingStorage::new());
        let store = store_with(storage.clone());
        store.set_token(Some(String::new())).await;

        assert_eq!(store.token(), None);
        assert!(!store.is_authenticated());
        assert_eq!(storage.ops(), vec![StorageOp::Remove(TOKEN_KEY.into())]);
    }

    #[test]
    fn test_auth_state_derivation() {
        assert_eq!(AuthState::of(None), AuthState::Anonymous);
        assert_eq!(AuthState::of(Some("")), AuthState::Anonymous);
        assert_eq!(AuthState::of(Some("t")), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn test_initialize_without_token() {
        let storage = Arc::new(RecordingStorage::new());
        let store = store_with(storage);
        assert_eq!(store.initialize().await, AuthState::Anonymous);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let storage = Arc::new(RecordingStorage::new());
        storage.set(TOKEN_KEY, "persisted").unwrap();
        let store = store_with(storage.clone());

        store.initialize().await;
        store.set_token(Some("fresh".into())).await;
        // A second initialize must not clobber the live token
        assert_eq!(store.initialize().await, AuthState::Authenticated);
        assert_eq!(store.token().as_deref(), Some("fresh"));

        let gets = storage
            .ops()
            .into_iter()
            .filter(|op| matches!(op, StorageOp::Get(_)))
            .count();
        assert_eq!(gets, 1);
    }

    #[tokio::test]
    async fn test_token_set_before_initialize_survives() {
        let storage = Arc::new(RecordingStorage::new());
        storage.set(TOKEN_KEY, "stale").unwrap();
        let store = store_with(storage.clone());

        store.set_token(Some("fresh".into())).await;
        assert_eq!(store.initialize().await, AuthState::Authenticated);
        assert_eq!(store.token().as_deref(), Some("fresh"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_clear_before_initialize_survives() {
        let storage = Arc::new(RecordingStorage::new());
        storage.set(TOKEN_KEY, "stale").unwrap();
        let store = store_with(storage);

        store.logout().await;
        assert_eq!(store.initialize().await, AuthState::Anonymous);
        assert_eq!(store.token(), None);
    }

    #[tokio::test]
    async fn test_restart_restores_session() {
        let storage = Arc::new(RecordingStorage::new());
        let first = store_with(storage.clone());
        first.initialize().await;
        first.set_token(Some("abc".into())).await;
        drop(first);

        let second = store_with(storage);
        assert_eq!(second.initialize().await, AuthState::Authenticated);
        assert_eq!(second.token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_persist_failure_is_swallowed() {
        let storage = Arc::new(RecordingStorage::new());
        storage.fail_writes(true);
        let store = store_with(storage.clone());

        store.set_token(Some("abc".into())).await;
        assert_eq!(store.token().as_deref(), Some("abc"));

        // Next process start cannot recover it
        let restarted = store_with(storage);
        assert_eq!(restarted.initialize().await, AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_subscribers_see_replacement() {
        let store = store_with(Arc::new(RecordingStorage::new()));
        let mut watch = store.subscribe();
        assert_eq!(watch.state(), AuthState::Anonymous);

        store.set_token(Some("abc".into())).await;
        assert_eq!(watch.changed().await, Some(AuthState::Authenticated));

        store.logout().await;
        assert_eq!(watch.changed().await, Some(AuthState::Anonymous));
    }

    #[tokio::test]
    async fn test_watch_ends_when_store_dropped() {
        let store = store_with(Arc::new(RecordingStorage::new()));
        let mut watch = store.subscribe();
        drop(store);
        assert_eq!(watch.changed().await, None);
    }
}
