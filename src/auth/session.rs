//! Token session lifecycle management.
//!
//! `SessionManager` owns the in-memory session (token, user id, expiry),
//! persists a snapshot through the [`storage`](super::storage) layer, arms a
//! single-shot expiry timer, and broadcasts the authentication state over a
//! `tokio::sync::watch` channel so subscribers always observe the current
//! value. Both termination paths (explicit logout and timer expiry) funnel
//! through the same clear/persist/broadcast sequence.
//!
//! The manager is a cheap-clone handle: clones share one session, one timer,
//! and one broadcast channel.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::storage::{self, KeyValueStore};

/// Credentials issued by the API on successful login or signup.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: String,
    pub user_id: String,
    /// Token lifetime in seconds from the moment of issue
    pub expires_in: u64,
}

/// An authenticated session. Exists only while the user is logged in.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

struct SessionInner {
    session: Option<Session>,
    timer: Option<JoinHandle<()>>,
    /// Incremented on every arm, logout, and fire. A timer task only acts if
    /// its captured epoch still matches, so an aborted-but-already-fired task
    /// can never log out a newer session.
    epoch: u64,
}

/// Session store, expiry timer, and auth status broadcaster in one handle.
/// Clone is cheap - the state lives behind an `Arc`.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<SessionInner>>,
    status: watch::Sender<bool>,
    store: Arc<dyn KeyValueStore>,
}

impl SessionManager {
    /// Create a manager over the given storage backend. The manager starts
    /// unauthenticated; call [`rehydrate`](Self::rehydrate) to restore a
    /// persisted session.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (status, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                session: None,
                timer: None,
                epoch: 0,
            })),
            status,
            store,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn token(&self) -> Option<String> {
        self.inner.lock().session.as_ref().map(|s| s.token.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.lock().session.as_ref().and_then(|s| s.user_id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().session.as_ref().map(|s| s.expires_at)
    }

    /// Subscribe to authentication state changes. The receiver immediately
    /// holds the current value; later transitions are observed via
    /// `changed()`/`borrow_and_update()`. Dropping a receiver unsubscribes it
    /// without affecting other subscribers.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Install a freshly issued grant: populate the session, persist the
    /// snapshot, arm the expiry timer, and broadcast authenticated.
    ///
    /// Transport failures never reach this method - the caller only hands
    /// over grants from successful login/signup responses.
    pub fn login(&self, grant: AuthGrant) {
        let expires_at = Utc::now() + Duration::seconds(grant.expires_in as i64);
        let session = Session {
            token: grant.token,
            user_id: Some(grant.user_id),
            expires_at,
        };

        {
            let mut inner = self.inner.lock();
            storage::save_session(
                &*self.store,
                &session.token,
                session.expires_at,
                session.user_id.as_deref(),
            );
            inner.session = Some(session);
            self.arm_locked(&mut inner, StdDuration::from_secs(grant.expires_in));
        }

        debug!(expires_in = grant.expires_in, "Session established");
        self.broadcast(true);
    }

    /// Clear the session, cancel any pending expiry timer, remove the
    /// persisted snapshot, and broadcast unauthenticated.
    pub fn logout(&self) {
        {
            let mut inner = self.inner.lock();
            // Invalidate any timer task that has already fired but not yet
            // acquired the lock.
            inner.epoch += 1;
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.session = None;
            storage::clear_session(&*self.store);
        }

        debug!("Session cleared");
        self.broadcast(false);
    }

    /// Restore a persisted session if one exists with remaining lifetime.
    ///
    /// Safe to call repeatedly: re-arming replaces the previous timer rather
    /// than stacking a second one, and the broadcast only fires when the
    /// authentication state actually changes.
    pub fn rehydrate(&self) {
        let Some(persisted) = storage::load_session(&*self.store) else {
            self.broadcast(false);
            return;
        };

        let remaining = persisted.expires_at - Utc::now();
        if remaining <= Duration::zero() {
            debug!("Persisted session already expired, not restoring");
            self.broadcast(false);
            return;
        }

        {
            let mut inner = self.inner.lock();
            inner.session = Some(Session {
                token: persisted.token,
                user_id: persisted.user_id,
                expires_at: persisted.expires_at,
            });
            self.arm_locked(&mut inner, remaining.to_std().unwrap_or_default());
        }

        debug!(remaining_secs = remaining.num_seconds(), "Session restored from storage");
        self.broadcast(true);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Arm the expiry timer, replacing any previously armed one.
    fn arm_locked(&self, inner: &mut SessionInner, delay: StdDuration) {
        inner.epoch += 1;
        let epoch = inner.epoch;

        if let Some(previous) = inner.timer.take() {
            previous.abort();
        }

        let manager = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.expire(epoch);
        }));
    }

    /// Timer fire path: the expected terminal transition for an authenticated
    /// session. Takes the same clear/persist/broadcast route as `logout`.
    fn expire(&self, epoch: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                // A newer timer was armed or logout ran first; this fire is stale.
                return;
            }
            inner.epoch += 1;
            inner.timer = None;
            if inner.session.take().is_none() {
                return;
            }
            storage::clear_session(&*self.store);
        }

        debug!("Session expired");
        self.broadcast(false);
    }

    /// Publish the authentication state, at most once per transition.
    fn broadcast(&self, authenticated: bool) {
        self.status.send_if_modified(|current| {
            if *current == authenticated {
                false
            } else {
                *current = authenticated;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::{
        load_session, save_session, EXPIRATION_KEY, TOKEN_KEY, USER_ID_KEY,
    };
    use std::collections::BTreeMap;

    /// In-memory store for exercising the manager without touching disk.
    #[derive(Default)]
    struct MemStore(Mutex<BTreeMap<String, String>>);

    impl KeyValueStore for MemStore {
        fn get_item(&self, key: &str) -> Option<String> {
            self.0.lock().get(key).cloned()
        }

        fn set_item(&self, key: &str, value: &str) {
            self.0.lock().insert(key.to_string(), value.to_string());
        }

        fn remove_item(&self, key: &str) {
            self.0.lock().remove(key);
        }
    }

    fn grant(expires_in: u64) -> AuthGrant {
        AuthGrant {
            token: "tok-abc".to_string(),
            user_id: "u-1".to_string(),
            expires_in,
        }
    }

    /// Give spawned timer tasks a chance to run after the clock moves.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_populates_state_and_storage() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store.clone());

        manager.login(grant(3600));

        assert!(manager.is_authenticated());
        assert_eq!(manager.token().as_deref(), Some("tok-abc"));
        assert_eq!(manager.user_id().as_deref(), Some("u-1"));

        let persisted = load_session(&*store).expect("snapshot persisted");
        assert_eq!(persisted.token, "tok-abc");
        assert_eq!(persisted.user_id.as_deref(), Some("u-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_logs_out_and_clears_storage() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store.clone());

        manager.login(grant(3600));
        assert!(manager.is_authenticated());

        tokio::time::advance(StdDuration::from_secs(3600)).await;
        settle().await;

        assert!(!manager.is_authenticated());
        assert!(manager.token().is_none());
        assert!(load_session(&*store).is_none());
        assert!(!*manager.subscribe().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_cancels_pending_timer() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store.clone());

        manager.login(grant(3600));

        let mut rx = manager.subscribe();
        rx.borrow_and_update();

        manager.logout();
        assert!(rx.has_changed().expect("sender alive"));
        rx.borrow_and_update();

        // Past the original expiry: the cancelled timer must not broadcast again
        tokio::time::advance(StdDuration::from_secs(7200)).await;
        settle().await;

        assert!(!rx.has_changed().expect("sender alive"));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_restores_valid_session() {
        let store = Arc::new(MemStore::default());
        save_session(&*store, "tok-saved", Utc::now() + Duration::hours(2), Some("u-9"));

        let manager = SessionManager::new(store);
        manager.rehydrate();

        assert!(manager.is_authenticated());
        assert_eq!(manager.token().as_deref(), Some("tok-saved"));
        assert_eq!(manager.user_id().as_deref(), Some("u-9"));
        assert!(*manager.subscribe().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_expired_session_not_restored() {
        let store = Arc::new(MemStore::default());
        save_session(&*store, "tok-stale", Utc::now() - Duration::minutes(5), Some("u-9"));

        let manager = SessionManager::new(store);
        manager.rehydrate();

        assert!(!manager.is_authenticated());
        assert!(manager.token().is_none());

        // No timer was armed: nothing changes as time passes
        let mut rx = manager.subscribe();
        rx.borrow_and_update();
        tokio::time::advance(StdDuration::from_secs(600)).await;
        settle().await;
        assert!(!rx.has_changed().expect("sender alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_absent_snapshot_broadcasts_unauthenticated_once() {
        let manager = SessionManager::new(Arc::new(MemStore::default()));

        let mut rx = manager.subscribe();
        rx.borrow_and_update();

        // Already false; rehydrating an absent snapshot must not re-notify
        manager.rehydrate();
        assert!(!rx.has_changed().expect("sender alive"));
        assert!(!*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_rehydrate_arms_single_timer() {
        let store = Arc::new(MemStore::default());
        save_session(&*store, "tok-saved", Utc::now() + Duration::seconds(10), Some("u-9"));

        let manager = SessionManager::new(store);
        manager.rehydrate();
        manager.rehydrate();
        assert!(manager.is_authenticated());

        tokio::time::advance(StdDuration::from_secs(10)).await;
        settle().await;
        assert!(!manager.is_authenticated());

        // A fresh login right after expiry: a leftover timer from the first
        // rehydrate would tear this session down as well.
        manager.login(grant(3600));
        tokio::time::advance(StdDuration::from_secs(60)).await;
        settle().await;
        assert!(manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_login_replaces_old_timer() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store);

        manager.login(grant(60));
        manager.login(grant(3600));

        // Past the first grant's expiry but well within the second's
        tokio::time::advance(StdDuration::from_secs(120)).await;
        settle().await;
        assert!(manager.is_authenticated());

        tokio::time::advance(StdDuration::from_secs(3600)).await;
        settle().await;
        assert!(!manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_sees_current_value() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store);

        manager.login(grant(3600));

        // Subscribed after the transition, yet observes it immediately
        let rx = manager.subscribe();
        assert!(*rx.borrow());

        manager.logout();
        let rx2 = manager.subscribe();
        assert!(!*rx2.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_subscriber_does_not_affect_others() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store);

        let mut kept = manager.subscribe();
        kept.borrow_and_update();
        let dropped = manager.subscribe();
        drop(dropped);

        manager.login(grant(3600));
        assert!(kept.has_changed().expect("sender alive"));
        assert!(*kept.borrow_and_update());
        assert!(manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_normalizes_storage_keys() {
        let store = Arc::new(MemStore::default());
        let manager = SessionManager::new(store.clone());

        manager.login(grant(3600));
        manager.logout();

        // Fields are removed outright, never written back as empty strings
        assert!(store.get_item(TOKEN_KEY).is_none());
        assert!(store.get_item(EXPIRATION_KEY).is_none());
        assert!(store.get_item(USER_ID_KEY).is_none());
    }
}
