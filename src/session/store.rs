//! In-memory session store with sliding time-based expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Inactivity window before a session is considered expired.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
/// Interval between background sweeps of expired sessions.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Thread-safe store of live sessions keyed by opaque id.
///
/// Every session tracks only its last-activity instant. A session is valid
/// iff it is present and its inactivity has not exceeded the TTL; `validate`
/// either renews that instant or evicts the record, never both. All
/// operations (including the background sweep) share one mutex, so a sweep
/// can never remove a session halfway through validation.
///
/// None of these operations fail: unknown and expired ids are reported as
/// plain `false`.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Instant>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl SessionStore {
    /// Create a store with the standard 30-minute TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The configured inactivity TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a fresh session and return its id. Always succeeds.
    ///
    /// The id combines a millisecond timestamp with a random component, so
    /// collisions with any live or recently expired id are negligible.
    pub fn create(&self) -> String {
        let id = new_session_id();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(id.clone(), Instant::now());
        debug!(session_id = %id, live = sessions.len(), "Session created");
        id
    }

    /// Check a session id, renewing it on success (sliding expiry).
    ///
    /// Expired sessions are evicted here, so a `false` for a previously
    /// valid id is permanent.
    pub fn validate(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(id) {
            None => false,
            Some(last_activity) => {
                if last_activity.elapsed() > self.ttl {
                    sessions.remove(id);
                    debug!(session_id = %id, "Session expired on validate");
                    false
                } else {
                    *last_activity = Instant::now();
                    true
                }
            }
        }
    }

    /// Delete a session. Returns whether it was present; a second call on
    /// the same id returns `false`.
    pub fn revoke(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let removed = sessions.remove(id).is_some();
        if removed {
            debug!(session_id = %id, "Session revoked");
        }
        removed
    }

    /// Evict every session whose inactivity exceeds the TTL, returning how
    /// many were removed. This bounds memory growth from abandoned sessions
    /// that are never validated again.
    pub fn sweep_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, last_activity| last_activity.elapsed() <= self.ttl);
        before - sessions.len()
    }

    /// Number of currently live sessions.
    pub fn live_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Spawn the recurring background sweep. The caller owns the handle and
    /// aborts it at shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval fires immediately; consume
            // it so sweeps start one full interval after init.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    info!(removed, live = store.live_count(), "Swept expired sessions");
                }
            }
        })
    }
}

/// Generate a collision-resistant opaque session id.
fn new_session_id() -> String {
    format!(
        "session_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fresh_session_validates() {
        let store = SessionStore::new();
        let id = store.create();
        assert!(!id.is_empty());
        assert!(store.validate(&id));
    }

    #[test]
    fn session_ids_are_unique() {
        let store = SessionStore::new();
        let a = store.create();
        let b = store.create();
        assert_ne!(a, b);
        assert_eq!(store.live_count(), 2);
    }

    #[test]
    fn unknown_id_is_invalid() {
        let store = SessionStore::new();
        assert!(!store.validate("session_0_nope"));
    }

    #[test]
    fn expiry_evicts_permanently() {
        let store = SessionStore::with_ttl(Duration::from_millis(20));
        let id = store.create();
        sleep(Duration::from_millis(40));
        assert!(!store.validate(&id));
        // Eviction happened during the first validate; the id stays dead
        // even if checked again right away.
        assert!(!store.validate(&id));
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn validation_slides_the_expiry_window() {
        // Three validations spaced at ~60% of the TTL each succeed even
        // though the total elapsed time exceeds a fixed TTL.
        let store = SessionStore::with_ttl(Duration::from_millis(50));
        let id = store.create();
        for _ in 0..3 {
            sleep(Duration::from_millis(30));
            assert!(store.validate(&id));
        }
    }

    #[test]
    fn revoke_is_idempotent() {
        let store = SessionStore::new();
        let id = store.create();
        assert!(store.revoke(&id));
        assert!(!store.revoke(&id));
        assert!(!store.validate(&id));
    }

    #[test]
    fn sweep_removes_untouched_expired_sessions() {
        let store = SessionStore::with_ttl(Duration::from_millis(20));
        let stale = store.create();
        sleep(Duration::from_millis(40));
        let fresh = store.create();
        // No validate call on `stale`; the sweep alone must evict it.
        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.validate(&stale));
        assert!(store.validate(&fresh));
    }

    #[test]
    fn sweep_on_empty_store_is_a_noop() {
        let store = SessionStore::new();
        assert_eq!(store.sweep_expired(), 0);
    }

    #[tokio::test]
    async fn background_sweeper_evicts_abandoned_sessions() {
        let store = Arc::new(SessionStore::with_ttl(Duration::from_millis(10)));
        let sweeper = store.spawn_sweeper(Duration::from_millis(20));
        store.create();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.live_count(), 0);
        sweeper.abort();
    }

    #[test]
    fn concurrent_create_and_validate() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = store.create();
                    assert!(store.validate(&id));
                    id
                })
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.live_count(), 8);
        for id in ids {
            assert!(store.revoke(&id));
        }
    }
}
