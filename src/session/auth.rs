//! Shared-secret authentication gating session creation.

use super::store::SessionStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of an authentication attempt. Failure is data, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
}

impl AuthOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: None,
            message: message.into(),
        }
    }
}

/// Validates a submitted secret and mints sessions on success.
///
/// A missing configured secret fails closed: that is a server
/// configuration fault and its message names the missing variable,
/// distinct from an ordinary wrong-secret failure.
pub struct AuthGateway {
    expected_secret: Option<String>,
    store: Arc<SessionStore>,
}

impl AuthGateway {
    pub fn new(expected_secret: Option<String>, store: Arc<SessionStore>) -> Self {
        Self {
            expected_secret,
            store,
        }
    }

    /// Compare the submitted secret against the configured one and create
    /// a session on an exact, case-sensitive match.
    ///
    /// There is no rate limiting or lockout on repeated failures.
    pub fn authenticate(&self, submitted: &str) -> AuthOutcome {
        let Some(expected) = self.expected_secret.as_deref() else {
            warn!("AUTH_SECRET is not configured; refusing authentication");
            return AuthOutcome::failure(
                "Error: AUTH_SECRET is not configured in the server environment",
            );
        };

        if submitted != expected {
            info!("Authentication failed: incorrect secret");
            return AuthOutcome::failure("Incorrect secret");
        }

        let session_id = self.store.create();
        info!(session_id = %session_id, "Authentication succeeded");
        AuthOutcome {
            success: true,
            session_id: Some(session_id),
            message: "Authentication successful. Keep your sessionId for subsequent calls."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(secret: Option<&str>) -> (AuthGateway, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::new());
        (
            AuthGateway::new(secret.map(str::to_string), Arc::clone(&store)),
            store,
        )
    }

    #[test]
    fn correct_secret_mints_a_valid_session() {
        let (auth, store) = gateway(Some("hunter2"));
        let outcome = auth.authenticate("hunter2");
        assert!(outcome.success);
        let id = outcome.session_id.expect("session id on success");
        assert!(store.validate(&id));
    }

    #[test]
    fn wrong_secret_creates_no_session() {
        let (auth, store) = gateway(Some("hunter2"));
        let outcome = auth.authenticate("hunter3");
        assert!(!outcome.success);
        assert!(outcome.session_id.is_none());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let (auth, store) = gateway(Some("Hunter2"));
        assert!(!auth.authenticate("hunter2").success);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn missing_configured_secret_fails_closed() {
        let (auth, store) = gateway(None);
        let outcome = auth.authenticate("anything");
        assert!(!outcome.success);
        assert!(outcome.message.contains("AUTH_SECRET"));
        // Even the empty string must not slip through.
        assert!(!auth.authenticate("").success);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn repeated_failures_are_not_locked_out() {
        // Known weakness: there is no lockout or rate limiting, so a correct
        // secret succeeds no matter how many failures preceded it.
        let (auth, _store) = gateway(Some("hunter2"));
        for _ in 0..5 {
            assert!(!auth.authenticate("wrong").success);
        }
        assert!(auth.authenticate("hunter2").success);
    }

    #[test]
    fn concurrent_logins_are_unbounded() {
        let (auth, store) = gateway(Some("hunter2"));
        for _ in 0..10 {
            assert!(auth.authenticate("hunter2").success);
        }
        assert_eq!(store.live_count(), 10);
    }
}
