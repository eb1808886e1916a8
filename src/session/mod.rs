//! Session-based authentication.
//!
//! The [`SessionStore`] owns the map of live sessions (id -> last activity)
//! and implements create, validate-with-renewal, revoke, and the periodic
//! expiry sweep. The [`AuthGateway`] sits in front of it and only mints
//! sessions when the submitted secret matches the configured one.
//!
//! Sessions expire after 30 minutes of inactivity; each successful
//! validation slides that window forward. A background task sweeps expired
//! sessions every 10 minutes so abandoned ids do not accumulate.

mod auth;
mod store;

pub use auth::{AuthGateway, AuthOutcome};
pub use store::{SessionStore, SESSION_TTL, SWEEP_INTERVAL};
