//! `sg-lifecycle` — client-side identity/session lifecycle manager.
//!
//! Keeps a local view of "who is logged in, as which tenant" synchronized
//! with a remote identity provider, while guaranteeing that concurrent
//! callers never trigger duplicate validation/refresh round-trips and that
//! no data belonging to a previous identity or tenant survives into the
//! new one.
//!
//! The pieces, leaves first:
//!
//! - [`ports`] — the capabilities collaborators must provide: an
//!   [`IdentityProvider`] and a namespaced [`KeyedStore`].
//! - [`retry`] — bounded exponential backoff around provider calls.
//! - [`singleflight`] — the in-flight-future coalescing primitive behind
//!   both the validator cache and the refresh coordinator.
//! - [`resolver`] — derives a [`SessionContext`] from credential claims
//!   with an ordered tenant fallback chain.
//! - [`validator`] / [`refresh`] — single-flight credential validation
//!   with TTL memoization, and the refresh coordinator that invalidates it.
//! - [`cleanup`] — the isolation engine: transition-driven purges,
//!   corruption detection, emergency wipes.
//! - [`bus`] — lifecycle event fan-out with per-listener failure isolation.
//! - [`monitor`] — the idle-timeout sweep.
//! - [`manager`] — the dependency-injected [`SessionManager`] facade.
//!
//! [`IdentityProvider`]: ports::IdentityProvider
//! [`KeyedStore`]: ports::KeyedStore
//! [`SessionContext`]: sg_domain::SessionContext

pub mod bus;
pub mod cleanup;
pub mod keys;
pub mod manager;
pub mod monitor;
pub mod ports;
pub mod refresh;
pub mod resolver;
pub mod retry;
pub mod singleflight;
pub mod validator;

pub use bus::{NotificationBus, SessionListener};
pub use cleanup::{CorruptionReason, IsolationEngine};
pub use manager::SessionManager;
pub use monitor::ActivityMonitor;
pub use ports::{AuthEvent, AuthStateChange, IdentityProvider, KeyedStore, ProviderUser, StorageHealth};
pub use refresh::RefreshCoordinator;
pub use resolver::resolve_context;
pub use retry::RetryPolicy;
pub use singleflight::Flight;
pub use validator::CredentialValidator;
