//! Capabilities the lifecycle manager consumes from collaborators.
//!
//! The identity-provider wire protocol and the storage encoding are both
//! opaque here. Implementations may talk to a real backend or be test
//! doubles; all methods return `sg_domain::error::Result`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use sg_domain::error::Result;
use sg_domain::session::Credential;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The identity record the provider returns for a valid access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub email: String,
    /// Application-level metadata attached to the identity record.
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    /// User-editable metadata attached to the identity record.
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Provider-level auth state changes delivered to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A state-change notification from the provider subscription.
#[derive(Debug, Clone)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub credential: Option<Credential>,
}

/// Abstraction over the remote identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The credential currently held for this client, if any.
    async fn current_credential(&self) -> Result<Option<Credential>>;

    /// Authenticate with email + password, establishing a new credential.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Credential>;

    /// Exchange the refresh token for a new credential. When
    /// `refresh_override` is given, that token is used instead of the
    /// provider's stored one (fallback path after a failed refresh).
    async fn refresh_credential(&self, refresh_override: Option<&str>) -> Result<Credential>;

    /// Probe: resolve the identity record behind an access token.
    async fn user_for_token(&self, access_token: &str) -> Result<ProviderUser>;

    /// Invalidate the provider-side session.
    async fn sign_out(&self) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyed storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verdict from the storage health oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageHealth {
    Healthy,
    Degraded,
    Critical,
    Corrupted,
}

impl StorageHealth {
    /// Health states that force an emergency wipe.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Critical | Self::Corrupted)
    }
}

impl std::fmt::Display for StorageHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
            Self::Corrupted => "corrupted",
        };
        f.write_str(s)
    }
}

/// Scoped key/value storage with namespacing by key prefix.
///
/// Keys are tenant/user-namespaced by convention (see [`crate::keys`]);
/// the isolation engine is the only component permitted to call
/// [`KeyedStore::clear_all`].
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`. Returns whether it was present.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// All stored keys starting with `prefix`.
    async fn keys_under(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove every key under `prefix`. Returns the number removed.
    async fn clear_scope(&self, prefix: &str) -> Result<u64>;

    /// Unscoped full wipe. Returns the number of keys removed.
    async fn clear_all(&self) -> Result<u64>;

    /// Health oracle for corruption detection.
    async fn check_health(&self) -> Result<StorageHealth>;
}
