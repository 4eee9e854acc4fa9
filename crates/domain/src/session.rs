//! Core session data model.
//!
//! A [`Credential`] is owned by the identity provider; the manager only
//! drives its lifecycle. A [`SessionContext`] is derived state — always
//! reconstructible from a valid credential — and exactly one is live at a
//! time. [`SessionChangeEvent`]s are broadcast once and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credential
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Access/refresh token pair with its expiry instant.
///
/// `Debug` is manually implemented to redact both tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the access token expires within `window` of now.
    pub fn expires_within(&self, window: chrono::Duration) -> bool {
        self.expires_at - Utc::now() <= window
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The manager's live view of "who is logged in, as which tenant".
///
/// `session_id` is minted fresh on every resolution and never reused
/// across logins, even for the same user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: String,
    pub tenant_id: String,
    pub email: String,
    pub session_id: String,
    pub login_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionContext {
    /// Build a freshly-resolved context for the given identity.
    ///
    /// Timestamps and the session ID are always generated here, never
    /// taken from input.
    pub fn fresh(user_id: impl Into<String>, tenant_id: impl Into<String>, email: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let now = Utc::now();
        Self {
            session_id: format!("{user_id}-{}", uuid::Uuid::new_v4()),
            user_id,
            tenant_id: tenant_id.into(),
            email: email.into(),
            login_at: now,
            last_activity: now,
        }
    }

    /// Whether the session has been idle longer than `timeout`.
    pub fn idle_longer_than(&self, timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > timeout
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Change events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What kind of identity transition an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionChangeKind {
    Login,
    Logout,
    UserChange,
    TenantChange,
    Cleanup,
    CorruptionDetected,
}

impl std::fmt::Display for SessionChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::UserChange => "user_change",
            Self::TenantChange => "tenant_change",
            Self::Cleanup => "cleanup",
            Self::CorruptionDetected => "corruption_detected",
        };
        f.write_str(s)
    }
}

/// Immutable lifecycle event broadcast to listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionChangeEvent {
    pub kind: SessionChangeKind,
    pub previous: Option<SessionContext>,
    pub new: Option<SessionContext>,
    pub cleanup_performed: bool,
    pub at: DateTime<Utc>,
}

impl SessionChangeEvent {
    pub fn new(
        kind: SessionChangeKind,
        previous: Option<SessionContext>,
        new: Option<SessionContext>,
        cleanup_performed: bool,
    ) -> Self {
        Self {
            kind,
            previous,
            new,
            cleanup_performed,
            at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of a credential validation attempt.
///
/// Never raised as an error — invalid sessions are reported in-band so
/// callers can route to the logout path.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub context: Option<SessionContext>,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn valid(context: SessionContext) -> Self {
        Self {
            is_valid: true,
            context: Some(context),
            error: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            context: None,
            error: Some(reason.into()),
        }
    }
}
