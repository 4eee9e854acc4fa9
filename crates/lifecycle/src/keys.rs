//! Storage key namespacing conventions.
//!
//! Every key the application writes is scoped under its owner:
//!
//! - user-level:   `user:{user_id}:...`
//! - tenant-level: `user:{user_id}:tenant:{tenant_id}:...`
//!
//! Clearing a scope prefix is therefore sufficient to guarantee that no
//! data belonging to a previous identity or tenant survives into the new
//! one. Legacy pre-migration keys were unscoped; they are matched by name
//! pattern and swept on every full logout.

use std::sync::OnceLock;

use regex::RegexSet;

/// Prefix under which session-metadata records are written. More than
/// [`MAX_SESSION_META_KEYS`] of these present at once indicates that the
/// at-most-one-live-session invariant has been violated.
pub const SESSION_META_PREFIX: &str = "session:meta:";

/// Tolerated number of session-metadata keys. The invariant is "exactly
/// one session-metadata record", but limited legitimate namespacing (e.g.
/// a meta record plus per-surface mirrors) keeps the tolerance at 3.
pub const MAX_SESSION_META_KEYS: usize = 3;

/// Durable, unscoped slot for the last refresh token that successfully
/// produced a credential. Read by the refresh fallback path.
pub const LAST_GOOD_REFRESH_KEY: &str = "auth:last-good-refresh";

/// The fixed set of tenant-scoped cache keys purged on a tenant change.
pub const TENANT_CACHE_SUFFIXES: [&str; 3] =
    ["access-list", "bootstrap-cache", "permission-cache"];

/// Scope prefix covering everything a user owns, tenant sub-keys included.
pub fn user_scope(user_id: &str) -> String {
    format!("user:{user_id}:")
}

/// Scope prefix covering one tenant's data within a user's namespace.
pub fn tenant_scope(user_id: &str, tenant_id: &str) -> String {
    format!("user:{user_id}:tenant:{tenant_id}:")
}

/// The concrete tenant cache keys for a (user, tenant) pair.
pub fn tenant_cache_keys(user_id: &str, tenant_id: &str) -> Vec<String> {
    let scope = tenant_scope(user_id, tenant_id);
    TENANT_CACHE_SUFFIXES
        .iter()
        .map(|suffix| format!("{scope}{suffix}"))
        .collect()
}

/// Whether `key` matches a known historical (pre-migration, unscoped)
/// key name. These are cleared on every full logout as a defense against
/// stale data written by old clients.
pub fn is_legacy_key(key: &str) -> bool {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    let set = PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"^auth_token$",
            r"^user_session",
            r"^tenant_cache_",
            r"^sb-.*-auth-token$",
            r"^current_tenant$",
        ])
        .expect("legacy key patterns are valid regexes")
    });
    set.is_match(key)
}
