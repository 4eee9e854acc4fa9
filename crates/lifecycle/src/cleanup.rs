//! Isolation and cleanup engine.
//!
//! Consumes identity transitions and purges exactly the storage the
//! departing identity owned: a user change clears the whole previous user
//! scope, a tenant change clears only the previous tenant's cache keys,
//! a logout clears everything the current context owned plus legacy
//! unscoped keys. Corruption findings force an unconditional full wipe.
//!
//! This is the only component permitted to perform unscoped wipes, and
//! all purges run through one single-flight slot: a cleanup requested
//! while another is in progress (e.g. a timeout sweep firing during a
//! manual logout) collapses into a wait on the first instead of racing
//! on storage.

use std::sync::Arc;

use sg_domain::error::{Error, Result};
use sg_domain::session::SessionContext;
use sg_domain::trace::TraceEvent;

use crate::keys;
use crate::ports::{KeyedStore, ProviderUser, StorageHealth};
use crate::singleflight::Flight;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Corruption detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why the at-most-one-live-session invariant was considered violated.
#[derive(Debug, Clone)]
pub enum CorruptionReason {
    /// More session-metadata records than the tolerated namespacing allows.
    TooManySessionKeys { count: usize },
    /// The provider's live session belongs to a different user than the
    /// manager's held context.
    UserMismatch { held: String, live: String },
    /// The storage health oracle reported a fatal state.
    StorageUnhealthy { health: StorageHealth },
}

impl std::fmt::Display for CorruptionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManySessionKeys { count } => {
                write!(f, "{count} session-metadata keys present (max {})", keys::MAX_SESSION_META_KEYS)
            }
            Self::UserMismatch { held, live } => {
                write!(f, "held context user {held} disagrees with live session user {live}")
            }
            Self::StorageUnhealthy { health } => write!(f, "storage health is {health}"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of routing a previous/new context pair.
#[derive(Debug, Clone, Copy)]
pub enum Transition {
    /// No previous identity: first login, nothing to purge.
    Login,
    /// Different user: the whole previous user scope was purged.
    UserChange { purged: u64 },
    /// Same user, different tenant: only the previous tenant's cache keys
    /// were purged; user-level data survives.
    TenantChange { purged: u64 },
    /// Identical identity: nothing purged.
    Unchanged,
}

// Cleanup ops run behind a `Flight`, whose results must be `Clone`; the
// error side is carried as a message and rehydrated at the boundary.
type CleanupOutcome = std::result::Result<u64, String>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct IsolationEngine {
    store: Arc<dyn KeyedStore>,
    cleanups: Flight<CleanupOutcome>,
}

impl IsolationEngine {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self {
            store,
            cleanups: Flight::new(),
        }
    }

    /// Whether a cleanup is currently running. Initialization and
    /// validation entry points are gated on this while teardown is in
    /// progress.
    pub fn cleanup_in_progress(&self) -> bool {
        self.cleanups.in_flight()
    }

    /// Check the structural invariants before a resolution is applied.
    ///
    /// Returns the first violation found, or `None` when the store and
    /// the live identity look consistent.
    pub async fn detect_corruption(
        &self,
        held: Option<&SessionContext>,
        live: Option<&ProviderUser>,
    ) -> Result<Option<CorruptionReason>> {
        let meta_keys = self.store.keys_under(keys::SESSION_META_PREFIX).await?;
        if meta_keys.len() > keys::MAX_SESSION_META_KEYS {
            return Ok(Some(CorruptionReason::TooManySessionKeys {
                count: meta_keys.len(),
            }));
        }

        if let (Some(ctx), Some(user)) = (held, live) {
            if ctx.user_id != user.id {
                return Ok(Some(CorruptionReason::UserMismatch {
                    held: ctx.user_id.clone(),
                    live: user.id.clone(),
                }));
            }
        }

        let health = self.store.check_health().await?;
        if health.is_fatal() {
            return Ok(Some(CorruptionReason::StorageUnhealthy { health }));
        }

        Ok(None)
    }

    /// Route a previous/new context pair into the matching purge.
    pub async fn apply_transition(
        &self,
        previous: Option<&SessionContext>,
        new: &SessionContext,
    ) -> Result<Transition> {
        let Some(prev) = previous else {
            return Ok(Transition::Login);
        };

        if prev.user_id != new.user_id {
            let scope = keys::user_scope(&prev.user_id);
            let purged = self.run_serialized(purge_scope(self.store.clone(), scope.clone())).await?;
            TraceEvent::CleanupPerformed {
                scope,
                purged_keys: purged,
            }
            .emit();
            return Ok(Transition::UserChange { purged });
        }

        if prev.tenant_id != new.tenant_id {
            let store = self.store.clone();
            let user_id = prev.user_id.clone();
            let tenant_id = prev.tenant_id.clone();
            let purged = self
                .run_serialized(purge_tenant_caches(store, user_id, tenant_id.clone()))
                .await?;
            TraceEvent::CleanupPerformed {
                scope: keys::tenant_scope(&prev.user_id, &tenant_id),
                purged_keys: purged,
            }
            .emit();
            return Ok(Transition::TenantChange { purged });
        }

        Ok(Transition::Unchanged)
    }

    /// Full logout purge: everything the departing context owned, the
    /// durable refresh-token slot, and any legacy unscoped keys left by
    /// pre-migration clients.
    pub async fn logout_purge(&self, previous: Option<&SessionContext>) -> Result<u64> {
        let store = self.store.clone();
        let scope = previous.map(|ctx| keys::user_scope(&ctx.user_id));
        let purged = self.run_serialized(logout_sweep(store, scope.clone())).await?;
        TraceEvent::CleanupPerformed {
            scope: scope.unwrap_or_else(|| "(legacy only)".to_owned()),
            purged_keys: purged,
        }
        .emit();
        Ok(purged)
    }

    /// Emergency cleanup after a corruption finding: unscoped full wipe.
    pub async fn emergency_cleanup(&self) -> Result<u64> {
        let store = self.store.clone();
        let purged = self
            .run_serialized(async move { store.clear_all().await.map_err(|e| e.to_string()) })
            .await?;
        TraceEvent::EmergencyWipe {
            purged_keys: purged,
        }
        .emit();
        Ok(purged)
    }

    async fn run_serialized(
        &self,
        op: impl std::future::Future<Output = CleanupOutcome> + Send + 'static,
    ) -> Result<u64> {
        self.cleanups
            .join(move || op)
            .await
            .map_err(Error::Storage)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Purge ops
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn purge_scope(store: Arc<dyn KeyedStore>, scope: String) -> CleanupOutcome {
    store
        .clear_scope(&scope)
        .await
        .map_err(|e| e.to_string())
}

async fn purge_tenant_caches(
    store: Arc<dyn KeyedStore>,
    user_id: String,
    tenant_id: String,
) -> CleanupOutcome {
    let mut purged = 0u64;
    for key in keys::tenant_cache_keys(&user_id, &tenant_id) {
        if store.remove(&key).await.map_err(|e| e.to_string())? {
            purged += 1;
        }
    }
    Ok(purged)
}

async fn logout_sweep(store: Arc<dyn KeyedStore>, scope: Option<String>) -> CleanupOutcome {
    let mut purged = 0u64;

    if let Some(scope) = scope {
        purged += store.clear_scope(&scope).await.map_err(|e| e.to_string())?;
    }

    store
        .remove(keys::LAST_GOOD_REFRESH_KEY)
        .await
        .map_err(|e| e.to_string())?;

    // Stale pre-migration keys were written unscoped; sweep them by name.
    let all_keys = store.keys_under("").await.map_err(|e| e.to_string())?;
    for key in all_keys.into_iter().filter(|k| keys::is_legacy_key(k)) {
        if store.remove(&key).await.map_err(|e| e.to_string())? {
            purged += 1;
        }
    }

    Ok(purged)
}
