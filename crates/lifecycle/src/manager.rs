//! The session manager facade.
//!
//! Explicitly constructed and dependency-injected: all state lives in
//! fields of the instance, so tests create isolated managers instead of
//! sharing a lazily-initialized static. The live [`SessionContext`] and
//! the two single-flight slots (validation, refresh) are the only mutable
//! shared state; each is mutated only by the component that owns it.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use sg_domain::config::LifecycleConfig;
use sg_domain::error::{Error, Result};
use sg_domain::session::{Credential, SessionChangeEvent, SessionChangeKind, SessionContext};
use sg_domain::trace::TraceEvent;

use crate::bus::{ListenerId, NotificationBus, SessionListener};
use crate::cleanup::{CorruptionReason, IsolationEngine, Transition};
use crate::ports::{AuthEvent, AuthStateChange, IdentityProvider, KeyedStore};
use crate::refresh::RefreshCoordinator;
use crate::resolver::resolve_context;
use crate::retry::RetryPolicy;
use crate::singleflight::Flight;
use crate::validator::CredentialValidator;

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    config: LifecycleConfig,
    context: RwLock<Option<SessionContext>>,
    validator: CredentialValidator,
    engine: IsolationEngine,
    bus: NotificationBus,
    retry: RetryPolicy,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyedStore>,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        let cache = Arc::new(Flight::with_retention(config.validation_ttl()));
        let refresh = Arc::new(RefreshCoordinator::new(
            provider.clone(),
            store.clone(),
            cache.clone(),
        ));
        let validator = CredentialValidator::new(provider.clone(), refresh, cache, &config);
        let engine = IsolationEngine::new(store);
        let retry = RetryPolicy::from_config(&config);
        Arc::new(Self {
            provider,
            config,
            context: RwLock::new(None),
            validator,
            engine,
            bus: NotificationBus::new(),
            retry,
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    // ── Public surface ────────────────────────────────────────────────

    /// Resolve the current identity and route it through the transition
    /// state machine. Returns `None` when nobody is logged in, when
    /// teardown is in progress, or after a corruption wipe (callers must
    /// treat all three as "not logged in").
    pub async fn initialize_session(&self) -> Result<Option<SessionContext>> {
        if self.engine.cleanup_in_progress() {
            tracing::debug!("initialization gated: cleanup in progress");
            return Ok(None);
        }

        let Some(cred) = self.provider.current_credential().await? else {
            return Ok(None);
        };

        let user = match self
            .retry
            .run(|| self.provider.user_for_token(&cred.access_token))
            .await
        {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(error = %err, "identity probe failed during initialization");
                return Ok(None);
            }
        };

        // Corruption detection runs before every resolution. A user-id
        // difference is legitimate here (it routes into the user-change
        // purge below), so the held/live mismatch check applies only on
        // the steady-state validation path.
        if let Some(reason) = self.engine.detect_corruption(None, Some(&user)).await? {
            self.handle_corruption(reason).await?;
            return Ok(None);
        }

        let new_ctx = resolve_context(&cred, &user);
        self.apply_and_publish(new_ctx).await
    }

    /// Validate (or transparently refresh) the current credential.
    /// Returns the live credential, or `None` after falling back to the
    /// full logout path.
    pub async fn ensure_valid_session(&self) -> Option<Credential> {
        if self.engine.cleanup_in_progress() {
            return None;
        }

        let result = self.validator.validate().await;
        if result.is_valid {
            // Mid-session identity drift (e.g. another surface signed in
            // as someone else) is never legitimate on this path.
            if let (Some(held), Some(live)) = (self.current_context(), result.context.as_ref()) {
                if held.user_id != live.user_id {
                    let reason = CorruptionReason::UserMismatch {
                        held: held.user_id,
                        live: live.user_id.clone(),
                    };
                    if let Err(err) = self.handle_corruption(reason).await {
                        tracing::error!(error = %err, "emergency cleanup failed");
                    }
                    return None;
                }
            }
            self.update_activity();
            return self.provider.current_credential().await.ok().flatten();
        }

        tracing::warn!(
            reason = result.error.as_deref().unwrap_or("unknown"),
            "session validation failed"
        );
        if self.current_context().is_some() {
            if let Err(err) = self.sign_out().await {
                tracing::error!(error = %err, "logout after failed validation also failed");
            }
        }
        None
    }

    /// Authenticate with email + password and establish the session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Option<SessionContext>> {
        if self.engine.cleanup_in_progress() {
            return Err(Error::Auth("sign-in unavailable while cleanup is in progress".into()));
        }
        let cred = self.provider.sign_in_with_password(email, password).await?;
        let user = self
            .retry
            .run(|| self.provider.user_for_token(&cred.access_token))
            .await?;
        let new_ctx = resolve_context(&cred, &user);
        self.apply_and_publish(new_ctx).await
    }

    /// Full logout: purge everything the current context owns, clear
    /// legacy keys, sign out of the provider, publish `logout`.
    pub async fn sign_out(&self) -> Result<()> {
        let previous = self.context.write().take();
        let purged = self.engine.logout_purge(previous.as_ref()).await?;
        if let Err(err) = self.provider.sign_out().await {
            tracing::warn!(error = %err, "provider sign-out failed during logout");
        }
        self.validator.invalidate();
        self.bus
            .publish(&SessionChangeEvent::new(
                SessionChangeKind::Logout,
                previous,
                None,
                true,
            ))
            .await;
        tracing::debug!(purged_keys = purged, "logout complete");
        Ok(())
    }

    pub fn current_context(&self) -> Option<SessionContext> {
        self.context.read().clone()
    }

    pub fn is_logged_in_with_context(&self) -> bool {
        self.context.read().is_some()
    }

    /// Cheap, synchronous activity bump. Never touches storage or the
    /// network.
    pub fn update_activity(&self) {
        if let Some(ctx) = self.context.write().as_mut() {
            ctx.last_activity = Utc::now();
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// React to a provider-level auth state change.
    pub async fn handle_auth_event(&self, change: AuthStateChange) -> Result<()> {
        match change.event {
            AuthEvent::SignedIn => {
                self.initialize_session().await?;
            }
            AuthEvent::TokenRefreshed => {
                // The provider already holds the new credential; just stop
                // trusting the cached validation.
                self.validator.invalidate();
            }
            AuthEvent::SignedOut => {
                let previous = self.context.write().take();
                if previous.is_some() {
                    let _ = self.engine.logout_purge(previous.as_ref()).await?;
                    self.validator.invalidate();
                    self.bus
                        .publish(&SessionChangeEvent::new(
                            SessionChangeKind::Logout,
                            previous,
                            None,
                            true,
                        ))
                        .await;
                }
            }
        }
        Ok(())
    }

    /// One pass of the idle-timeout check. Public so the activity monitor
    /// (or an embedding application) can drive it. Returns whether a
    /// session was torn down.
    pub async fn sweep_idle(&self) -> Result<bool> {
        let timeout = self.config.session_timeout();
        let now = Utc::now();

        let previous = {
            let mut slot = self.context.write();
            match slot.as_ref() {
                Some(ctx) if ctx.idle_longer_than(timeout, now) => slot.take(),
                _ => return Ok(false),
            }
        };
        if let Some(ctx) = previous.as_ref() {
            TraceEvent::IdleTimeout {
                session_id: ctx.session_id.clone(),
                idle_secs: (now - ctx.last_activity).num_seconds(),
            }
            .emit();
        }

        let _ = self.engine.logout_purge(previous.as_ref()).await?;
        if let Err(err) = self.provider.sign_out().await {
            tracing::warn!(error = %err, "provider sign-out failed during idle teardown");
        }
        self.validator.invalidate();
        self.bus
            .publish(&SessionChangeEvent::new(
                SessionChangeKind::Cleanup,
                previous,
                None,
                true,
            ))
            .await;
        Ok(true)
    }

    // ── Internals ─────────────────────────────────────────────────────

    /// Compare the resolved context against the previous one, purge
    /// according to the transition, install the new context, publish.
    async fn apply_and_publish(&self, new_ctx: SessionContext) -> Result<Option<SessionContext>> {
        let previous = self.current_context();

        // Identical identity: refresh in place, keep the original
        // session_id and login timestamp, no event.
        if let Some(prev) = &previous {
            if prev.user_id == new_ctx.user_id && prev.tenant_id == new_ctx.tenant_id {
                self.update_activity();
                return Ok(self.current_context());
            }
        }

        let transition = self.engine.apply_transition(previous.as_ref(), &new_ctx).await?;
        let (kind, cleaned) = match transition {
            Transition::Login => (SessionChangeKind::Login, false),
            Transition::UserChange { .. } => (SessionChangeKind::UserChange, true),
            Transition::TenantChange { .. } => (SessionChangeKind::TenantChange, true),
            Transition::Unchanged => {
                self.update_activity();
                return Ok(self.current_context());
            }
        };

        // The cache may still hold a result for the previous identity
        // (or for "no session"); drop it before the new context becomes
        // visible.
        self.validator.invalidate();

        // Compare-and-swap: install only if the live context is still the
        // one the transition was computed against.
        {
            let mut slot = self.context.write();
            let unchanged = match (slot.as_ref(), previous.as_ref()) {
                (None, None) => true,
                (Some(a), Some(b)) => a.session_id == b.session_id,
                _ => false,
            };
            if !unchanged {
                tracing::warn!("live context changed during transition, discarding resolution");
                return Ok(slot.clone());
            }
            *slot = Some(new_ctx.clone());
        }

        TraceEvent::ContextTransition {
            kind: kind.to_string(),
            previous_user: previous.as_ref().map(|c| c.user_id.clone()),
            new_user: new_ctx.user_id.clone(),
            purged_keys: match transition {
                Transition::UserChange { purged } | Transition::TenantChange { purged } => purged,
                _ => 0,
            },
        }
        .emit();

        self.bus
            .publish(&SessionChangeEvent::new(
                kind,
                previous,
                Some(new_ctx.clone()),
                cleaned,
            ))
            .await;

        Ok(Some(new_ctx))
    }

    /// A structural invariant was violated: wipe everything, clear the
    /// context, sign out, tell the listeners.
    async fn handle_corruption(&self, reason: CorruptionReason) -> Result<()> {
        TraceEvent::CorruptionDetected {
            reason: reason.to_string(),
        }
        .emit();
        tracing::error!(reason = %reason, "session corruption detected, wiping state");

        let previous = self.context.write().take();
        self.engine.emergency_cleanup().await?;
        if let Err(err) = self.provider.sign_out().await {
            tracing::warn!(error = %err, "provider sign-out failed during emergency cleanup");
        }
        self.validator.invalidate();
        self.bus
            .publish(&SessionChangeEvent::new(
                SessionChangeKind::CorruptionDetected,
                previous,
                None,
                true,
            ))
            .await;
        Ok(())
    }
}
