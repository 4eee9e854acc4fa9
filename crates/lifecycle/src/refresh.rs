//! Single-flight credential refresh.
//!
//! Refresh tokens are typically single-use server-side: two parallel
//! refreshes would race and invalidate each other. All concurrent callers
//! therefore coalesce onto one in-flight refresh and observe its outcome.
//!
//! A successful refresh synchronously invalidates the validator's cache,
//! so a refresh's completion happens-before any subsequent validation's
//! cache lookup. Absence of a refreshed credential is reported as `None`,
//! never raised.

use std::sync::Arc;

use sg_domain::session::{Credential, ValidationResult};
use sg_domain::trace::TraceEvent;

use crate::keys::LAST_GOOD_REFRESH_KEY;
use crate::ports::{IdentityProvider, KeyedStore};
use crate::singleflight::Flight;

pub struct RefreshCoordinator {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn KeyedStore>,
    validation_cache: Arc<Flight<ValidationResult>>,
    flight: Flight<Option<Credential>>,
}

impl RefreshCoordinator {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyedStore>,
        validation_cache: Arc<Flight<ValidationResult>>,
    ) -> Self {
        Self {
            provider,
            store,
            validation_cache,
            flight: Flight::new(),
        }
    }

    /// Refresh the credential, coalescing with any refresh already in
    /// flight. Returns `None` when neither the stored refresh token nor
    /// the last-known-good fallback yields a credential.
    pub async fn refresh(&self) -> Option<Credential> {
        let provider = self.provider.clone();
        let store = self.store.clone();
        let cache = self.validation_cache.clone();
        self.flight
            .join(move || refresh_once(provider, store, cache))
            .await
    }
}

async fn refresh_once(
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn KeyedStore>,
    cache: Arc<Flight<ValidationResult>>,
) -> Option<Credential> {
    match provider.refresh_credential(None).await {
        Ok(cred) => {
            land(&store, &cache, &cred, false).await;
            Some(cred)
        }
        Err(err) => {
            tracing::warn!(error = %err, "refresh failed, trying last-known-good token");
            let fallback = match store.get(LAST_GOOD_REFRESH_KEY).await {
                Ok(value) => value.and_then(|v| v.as_str().map(str::to_owned)),
                Err(store_err) => {
                    tracing::warn!(error = %store_err, "could not read fallback refresh token");
                    None
                }
            };
            let Some(token) = fallback else {
                TraceEvent::RefreshFailed {
                    reason: err.to_string(),
                }
                .emit();
                return None;
            };
            match provider.refresh_credential(Some(&token)).await {
                Ok(cred) => {
                    land(&store, &cache, &cred, true).await;
                    Some(cred)
                }
                Err(fallback_err) => {
                    TraceEvent::RefreshFailed {
                        reason: fallback_err.to_string(),
                    }
                    .emit();
                    None
                }
            }
        }
    }
}

/// A refresh landed: remember its refresh token as last-known-good and
/// invalidate the validation cache before any caller can observe the new
/// credential.
async fn land(
    store: &Arc<dyn KeyedStore>,
    cache: &Arc<Flight<ValidationResult>>,
    cred: &Credential,
    fallback_used: bool,
) {
    if let Err(err) = store
        .set(
            LAST_GOOD_REFRESH_KEY,
            serde_json::Value::String(cred.refresh_token.clone()),
            None,
        )
        .await
    {
        tracing::warn!(error = %err, "failed to persist last-known-good refresh token");
    }
    cache.invalidate();
    TraceEvent::RefreshCompleted { fallback_used }.emit();
}
