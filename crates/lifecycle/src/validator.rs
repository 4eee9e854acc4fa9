//! Memoized, single-flight credential validation.
//!
//! The cache is a retained [`Flight`]: every caller between invalidations
//! observes the same pending or resolved validation, and the TTL window is
//! measured from the validation's start. Concurrent callers inside the
//! window cost at most one identity-provider round-trip.

use std::sync::Arc;
use std::time::Instant;

use sg_domain::config::LifecycleConfig;
use sg_domain::session::{Credential, ValidationResult};
use sg_domain::trace::TraceEvent;

use crate::ports::IdentityProvider;
use crate::refresh::RefreshCoordinator;
use crate::resolver::resolve_context;
use crate::retry::RetryPolicy;
use crate::singleflight::Flight;

pub struct CredentialValidator {
    provider: Arc<dyn IdentityProvider>,
    refresh: Arc<RefreshCoordinator>,
    cache: Arc<Flight<ValidationResult>>,
    retry: RetryPolicy,
    refresh_window: chrono::Duration,
}

impl CredentialValidator {
    /// `cache` must be the same slot handed to the refresh coordinator,
    /// so that a completed refresh invalidates it synchronously.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        refresh: Arc<RefreshCoordinator>,
        cache: Arc<Flight<ValidationResult>>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            provider,
            refresh,
            cache,
            retry: RetryPolicy::from_config(config),
            refresh_window: config.refresh_window(),
        }
    }

    /// Validate the current credential, served from the cache when a
    /// validation started within the TTL window.
    pub async fn validate(&self) -> ValidationResult {
        let provider = self.provider.clone();
        let refresh = self.refresh.clone();
        let retry = self.retry.clone();
        let window = self.refresh_window;
        self.cache
            .join(move || async move {
                let started = Instant::now();
                let result = validate_once(provider, refresh, retry, window).await;
                TraceEvent::SessionValidated {
                    is_valid: result.is_valid,
                    reason: result.error.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
                .emit();
                result
            })
            .await
    }

    /// Drop the cached validation so the next call re-checks.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}

async fn validate_once(
    provider: Arc<dyn IdentityProvider>,
    refresh: Arc<RefreshCoordinator>,
    retry: RetryPolicy,
    refresh_window: chrono::Duration,
) -> ValidationResult {
    let cred = match retry.run(|| provider.current_credential()).await {
        Ok(Some(cred)) => cred,
        Ok(None) => return ValidationResult::invalid("no session"),
        Err(err) => return ValidationResult::invalid(format!("credential fetch failed: {err}")),
    };

    // Near-expiry credentials are refreshed proactively instead of being
    // probed and reported invalid.
    if cred.expires_within(refresh_window) {
        return match refresh.refresh().await {
            Some(new_cred) => probe(&provider, &retry, &new_cred).await,
            None => ValidationResult::invalid("credential expiring and refresh failed"),
        };
    }

    let first = probe(&provider, &retry, &cred).await;
    if first.is_valid {
        return first;
    }

    // Probe failed: one refresh attempt before concluding invalid.
    match refresh.refresh().await {
        Some(new_cred) => probe(&provider, &retry, &new_cred).await,
        None => first,
    }
}

/// Ask the provider who is behind the access token, under the retry
/// policy, and resolve the identity context on success.
async fn probe(
    provider: &Arc<dyn IdentityProvider>,
    retry: &RetryPolicy,
    cred: &Credential,
) -> ValidationResult {
    match retry
        .run(|| provider.user_for_token(&cred.access_token))
        .await
    {
        Ok(user) => ValidationResult::valid(resolve_context(cred, &user)),
        Err(err) => ValidationResult::invalid(format!("identity probe failed: {err}")),
    }
}
