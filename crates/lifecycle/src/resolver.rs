//! Identity context resolution.
//!
//! Derives a [`SessionContext`] from a credential and the provider's
//! identity record. The tenant is resolved through an ordered fallback
//! chain; a malformed token never aborts resolution, it just falls through
//! to the metadata sources.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use sg_domain::session::{Credential, SessionContext};

use crate::ports::ProviderUser;

/// Derive a fresh [`SessionContext`] for the given credential + identity.
///
/// Tenant fallback order:
/// 1. `tenant_id` claim in the access token's payload
/// 2. `app_metadata.tenant_id` on the identity record
/// 3. `user_metadata.tenant_id` on the identity record
/// 4. empty string
///
/// `session_id` and both timestamps are always freshly generated.
pub fn resolve_context(credential: &Credential, user: &ProviderUser) -> SessionContext {
    let tenant_id = resolve_tenant_id(credential, user);
    SessionContext::fresh(user.id.clone(), tenant_id, user.email.clone())
}

fn resolve_tenant_id(credential: &Credential, user: &ProviderUser) -> String {
    if let Some(claim) = decode_claims(&credential.access_token)
        .as_ref()
        .and_then(|claims| claims.get("tenant_id"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
    {
        return claim.to_owned();
    }

    for metadata in [&user.app_metadata, &user.user_metadata] {
        if let Some(tenant) = metadata
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            return tenant.to_owned();
        }
    }

    String::new()
}

/// Decode the claims segment of a JWT-shaped access token.
///
/// Returns `None` on any structural problem (wrong segment count, bad
/// base64, invalid JSON) — the token is opaque to us beyond this
/// best-effort peek, so decode failures are silent.
pub fn decode_claims(access_token: &str) -> Option<serde_json::Value> {
    let mut segments = access_token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&raw).ok()
}
