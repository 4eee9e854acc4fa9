//! Shared test doubles: a scriptable identity provider with call
//! counters and an in-memory keyed store.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use sg_domain::error::{Error, Result};
use sg_domain::session::Credential;
use sg_lifecycle::ports::{IdentityProvider, KeyedStore, ProviderUser, StorageHealth};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Token helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a JWT-shaped access token carrying the given claims.
pub fn jwt_with_claims(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

pub fn credential(access_token: &str, expires_at: DateTime<Utc>) -> Credential {
    Credential {
        access_token: access_token.to_owned(),
        refresh_token: "rt-original".to_owned(),
        expires_at,
    }
}

pub fn provider_user(id: &str, tenant: Option<&str>) -> ProviderUser {
    ProviderUser {
        id: id.to_owned(),
        email: format!("{id}@example.com"),
        app_metadata: match tenant {
            Some(t) => serde_json::json!({ "tenant_id": t }),
            None => serde_json::json!({}),
        },
        user_metadata: serde_json::json!({}),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock identity provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scriptable provider. Probe and refresh take a short (paused-clock)
/// pause so concurrent callers genuinely overlap in flight.
pub struct MockProvider {
    pub credential: Mutex<Option<Credential>>,
    pub user: Mutex<ProviderUser>,
    pub probe_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub sign_out_calls: AtomicU32,
    pub fail_probe: AtomicBool,
    /// Number of upcoming credential fetches to fail (transient errors).
    pub fail_credential_fetches: AtomicU32,
    /// Fail every refresh attempt.
    pub fail_refresh: AtomicBool,
    /// Fail only refreshes without an override token (exercises the
    /// last-known-good fallback).
    pub fail_primary_refresh: AtomicBool,
    pub last_refresh_override: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(credential: Option<Credential>, user: ProviderUser) -> Self {
        Self {
            credential: Mutex::new(credential),
            user: Mutex::new(user),
            probe_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            sign_out_calls: AtomicU32::new(0),
            fail_probe: AtomicBool::new(false),
            fail_credential_fetches: AtomicU32::new(0),
            fail_refresh: AtomicBool::new(false),
            fail_primary_refresh: AtomicBool::new(false),
            last_refresh_override: Mutex::new(None),
        }
    }

    /// Point the provider at a different identity (token + user record).
    pub fn switch_identity(&self, cred: Credential, user: ProviderUser) {
        *self.credential.lock() = Some(cred);
        *self.user.lock() = user;
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn current_credential(&self) -> Result<Option<Credential>> {
        if self.fail_credential_fetches.load(Ordering::SeqCst) > 0 {
            self.fail_credential_fetches.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Provider("transient credential fetch failure".into()));
        }
        Ok(self.credential.lock().clone())
    }

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> Result<Credential> {
        let cred = credential(
            &jwt_with_claims(serde_json::json!({})),
            Utc::now() + chrono::Duration::hours(1),
        );
        *self.credential.lock() = Some(cred.clone());
        Ok(cred)
    }

    async fn refresh_credential(&self, refresh_override: Option<&str>) -> Result<Credential> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_override.lock() = refresh_override.map(str::to_owned);
        tokio::time::sleep(Duration::from_millis(20)).await;

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::Provider("refresh rejected".into()));
        }
        if self.fail_primary_refresh.load(Ordering::SeqCst) && refresh_override.is_none() {
            return Err(Error::Provider("stored refresh token already used".into()));
        }

        let user_id = self.user.lock().id.clone();
        let cred = Credential {
            access_token: jwt_with_claims(serde_json::json!({ "sub": user_id })),
            refresh_token: format!("rt-rotated-{}", self.refresh_calls.load(Ordering::SeqCst)),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        *self.credential.lock() = Some(cred.clone());
        Ok(cred)
    }

    async fn user_for_token(&self, _access_token: &str) -> Result<ProviderUser> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(Error::Provider("token probe rejected".into()));
        }
        Ok(self.user.lock().clone())
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock() = None;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory keyed store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MemoryStore {
    data: Mutex<BTreeMap<String, serde_json::Value>>,
    health: Mutex<StorageHealth>,
    pub clear_all_calls: AtomicU32,
    /// Artificial latency for purge operations, to widen overlap windows
    /// in serialization tests.
    pub purge_delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(BTreeMap::new()),
            health: Mutex::new(StorageHealth::Healthy),
            clear_all_calls: AtomicU32::new(0),
            purge_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn seed(&self, key: &str, value: serde_json::Value) {
        self.data.lock().insert(key.to_owned(), value);
    }

    pub fn set_health(&self, health: StorageHealth) {
        *self.health.lock() = health;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.data.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        _ttl: Option<Duration>,
    ) -> Result<()> {
        self.data.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn keys_under(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn clear_scope(&self, prefix: &str) -> Result<u64> {
        let delay = *self.purge_delay.lock();
        tokio::time::sleep(delay).await;
        let mut data = self.data.lock();
        let doomed: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            data.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn clear_all(&self) -> Result<u64> {
        self.clear_all_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.purge_delay.lock();
        tokio::time::sleep(delay).await;
        let mut data = self.data.lock();
        let count = data.len() as u64;
        data.clear();
        Ok(count)
    }

    async fn check_health(&self) -> Result<StorageHealth> {
        Ok(*self.health.lock())
    }
}
