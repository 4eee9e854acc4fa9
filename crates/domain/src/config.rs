use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the session lifecycle manager.
///
/// The defaults carry the production values; tests shrink them to keep
/// timing deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// How long a validation result (pending or resolved) is served from
    /// the cache, measured from the *start* of the validation.
    #[serde(default = "d_300")]
    pub validation_ttl_secs: u64,
    /// Credentials expiring within this window are refreshed proactively
    /// instead of being probed.
    #[serde(default = "d_60")]
    pub refresh_window_secs: u64,
    /// Maximum attempts per provider call wrapped by the retry policy.
    #[serde(default = "d_5")]
    pub max_retry_attempts: u32,
    /// Base delay of the exponential backoff schedule.
    #[serde(default = "d_1000")]
    pub retry_base_delay_ms: u64,
    /// How often the activity monitor sweeps for idle sessions.
    #[serde(default = "d_300")]
    pub activity_sweep_secs: u64,
    /// Sessions idle longer than this are torn down with a full purge.
    #[serde(default = "d_86400")]
    pub session_timeout_secs: u64,
}

fn d_300() -> u64 {
    300
}
fn d_60() -> u64 {
    60
}
fn d_5() -> u32 {
    5
}
fn d_1000() -> u64 {
    1_000
}
fn d_86400() -> u64 {
    86_400
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            validation_ttl_secs: 300,
            refresh_window_secs: 60,
            max_retry_attempts: 5,
            retry_base_delay_ms: 1_000,
            activity_sweep_secs: 300,
            session_timeout_secs: 86_400,
        }
    }
}

impl LifecycleConfig {
    pub fn validation_ttl(&self) -> Duration {
        Duration::from_secs(self.validation_ttl_secs)
    }

    pub fn refresh_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_window_secs as i64)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn activity_sweep(&self) -> Duration {
        Duration::from_secs(self.activity_sweep_secs)
    }

    pub fn session_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_timeout_secs as i64)
    }
}
