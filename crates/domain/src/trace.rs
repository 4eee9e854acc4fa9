use serde::Serialize;

/// Structured trace events emitted across the SessionGuard crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionValidated {
        is_valid: bool,
        reason: Option<String>,
        duration_ms: u64,
    },
    RefreshCompleted {
        fallback_used: bool,
    },
    RefreshFailed {
        reason: String,
    },
    ContextTransition {
        kind: String,
        previous_user: Option<String>,
        new_user: String,
        purged_keys: u64,
    },
    CleanupPerformed {
        scope: String,
        purged_keys: u64,
    },
    CorruptionDetected {
        reason: String,
    },
    EmergencyWipe {
        purged_keys: u64,
    },
    ListenerFailed {
        error: String,
    },
    IdleTimeout {
        session_id: String,
        idle_secs: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sg_event");
    }
}
