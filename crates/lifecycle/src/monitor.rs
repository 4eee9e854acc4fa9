//! Idle-timeout sweep.
//!
//! A recurring timer compares the live context's `last_activity` against
//! the configured session timeout and, on exceeding it, drives the same
//! full-purge teardown as an explicit sign-out (published as a `cleanup`
//! event). The sweep task is aborted when the monitor is dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::manager::SessionManager;

pub struct ActivityMonitor {
    handle: JoinHandle<()>,
}

impl ActivityMonitor {
    /// Start the recurring sweep for the given manager. The interval
    /// comes from the manager's config.
    pub fn spawn(manager: Arc<SessionManager>) -> Self {
        let interval = manager.config().activity_sweep();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a freshly
            // started monitor does not sweep before any activity.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = manager.sweep_idle().await {
                    tracing::warn!(error = %err, "idle sweep failed");
                }
            }
        });
        Self { handle }
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
