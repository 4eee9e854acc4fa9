//! Lifecycle event fan-out.
//!
//! Listeners run concurrently and each failure is isolated: one listener
//! erroring (or panicking) neither stops its siblings nor propagates to
//! the publisher. `publish` returns only after every listener has
//! completed, so callers may rely on "cleanup has definitely been
//! observed by all listeners" after awaiting it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use parking_lot::RwLock;

use sg_domain::error::Result;
use sg_domain::session::SessionChangeEvent;
use sg_domain::trace::TraceEvent;

/// Handle returned by [`NotificationBus::subscribe`], used to unsubscribe.
pub type ListenerId = u64;

/// A lifecycle event listener.
#[async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_event(&self, event: &SessionChangeEvent) -> Result<()>;
}

#[derive(Default)]
pub struct NotificationBus {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn SessionListener>)>>,
    next_id: AtomicU64,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver `event` to every current listener concurrently and await
    /// full fan-out completion.
    pub async fn publish(&self, event: &SessionChangeEvent) {
        let listeners: Vec<Arc<dyn SessionListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        let deliveries = listeners.iter().map(|listener| {
            std::panic::AssertUnwindSafe(listener.on_event(event)).catch_unwind()
        });

        for outcome in join_all(deliveries).await {
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(_) => "listener panicked".to_owned(),
            };
            TraceEvent::ListenerFailed {
                error: error.clone(),
            }
            .emit();
            tracing::warn!(kind = %event.kind, error = %error, "session listener failed");
        }
    }
}
