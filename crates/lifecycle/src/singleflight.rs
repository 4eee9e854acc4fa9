//! In-flight future coalescing.
//!
//! A [`Flight`] is a single slot holding a shared future. Callers that
//! arrive while a flight is airborne subscribe to the same future instead
//! of launching their own — this is the mechanism that prevents a storm of
//! duplicate network calls when many surfaces ask "am I logged in"
//! simultaneously, and that keeps single-use refresh tokens from racing.
//!
//! A flight can optionally be *retained*: the landed result keeps being
//! served from the slot until a TTL (measured from the flight's start, so
//! a long-running flight does not extend the window) expires or the slot
//! is invalidated.

use std::future::Future;
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;

type SharedFlight<T> = Shared<BoxFuture<'static, T>>;

struct Entry<T: Clone> {
    started_at: Instant,
    fut: SharedFlight<T>,
}

/// A single-flight slot for operations producing a `T`.
pub struct Flight<T: Clone> {
    slot: Mutex<Option<Entry<T>>>,
    retain: Option<Duration>,
}

impl<T: Clone + Send + Sync + 'static> Flight<T> {
    /// A slot that clears as soon as the flight lands: pure coalescing of
    /// concurrent callers, no memoization.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            retain: None,
        }
    }

    /// A slot that keeps serving the landed result until `ttl` has passed
    /// since the flight started.
    pub fn with_retention(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            retain: Some(ttl),
        }
    }

    /// Join the current flight, or launch the future produced by `make`
    /// as the new one. Every caller observes the single shared outcome.
    pub async fn join<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let fut = {
            let mut slot = self.slot.lock();
            let reuse = slot.as_ref().and_then(|entry| {
                let live = match self.retain {
                    Some(ttl) => entry.started_at.elapsed() < ttl,
                    None => entry.fut.peek().is_none(),
                };
                live.then(|| entry.fut.clone())
            });
            match reuse {
                Some(fut) => fut,
                None => {
                    let shared = make().boxed().shared();
                    *slot = Some(Entry {
                        started_at: Instant::now(),
                        fut: shared.clone(),
                    });
                    shared
                }
            }
        };

        let out = fut.clone().await;

        // Non-retaining slots clear themselves once the flight lands, but
        // only if the slot still holds *this* flight.
        if self.retain.is_none() {
            let mut slot = self.slot.lock();
            if slot.as_ref().is_some_and(|e| e.fut.ptr_eq(&fut)) {
                *slot = None;
            }
        }

        out
    }

    /// Drop whatever the slot holds, pending or landed. The next `join`
    /// launches fresh.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }

    /// Whether a flight is currently airborne (installed and not landed).
    pub fn in_flight(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|e| e.fut.peek().is_none())
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Flight<T> {
    fn default() -> Self {
        Self::new()
    }
}
