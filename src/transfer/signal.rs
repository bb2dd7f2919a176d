//! One-shot completion signal
//!
//! A value resolved exactly once and awaited, with a bound, by any number of
//! waiters. Cancellation is modelled by resolving the signal from outside
//! (abort, reset, shutdown), which wakes every waiter with that outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::watch;

pub struct CompletionSignal<T> {
    name: &'static str,
    sender: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for CompletionSignal<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CompletionSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("name", &self.name)
            .field("value", &*self.sender.borrow())
            .finish()
    }
}

impl<T> CompletionSignal<T>
where
    T: Clone + fmt::Debug + Send + Sync,
{
    pub fn new(name: &'static str) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            name,
            sender: Arc::new(sender),
        }
    }

    /// Resolves the signal. Returns false, and logs a warning, when it was
    /// already resolved; the first value is kept.
    pub fn resolve(&self, value: T) -> bool {
        let mut pending = Some(value);
        if self.store(&mut pending) {
            return true;
        }
        warn!(
            "{} signal already resolved, ignoring {:?}",
            self.name, pending
        );
        false
    }

    /// Resolves the signal only if still pending, without complaint otherwise.
    pub fn try_resolve(&self, value: T) -> bool {
        self.store(&mut Some(value))
    }

    fn store(&self, pending: &mut Option<T>) -> bool {
        self.sender.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = pending.take();
                true
            } else {
                false
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn peek(&self) -> Option<T> {
        self.sender.borrow().clone()
    }

    /// Waits at most `timeout` for the resolution. `None` on timeout.
    pub async fn wait(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.wait_resolved())
            .await
            .ok()
            .flatten()
    }

    /// Waits without bound. Callers pair this with a cancellation point.
    pub async fn wait_resolved(&self) -> Option<T> {
        let mut receiver = self.sender.subscribe();
        let value = match receiver.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        value
    }
}
