//! A single-assignment future completed from the reactor thread and observed
//! from any caller thread, blocking or via callback.
//!
//! No teacher counterpart (`boomnet` is synchronous/poll-based throughout);
//! `Mutex<Option<_>>` + `Condvar` is the idiomatic std-only realization of
//! spec.md §9's "promises and blocking waits" design note.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

struct Inner<T> {
    value: Mutex<Option<Result<T>>>,
    ready: Condvar,
    callback: Mutex<Option<Box<dyn FnOnce(&Result<T>) + Send>>>,
}

/// A promise that is completed exactly once, either by the reactor thread
/// (on I/O completion) or synchronously by the caller (on a state-conflict
/// fast path).
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                ready: Condvar::new(),
                callback: Mutex::new(None),
            }),
        }
    }

    /// Install a callback invoked exactly once when the promise completes.
    /// If it is already complete, the callback runs immediately on the
    /// calling thread. Only one callback may be installed; installing a
    /// second one replaces the first (the slot is single-occupancy, matching
    /// spec.md's "single callback slot").
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        // Hold `value` across the check-and-install so a concurrent
        // `complete()` can't land between "not yet complete" and "callback
        // installed" and fire an empty slot, stranding `f` uncalled.
        let value = self.inner.value.lock().expect("promise mutex poisoned");
        if let Some(result) = value.as_ref() {
            f(result);
            return;
        }
        *self.inner.callback.lock().expect("promise mutex poisoned") = Some(Box::new(f));
    }

    /// Complete the promise. Called at most once; a second call is ignored.
    pub fn complete(&self, result: Result<T>) {
        let mut value = self.inner.value.lock().expect("promise mutex poisoned");
        if value.is_some() {
            return;
        }
        *value = Some(result);
        drop(value);
        self.inner.ready.notify_all();
        if let Some(callback) = self.inner.callback.lock().expect("promise mutex poisoned").take() {
            let value = self.inner.value.lock().expect("promise mutex poisoned");
            callback(value.as_ref().expect("just completed"));
        }
    }

    pub fn is_complete(&self) -> bool {
        self.inner.value.lock().expect("promise mutex poisoned").is_some()
    }
}

impl<T: Clone> Promise<T> {
    /// Block the calling thread until the promise completes.
    pub fn wait(&self) -> Result<T> {
        let mut value = self.inner.value.lock().expect("promise mutex poisoned");
        while value.is_none() {
            value = self.inner.ready.wait(value).expect("promise mutex poisoned");
        }
        value.as_ref().expect("checked above").clone()
    }

    /// Block until the promise completes or `timeout` elapses. Returns
    /// `Error::Timeout` on expiry; the underlying operation the promise
    /// represents is never cancelled by a timed-out wait.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let value = self.inner.value.lock().expect("promise mutex poisoned");
        let (value, _) = self
            .inner
            .ready
            .wait_timeout_while(value, timeout, |v| v.is_none())
            .expect("promise mutex poisoned");
        match value.as_ref() {
            Some(result) => result.clone(),
            None => Err(Error::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_blocks_until_complete() {
        let promise: Promise<i32> = Promise::new();
        let p2 = promise.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            p2.complete(Ok(42));
        });
        assert_eq!(promise.wait().unwrap(), 42);
    }

    #[test]
    fn wait_timeout_does_not_cancel_completion() {
        let promise: Promise<i32> = Promise::new();
        assert!(matches!(promise.wait_timeout(Duration::from_millis(10)), Err(Error::Timeout)));
        promise.complete(Ok(7));
        assert_eq!(promise.wait().unwrap(), 7);
    }

    #[test]
    fn on_complete_after_completion_runs_immediately() {
        let promise: Promise<i32> = Promise::new();
        promise.complete(Ok(5));
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        promise.on_complete(move |result| {
            *seen2.lock().unwrap() = Some(result.as_ref().unwrap().clone());
        });
        assert_eq!(*seen.lock().unwrap(), Some(5));
    }
}
