//! Named mutual exclusion.
//!
//! The executor holds a named lock across the count-then-insert sequence of
//! `start_flow` (keyed per template) and across each `handle_job_action`
//! (keyed per instance).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Held lock. Dropping it releases the lock, including during unwinding.
pub struct LockGuard {
    _inner: Box<dyn Any>,
}

impl LockGuard {
    /// Wrap a backend-specific guard.
    pub fn new(inner: impl Any) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// A lock service addressed by string keys.
pub trait NamedLock: Send + Sync {
    /// Block until `key` is acquired.
    fn acquire(&self, key: &str) -> Result<LockGuard>;
}

/// Run `body` while holding `key`.
pub fn with_lock<R>(lock: &dyn NamedLock, key: &str, body: impl FnOnce() -> R) -> Result<R> {
    tracing::debug!(key, "Acquiring lock");
    let _guard = lock.acquire(key)?;
    Ok(body())
}

/// Process-local [`NamedLock`].
#[derive(Default)]
pub struct InProcessLock {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InProcessLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamedLock for InProcessLock {
    fn acquire(&self, key: &str) -> Result<LockGuard> {
        let slot = {
            let mut slots = self.slots.lock();
            // Drop slots nobody holds or waits on.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key.to_string()).or_default().clone()
        };
        Ok(LockGuard::new(slot.lock_arc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_is_exclusive() {
        let lock = Arc::new(InProcessLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    with_lock(lock.as_ref(), "template:1", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                    .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let lock = InProcessLock::new();
        let _a = lock.acquire("a").unwrap();
        let _b = lock.acquire("b").unwrap();
    }

    #[test]
    fn test_returns_body_result_and_releases() {
        let lock = InProcessLock::new();
        assert_eq!(with_lock(&lock, "k", || 7).unwrap(), 7);
        // Released: a second acquisition does not deadlock.
        assert_eq!(with_lock(&lock, "k", || 8).unwrap(), 8);
        assert!(lock.slots.lock().len() <= 1);
    }
}
