//! Re-entrant store locks.

use crate::error::{CoreError, CoreResult};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::time::Duration;

/// A named re-entrant mutex that serializes mutating operations.
///
/// The holding thread may acquire it again, so an operation can call other
/// locking operations without deadlocking. Without a timeout acquisition
/// blocks until the lock is free; with one it gives up with
/// [`CoreError::LockTimeout`].
pub struct LockManager {
    name: &'static str,
    mutex: ReentrantMutex<()>,
    timeout: Option<Duration>,
}

/// Proof of holding a [`LockManager`]; releases it on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    _guard: ReentrantMutexGuard<'a, ()>,
}

impl LockManager {
    /// Creates an unlocked lock.
    pub fn new(name: &'static str, timeout: Option<Duration>) -> Self {
        Self {
            name,
            mutex: ReentrantMutex::new(()),
            timeout,
        }
    }

    /// Name used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, honouring the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if the bounded wait expires.
    pub fn acquire(&self) -> CoreResult<LockGuard<'_>> {
        let guard = match self.timeout {
            None => self.mutex.lock(),
            Some(timeout) => self.mutex.try_lock_for(timeout).ok_or_else(|| {
                tracing::debug!(lock = self.name, ?timeout, "lock wait expired");
                CoreError::LockTimeout {
                    lock: self.name,
                    millis: timeout.as_millis(),
                }
            })?,
        };
        Ok(LockGuard { _guard: guard })
    }

    /// Returns whether some thread holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("locked", &self.is_locked())
            .finish()
    }
}
