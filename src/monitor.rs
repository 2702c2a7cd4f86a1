//! A blocking lock built on an operating system mutex and condition variable.
//!
//! This is the only lock of this crate that parks waiting threads instead of
//! spinning. A flag marks the lock as held. A thread finding it set waits on
//! the condition variable, and every release wakes one waiter up. It serves
//! as the baseline the spinning locks are measured against.

use core::fmt::{self, Debug, Formatter};
use std::sync::{self, Condvar, MutexGuard, PoisonError};

use crate::lock::{ConstInit, RawLock, RawTryLock};

/// A lock that parks waiters on a condition variable.
///
/// The monitor (the mutex and condition variable pair) is owned by the lock
/// instance, it is not a process wide object.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use compositelock::monitor::Mutex;
///
/// let mutex = Arc::new(Mutex::new(0));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let mutex = Arc::clone(&mutex);
///         thread::spawn(move || *mutex.lock() += 1)
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
/// assert_eq!(*mutex.lock(), 4);
/// ```
pub struct MonitorLock {
    locked: sync::Mutex<bool>,
    released: Condvar,
}

/// A [`Mutex`] over a [`MonitorLock`].
///
/// [`Mutex`]: crate::Mutex
pub type Mutex<T> = crate::Mutex<T, MonitorLock>;

impl MonitorLock {
    /// Creates a new, unlocked lock.
    #[must_use]
    pub const fn new() -> Self {
        Self { locked: sync::Mutex::new(false), released: Condvar::new() }
    }

    /// Locks the monitor's own mutex.
    ///
    /// The flag is never left inconsistent, so poisoning is ignored.
    fn flag(&self) -> MutexGuard<'_, bool> {
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MonitorLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstInit for MonitorLock {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

impl Debug for MonitorLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorLock").field("locked", &*self.flag()).finish()
    }
}

// SAFETY: The flag is only ever set by a thread that observed it clear, both
// under the monitor's mutex, which also orders the critical sections.
unsafe impl RawLock for MonitorLock {
    type Token = ();

    fn lock(&self) {
        let mut locked = self.flag();
        while *locked {
            locked = self.released.wait(locked).unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    unsafe fn unlock(&self, (): ()) {
        let mut locked = self.flag();
        debug_assert!(*locked, "unlock of an unlocked MonitorLock");
        *locked = false;
        drop(locked);
        self.released.notify_one();
    }
}

// SAFETY: Same as `RawLock`.
unsafe impl RawTryLock for MonitorLock {
    fn try_lock(&self) -> Option<()> {
        let mut locked = self.flag();
        let false = *locked else { return None };
        *locked = true;
        Some(())
    }

    fn is_locked(&self) -> bool {
        *self.flag()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::MonitorLock;
    use crate::test::tests;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<MonitorLock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<MonitorLock>();
    }

    #[test]
    fn mutual_exclusion() {
        tests::mutual_exclusion::<MonitorLock>();
    }

    #[test]
    fn no_lost_updates() {
        tests::no_lost_updates::<MonitorLock>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<MonitorLock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<MonitorLock>();
    }

    #[test]
    fn test_mutex_debug() {
        tests::test_mutex_debug::<MonitorLock>();
    }

    #[test]
    fn test_lock_released_on_panic() {
        tests::test_lock_released_on_panic::<MonitorLock>();
    }

    #[test]
    fn test_lock_arc_nested() {
        tests::test_lock_arc_nested::<MonitorLock, MonitorLock>();
    }
}
