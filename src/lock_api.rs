//! Locking interfaces compatible with [lock_api].
//!
//! This module exports [`lock_api::Mutex`] and [`lock_api::MutexGuard`] aliases
//! over [`Raw`], an adapter that turns any lock of this crate that supports
//! non-blocking acquisition into a [`RawMutex`]. Locks that also support
//! deadlines ([`TimeoutLock`], [`CompositeLock`] and [`FastPathLock`]) are
//! [`RawMutexTimed`] as well.
//!
//! The `lock_api` interface has no place for per-acquisition state, so the
//! adapter stores the token of the current holder inside the lock itself.
//!
//! [lock_api]: https://crates.io/crates/lock_api
//! [`lock_api::Mutex`]: https://docs.rs/lock_api/latest/lock_api/struct.Mutex.html
//! [`lock_api::MutexGuard`]: https://docs.rs/lock_api/latest/lock_api/struct.MutexGuard.html
//! [`RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [`RawMutexTimed`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutexTimed.html
//! [`TimeoutLock`]: crate::timeout::TimeoutLock
//! [`CompositeLock`]: crate::composite::CompositeLock
//! [`FastPathLock`]: crate::composite::FastPathLock

use core::cell::UnsafeCell;
use core::fmt::{self, Debug, Formatter};
use std::time::{Duration, Instant};

use lock_api::{GuardSend, RawMutex, RawMutexTimed};

use crate::lock::{ConstInit, RawLock, RawTimedLock, RawTryLock};

/// A lock that provides mutually exclusive data access that is compatible with
/// [`lock_api`](https://crates.io/crates/lock_api).
pub type Mutex<T, L> = lock_api::Mutex<Raw<L>, T>;

/// A guard that provides mutable data access that is compatible with
/// [`lock_api`](https://crates.io/crates/lock_api).
pub type MutexGuard<'a, T, L> = lock_api::MutexGuard<'a, Raw<L>, T>;

/// Adapts a lock of this crate to the [`RawMutex`] interface.
///
/// [`RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
pub struct Raw<L: RawLock> {
    lock: L,
    held: UnsafeCell<Option<L::Token>>,
}

// SAFETY: The token slot is only written by the lock holder, either right
// after acquiring or right before releasing, so accesses never overlap.
unsafe impl<L: RawLock> Sync for Raw<L> where L::Token: Send {}

impl<L: RawLock> Raw<L> {
    /// Stores the token of a successful acquisition.
    fn hold(&self, token: L::Token) {
        // SAFETY: The caller just acquired the lock, no other thread touches
        // the slot until it is released.
        let held = unsafe { &mut *self.held.get() };
        debug_assert!(held.is_none(), "token slot of an acquired lock is taken");
        *held = Some(token);
    }
}

impl<L: RawLock> Debug for Raw<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raw").finish_non_exhaustive()
    }
}

// SAFETY: Mutual exclusion is provided by the wrapped lock, and the token of
// each acquisition is the one handed back on release.
unsafe impl<L> RawMutex for Raw<L>
where
    L: RawTryLock + ConstInit,
    L::Token: Send,
{
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self { lock: L::INIT, held: UnsafeCell::new(None) };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        self.hold(self.lock.lock());
    }

    fn try_lock(&self) -> bool {
        self.lock.try_lock().map(|token| self.hold(token)).is_some()
    }

    /// # Panics
    ///
    /// Panics if the lock is not held.
    unsafe fn unlock(&self) {
        // SAFETY: The caller holds the lock, so it owns the token slot.
        let Some(token) = (unsafe { &mut *self.held.get() }).take() else {
            panic!("unlock of an unheld lock");
        };
        // SAFETY: The token was returned by this same lock.
        unsafe { self.lock.unlock(token) }
    }

    fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

// SAFETY: Same as `RawMutex`, a failed attempt leaves the slot untouched.
unsafe impl<L> RawMutexTimed for Raw<L>
where
    L: RawTimedLock + RawTryLock + ConstInit,
    L::Token: Send,
{
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_for(&self, timeout: Duration) -> bool {
        self.lock.try_lock_for(timeout).map(|token| self.hold(token)).is_ok()
    }

    fn try_lock_until(&self, deadline: Instant) -> bool {
        self.lock.try_lock_until(deadline).map(|token| self.hold(token)).is_ok()
    }
}

/// Aliases over locks that implement the [`Spin`] relax policy.
///
/// [`Spin`]: crate::relax::Spin
pub mod spins {
    use crate::composite::{CompositeLock, FastPathLock};
    use crate::relax::Spin;
    use crate::spin::TtasLock;
    use crate::timeout::TimeoutLock;

    /// A `lock_api` mutex over a [`TtasLock`].
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::lock_api::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// *mutex.lock() += 1;
    /// assert_eq!(mutex.into_inner(), 1);
    /// ```
    pub type Mutex<T> = super::Mutex<T, TtasLock<Spin>>;

    /// A `lock_api` mutex over a [`TimeoutLock`].
    pub type TimeoutMutex<T> = super::Mutex<T, TimeoutLock<Spin>>;

    /// A `lock_api` mutex over a [`CompositeLock`].
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use compositelock::lock_api::spins::CompositeMutex;
    ///
    /// let mutex = CompositeMutex::new(0);
    /// let guard = mutex.lock();
    /// assert!(mutex.try_lock_for(Duration::from_millis(1)).is_none());
    /// drop(guard);
    /// assert!(mutex.try_lock_for(Duration::from_millis(1)).is_some());
    /// ```
    pub type CompositeMutex<T> = super::Mutex<T, CompositeLock<Spin>>;

    /// A `lock_api` mutex over a [`FastPathLock`].
    pub type FastPathMutex<T> = super::Mutex<T, FastPathLock<Spin>>;
}

/// Aliases over locks that implement the [`Yield`] relax policy.
///
/// [`Yield`]: crate::relax::Yield
pub mod yields {
    use crate::composite::{CompositeLock, FastPathLock};
    use crate::relax::Yield;
    use crate::spin::TtasLock;
    use crate::timeout::TimeoutLock;

    /// A `lock_api` mutex over a [`TtasLock`].
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::lock_api::yields::Mutex;
    ///
    /// static COUNTER: Mutex<u32> = Mutex::new(0);
    /// *COUNTER.lock() += 1;
    /// assert_eq!(*COUNTER.lock(), 1);
    /// ```
    pub type Mutex<T> = super::Mutex<T, TtasLock<Yield>>;

    /// A `lock_api` mutex over a [`TimeoutLock`].
    pub type TimeoutMutex<T> = super::Mutex<T, TimeoutLock<Yield>>;

    /// A `lock_api` mutex over a [`CompositeLock`].
    pub type CompositeMutex<T> = super::Mutex<T, CompositeLock<Yield>>;

    /// A `lock_api` mutex over a [`FastPathLock`].
    pub type FastPathMutex<T> = super::Mutex<T, FastPathLock<Yield>>;
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::yields::{CompositeMutex, FastPathMutex, Mutex, TimeoutMutex};

    #[test]
    fn lock_and_unlock() {
        let mutex = Mutex::new(1);
        *mutex.lock() += 1;
        assert!(!mutex.is_locked());
        assert_eq!(mutex.into_inner(), 2);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = CompositeMutex::new(());
        let guard = mutex.lock();
        assert!(mutex.is_locked());
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn timed_lock_times_out() {
        let mutex = TimeoutMutex::new(());
        let _guard = mutex.lock();
        assert!(mutex.try_lock_for(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn fast_path_guard_releases() {
        let mutex = FastPathMutex::new(0);
        for _ in 0..10 {
            *mutex.try_lock_for(Duration::from_secs(1)).unwrap() += 1;
        }
        assert_eq!(*mutex.lock(), 10);
    }
}
