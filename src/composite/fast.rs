use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::time::Instant;

use tracing::trace;

use super::{CompositeLock, CompositeToken};
use crate::error::AcquisitionTimeout;
use crate::lock::{ConstInit, RawLock, RawTimedLock, RawTryLock};
use crate::relax::Relax;
use crate::stamped::Stamped;

/// A composite lock with an uncontended fast path.
///
/// When nobody is queued, a thread takes the lock by setting the fast path
/// flag of the tail's stamp, without claiming a node at all. While the flag is
/// set, other threads fall back to the regular queue. A queued thread that
/// reaches the head of the queue still waits for the flag to clear before it
/// enters, bounded by its own deadline: if the fast path holder takes longer,
/// the queued thread gives its turn up and the attempt fails.
///
/// A fast path acquirer never overtakes a thread that is already queued.
///
/// # Examples
///
/// ```
/// use compositelock::composite::FastPathLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// let mutex = Mutex::<_, FastPathLock<Spin>>::new(0);
/// *mutex.lock() += 1;
/// assert!(!mutex.is_locked());
/// assert_eq!(mutex.into_inner(), 1);
/// ```
pub struct FastPathLock<R> {
    inner: CompositeLock<R>,
}

/// How a [`FastPathLock`] acquisition got in.
#[derive(Debug)]
#[must_use]
pub enum FastPathToken {
    /// Through the fast path, no node is held.
    Fast,
    /// Through the queue.
    Queued(CompositeToken),
}

impl<R> FastPathLock<R> {
    /// Creates a new, unlocked lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { inner: CompositeLock::new() }
    }

    /// Creates a new, unlocked lock (loom, non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new() -> Self {
        Self { inner: CompositeLock::new() }
    }

    /// Attempts to take the lock by setting the fast path flag.
    fn fast_lock(&self) -> bool {
        // Released or abandoned nodes left at the tail do not count as queued.
        let Some(tail) = self.inner.drain_idle_tail() else { return false };
        let new = Stamped::new(None, tail.stamp().next().with_fast_path());
        self.inner.tail.compare_exchange(tail, new, AcqRel, Relaxed).is_ok()
    }

    /// Clears the fast path flag. Queued threads may have enqueued meanwhile.
    fn fast_unlock(&self) {
        let mut tail = self.inner.tail.load(Relaxed);
        loop {
            debug_assert!(tail.stamp().is_fast_path(), "unlock of an unheld fast path");
            let new = Stamped::new(tail.payload(), tail.stamp().next().without_fast_path());
            match self.inner.tail.compare_exchange_weak(tail, new, Release, Relaxed) {
                Ok(_) => return,
                Err(actual) => tail = actual,
            }
        }
    }
}

impl<R: Relax> FastPathLock<R> {
    fn acquire(&self, deadline: Instant) -> Result<FastPathToken, AcquisitionTimeout> {
        if self.fast_lock() {
            return Ok(FastPathToken::Fast);
        }
        trace!("fast path busy, falling back to the queue");
        let token = self.inner.acquire(deadline)?;
        let mut relax = R::new();
        while self.inner.tail.load(Acquire).stamp().is_fast_path() {
            if Instant::now() >= deadline {
                // Let the next queued thread have its turn.
                self.inner.release(token.index);
                trace!("fast path holder outlived the deadline");
                return Err(AcquisitionTimeout);
            }
            relax.relax();
        }
        Ok(FastPathToken::Queued(token))
    }
}

impl<R> Default for FastPathLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ConstInit for FastPathLock<R> {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

impl<R> Debug for FastPathLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastPathLock").field("inner", &self.inner).finish()
    }
}

// SAFETY: The fast path is only taken with an empty queue and no other fast
// path holder, and queued holders wait for the fast path holder to leave.
unsafe impl<R: Relax> RawLock for FastPathLock<R> {
    type Token = FastPathToken;

    fn lock(&self) -> FastPathToken {
        self.inner.lock_retrying(|deadline| self.acquire(deadline))
    }

    unsafe fn unlock(&self, token: FastPathToken) {
        match token {
            FastPathToken::Fast => self.fast_unlock(),
            FastPathToken::Queued(token) => self.inner.release(token.index),
        }
    }
}

// SAFETY: Only the fast path is attempted.
unsafe impl<R: Relax> RawTryLock for FastPathLock<R> {
    fn try_lock(&self) -> Option<FastPathToken> {
        self.fast_lock().then_some(FastPathToken::Fast)
    }

    fn is_locked(&self) -> bool {
        self.inner.is_held()
    }
}

// SAFETY: Same as `CompositeLock`, and a queued attempt that times out while
// waiting for the fast path holder releases its node to its successor.
unsafe impl<R: Relax> RawTimedLock for FastPathLock<R> {
    fn try_lock_until(&self, deadline: Instant) -> Result<FastPathToken, AcquisitionTimeout> {
        self.acquire(deadline)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering::Relaxed;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{FastPathLock, FastPathToken};
    use crate::composite::test::assert_no_node_lost;
    use crate::composite::POOL_SIZE;
    use crate::lock::{RawLock, RawTimedLock, RawTryLock};
    use crate::relax::Yield;
    use crate::test::tests;
    use crate::Mutex;

    type Lock = FastPathLock<Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<Lock>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<Lock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<Lock>();
    }

    #[test]
    fn lots_and_lots_timed_lock() {
        tests::lots_and_lots_timed_lock::<Lock>();
    }

    #[test]
    fn mutual_exclusion() {
        tests::mutual_exclusion::<Lock>();
    }

    #[test]
    fn no_lost_updates() {
        tests::no_lost_updates::<Lock>();
    }

    #[test]
    fn fifo_order() {
        // The holder takes the fast path, so every node is left for waiters.
        tests::fifo_order_timed::<Lock>(POOL_SIZE);
    }

    #[test]
    fn bounded_wait() {
        tests::bounded_wait::<Lock>();
    }

    #[test]
    fn timeouts_leave_lock_usable() {
        tests::timeouts_leave_lock_usable::<Lock>();
    }

    #[test]
    fn smoke() {
        tests::smoke::<Lock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<Lock>();
    }

    #[test]
    fn test_mutex_debug() {
        tests::test_mutex_debug::<Lock>();
    }

    #[test]
    fn test_mutex_from() {
        tests::test_mutex_from::<Lock>();
    }

    #[test]
    fn test_into_inner() {
        tests::test_into_inner::<Lock>();
    }

    #[test]
    fn test_lock_arc_access_in_unwind() {
        tests::test_lock_arc_access_in_unwind::<Lock>();
    }

    #[test]
    fn test_lock_released_on_panic() {
        tests::test_lock_released_on_panic::<Lock>();
    }

    #[test]
    fn test_lock_unsized() {
        tests::test_lock_unsized::<Lock>();
    }

    #[test]
    fn uncontended_takes_fast_path() {
        let mutex = Mutex::<u32, Lock>::new(0);
        for _ in 0..10 {
            let guard = mutex.lock();
            assert!(matches!(guard.token(), FastPathToken::Fast));
            assert!(mutex.is_locked());
        }
        assert!(!mutex.is_locked());
        assert_no_node_lost(&mutex.raw().inner);
    }

    #[test]
    fn fast_path_resumes_after_queued_release() {
        let lock = Lock::new();
        let fast = lock.lock();
        assert!(matches!(fast, FastPathToken::Fast));
        let queued = thread::scope(|s| {
            let waiter = s.spawn(|| lock.try_lock_for(Duration::from_secs(5)).unwrap());
            thread::sleep(Duration::from_millis(5));
            // SAFETY: The token was returned by this lock.
            unsafe { lock.unlock(fast) };
            waiter.join().unwrap()
        });
        assert!(matches!(queued, FastPathToken::Queued(_)));
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(queued) };
        // The released tail is recycled by the next fast path acquisition.
        let again = lock.try_lock().expect("fast path available again");
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(again) };
        assert_no_node_lost(&lock.inner);
    }

    #[test]
    fn queued_waiter_times_out_behind_fast_holder() {
        let lock = Lock::new();
        let fast = lock.lock();
        thread::scope(|s| {
            let waiter = s.spawn(|| lock.try_lock_for(Duration::from_millis(10)).map(drop));
            assert!(waiter.join().unwrap().is_err());
        });
        assert!(lock.is_locked());
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(fast) };
        let token = lock.try_lock_for(Duration::from_secs(5)).unwrap();
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(token) };
        assert_no_node_lost(&lock.inner);
    }

    #[test]
    fn fast_path_resumes_after_abandoned_waiter() {
        let lock = Lock::new();
        let holder = FastPathToken::Queued(lock.inner.lock());
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                lock.try_lock_until(Instant::now() + Duration::from_millis(5)).map(drop)
            });
            assert!(waiter.join().unwrap().is_err());
        });
        assert!(lock.is_locked());
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(holder) };
        assert!(!lock.is_locked());
        let token = lock.try_lock().expect("fast path available again");
        assert!(matches!(token, FastPathToken::Fast));
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
        assert_no_node_lost(&lock.inner);
    }

    #[test]
    fn alternating_phases_never_overlap() {
        let mutex = Mutex::<u32, Lock>::new(0);
        let inside = AtomicUsize::new(0);
        let enter = |data: &mut u32| {
            assert_eq!(inside.fetch_add(1, Relaxed), 0);
            *data += 1;
            inside.fetch_sub(1, Relaxed);
        };
        for _ in 0..5 {
            // Uncontended.
            for _ in 0..100 {
                mutex.lock_then(enter);
            }
            // Contended.
            thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..100 {
                            mutex.lock_then(enter);
                        }
                    });
                }
            });
        }
        assert_eq!(mutex.into_inner(), 5 * 500);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type Lock = super::FastPathLock<Yield>;

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Lock>();
    }
}
