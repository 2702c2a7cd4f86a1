//! CLH style queue lock with bounded waiting.
//!
//! Like the CLH lock, waiters form an implicit queue by swapping their node
//! into a shared tail and waiting on their predecessor. Unlike it, a waiter
//! may abandon its position once a deadline passes, without blocking the
//! threads queued behind it. A node's only field is a link to its
//! predecessor, which doubles as its state:
//!
//! - null: the owner is waiting for, or holding, the lock;
//! - the `AVAILABLE` marker: the owner released the lock;
//! - any other node: the owner gave up, and that node is where it was
//!   waiting. Its successor skips the abandoned node and waits there instead.
//!
//! An abandoning thread that is still the tail simply swings the tail back to
//! its predecessor, as if it never enqueued. If that predecessor was released
//! in the meantime, it stays at the tail until the next attempt consumes it.
//!
//! Nodes are heap allocated per attempt and freed by exactly one thread: the
//! successor that consumes them (skipping an abandoned node, or acquiring from
//! a released one), or their owner if nobody ever enqueued behind them.
//!
//! This lock is generic over the relax policy. User may choose a policy as
//! long as it implements the [`Relax`] trait. The following modules provide
//! type aliases for [`Mutex`] associated with a relax policy.
//!
//! [`Mutex`]: crate::Mutex
//! [`Relax`]: crate::relax::Relax

use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::cfg::atomic::AtomicPtr;
use crate::error::AcquisitionTimeout;
use crate::lock::{ConstInit, RawLock, RawTimedLock, RawTryLock};
use crate::relax::Relax;

/// How long a blocking [`lock`] call waits in the queue before it gives up
/// its position and sleeps.
///
/// [`lock`]: RawLock::lock
pub const PATIENCE: Duration = Duration::from_micros(100);

/// How long a blocking [`lock`] call sleeps between bounded attempts.
///
/// [`lock`]: RawLock::lock
pub const RETRY_SLEEP: Duration = Duration::from_millis(1);

struct Node {
    pred: AtomicPtr<Node>,
}

impl Node {
    fn alloc() -> *mut Self {
        Box::into_raw(Box::new(Self { pred: AtomicPtr::new(ptr::null_mut()) }))
    }

    /// Frees a node allocated by [`Node::alloc`].
    ///
    /// # Safety
    ///
    /// The caller must be the unique owner of `node`.
    unsafe fn free(node: *mut Self) {
        // SAFETY: Caller guarantees unique ownership.
        drop(unsafe { Box::from_raw(node) });
    }
}

static AVAILABLE_MARKER: u8 = 0;

/// The marker a releasing owner links its node to. It is never dereferenced.
fn available() -> *mut Node {
    ptr::addr_of!(AVAILABLE_MARKER).cast_mut().cast()
}

/// A queue lock whose waiters can time out.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use compositelock::timeout::TimeoutLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// let mutex = Mutex::<_, TimeoutLock<Spin>>::new(0);
/// let guard = mutex.lock();
/// std::thread::scope(|s| {
///     let waiter = s.spawn(|| mutex.try_lock_for(Duration::from_millis(5)).is_err());
///     assert!(waiter.join().unwrap());
/// });
/// drop(guard);
/// *mutex.try_lock_for(Duration::from_millis(5)).unwrap() += 1;
/// assert_eq!(mutex.into_inner(), 1);
/// ```
pub struct TimeoutLock<R> {
    tail: AtomicPtr<Node>,
    marker: PhantomData<fn() -> R>,
}

/// The queue node held by a [`TimeoutLock`] acquisition.
#[must_use]
pub struct TimeoutToken {
    node: NonNull<Node>,
}

// SAFETY: The node is heap allocated, a release may happen on any thread.
unsafe impl Send for TimeoutToken {}
// SAFETY: No method of the token touches the node.
unsafe impl Sync for TimeoutToken {}

impl TimeoutToken {
    fn new(node: *mut Node) -> Self {
        // SAFETY: Nodes come from `Box::into_raw`, never null.
        Self { node: unsafe { NonNull::new_unchecked(node) } }
    }
}

impl Debug for TimeoutToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutToken").finish_non_exhaustive()
    }
}

impl<R> TimeoutLock<R> {
    /// Creates a new, unlocked lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { tail: AtomicPtr::new(ptr::null_mut()), marker: PhantomData }
    }

    /// Creates a new, unlocked lock (loom, non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new() -> Self {
        Self { tail: AtomicPtr::new(ptr::null_mut()), marker: PhantomData }
    }
}

impl<R> Default for TimeoutLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ConstInit for TimeoutLock<R> {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

impl<R> Debug for TimeoutLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let queued = !self.tail.load(Relaxed).is_null();
        f.debug_struct("TimeoutLock").field("queued", &queued).finish()
    }
}

impl<R> Drop for TimeoutLock<R> {
    fn drop(&mut self) {
        // Released and abandoned nodes left behind after their last waiter
        // went away are still reachable from the tail.
        let mut node = self.tail.load(Relaxed);
        while !node.is_null() && node != available() {
            // SAFETY: With `&mut self` nobody else can reach the queue.
            let pred = unsafe { (*node).pred.load(Relaxed) };
            // SAFETY: Same as above, the lock owns every reachable node.
            unsafe { Node::free(node) };
            node = pred;
        }
    }
}

impl<R: Relax> TimeoutLock<R> {
    /// Enqueues a new node and waits for the lock until `deadline`.
    fn acquire(&self, deadline: Instant) -> Result<TimeoutToken, AcquisitionTimeout> {
        let node = Node::alloc();
        let mut pred = self.tail.swap(node, AcqRel);
        if pred.is_null() {
            return Ok(TimeoutToken::new(node));
        }
        let mut relax = R::new();
        loop {
            // SAFETY: This thread is the only successor of `pred`, nobody
            // else frees it.
            let pred_pred = unsafe { (*pred).pred.load(Acquire) };
            if pred_pred == available() {
                // SAFETY: The owner released it, and we consume it.
                unsafe { Node::free(pred) };
                return Ok(TimeoutToken::new(node));
            }
            if !pred_pred.is_null() {
                // The predecessor gave up, wait where it was waiting.
                // SAFETY: The owner abandoned it, and we consume it.
                unsafe { Node::free(pred) };
                pred = pred_pred;
                continue;
            }
            if Instant::now() >= deadline {
                break;
            }
            relax.relax();
        }
        let detached = self.tail.compare_exchange(node, pred, AcqRel, Relaxed).is_ok();
        if detached {
            // SAFETY: No successor ever saw our node.
            unsafe { Node::free(node) };
        } else {
            // SAFETY: Our node stays alive until the successor consumes it,
            // which can only happen after this store.
            unsafe { (*node).pred.store(pred, Release) };
        }
        trace!(detached, "abandoned timeout lock queue position");
        Err(AcquisitionTimeout)
    }
}

// SAFETY: A thread only enters once its predecessor linked its node to the
// `AVAILABLE` marker with Release, which the successor loads with Acquire, or
// when the queue was empty.
unsafe impl<R: Relax> RawLock for TimeoutLock<R> {
    type Token = TimeoutToken;

    fn lock(&self) -> TimeoutToken {
        loop {
            match self.acquire(Instant::now() + PATIENCE) {
                Ok(token) => return token,
                Err(AcquisitionTimeout) => {
                    debug!(sleep = ?RETRY_SLEEP, "timeout lock busy, sleeping before retry");
                    thread::sleep(RETRY_SLEEP);
                }
            }
        }
    }

    unsafe fn unlock(&self, token: TimeoutToken) {
        let node = token.node.as_ptr();
        // SAFETY: The held node is alive until its successor consumes it.
        debug_assert!(unsafe { (*node).pred.load(Relaxed) }.is_null(), "unlock of an unheld node");
        if self.tail.compare_exchange(node, ptr::null_mut(), Release, Relaxed).is_ok() {
            // SAFETY: Still the tail, so no successor ever saw our node.
            unsafe { Node::free(node) };
        } else {
            // SAFETY: Same as above, the successor frees it after this store.
            unsafe { (*node).pred.store(available(), Release) };
        }
    }
}

// SAFETY: Same as `RawLock`, a try is an attempt that never waits.
unsafe impl<R: Relax> RawTryLock for TimeoutLock<R> {
    /// Attempts to acquire the lock without waiting.
    ///
    /// The attempt still enqueues, so that it can consume a released node
    /// left at the tail, and skip abandoned ones. It gives up as soon as it
    /// meets a waiting or holding predecessor.
    fn try_lock(&self) -> Option<TimeoutToken> {
        self.acquire(Instant::now()).ok()
    }

    /// Returns `true` if the lock is held or waited for.
    ///
    /// A released node is left at the tail when the waiter behind it gives
    /// up right as the lock is handed over. Such a node is taken over and
    /// released again here, rather than reported as held.
    fn is_locked(&self) -> bool {
        if self.tail.load(Relaxed).is_null() {
            return false;
        }
        let Some(token) = self.try_lock() else { return true };
        // SAFETY: The token was just returned by this lock.
        unsafe { self.unlock(token) };
        false
    }
}

// SAFETY: Same as `RawLock`, a failed attempt always leaves its node either
// detached or linked for its successor to skip.
unsafe impl<R: Relax> RawTimedLock for TimeoutLock<R> {
    fn try_lock_until(&self, deadline: Instant) -> Result<TimeoutToken, AcquisitionTimeout> {
        self.acquire(deadline)
    }
}

/// A timeout lock that implements a `spin` relax policy.
///
/// During lock contention, this lock spins while signaling the processor that
/// it is running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`Mutex`] over a [`TimeoutLock`] that implements the [`Spin`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use compositelock::timeout::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.try_lock_for(Duration::from_millis(1)).map(|data| *data);
    /// assert_eq!(value, Ok(0));
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`TimeoutLock`]: super::TimeoutLock
    pub type Mutex<T> = crate::Mutex<T, super::TimeoutLock<Spin>>;
}

/// A timeout lock that implements a `yield` relax policy.
///
/// During lock contention, this lock will yield the current time slice to the
/// OS scheduler.
pub mod yields {
    use crate::relax::Yield;

    /// A [`Mutex`] over a [`TimeoutLock`] that implements the [`Yield`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::timeout::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`TimeoutLock`]: super::TimeoutLock
    pub type Mutex<T> = crate::Mutex<T, super::TimeoutLock<Yield>>;
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::atomic::Ordering::Relaxed;
    use std::time::{Duration, Instant};

    use super::{available, Node, TimeoutLock};
    use crate::lock::{RawLock, RawTimedLock, RawTryLock};
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = TimeoutLock<Yield>;

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
        tests::fifo_order_timed::<Lock>(4);
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
    fn test_lock_arc_nested() {
        tests::test_lock_arc_nested::<Lock, Lock>();
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
    fn uncontended_release_empties_queue() {
        let lock = Lock::new();
        let token = lock.lock();
        assert!(lock.is_locked());
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
        assert!(lock.tail.load(Relaxed).is_null());
    }

    #[test]
    fn abandoned_tail_detaches() {
        let lock = Lock::new();
        let holder = lock.lock();
        let tail = lock.tail.load(Relaxed);
        let result = std::thread::scope(|s| {
            s.spawn(|| lock.try_lock_until(Instant::now() + Duration::from_millis(1)).map(drop))
                .join()
                .unwrap()
        });
        assert!(result.is_err());
        // The waiter was the tail, so it swung it back to the holder.
        assert_eq!(lock.tail.load(Relaxed), tail);
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(holder) };
        assert!(!lock.is_locked());
    }

    #[test]
    fn abandoned_middle_is_skipped() {
        let lock = Lock::new();
        let holder = lock.lock();
        std::thread::scope(|s| {
            let quitter = s.spawn(|| {
                lock.try_lock_until(Instant::now() + Duration::from_millis(50)).map(drop)
            });
            std::thread::sleep(Duration::from_millis(10));
            let stayer = s.spawn(|| {
                let token = lock.try_lock_until(Instant::now() + Duration::from_secs(30));
                // SAFETY: The token was returned by this lock.
                token.map(|token| unsafe { lock.unlock(token) })
            });
            assert!(quitter.join().unwrap().is_err());
            // SAFETY: The token was returned by this lock.
            unsafe { lock.unlock(holder) };
            assert!(stayer.join().unwrap().is_ok());
        });
        assert!(!lock.is_locked());
    }

    /// Leaves a released node at the tail, as when the only waiter gives up
    /// and detaches right after the holder handed the lock over.
    fn release_behind_detached_waiter(lock: &Lock) {
        let holder = lock.lock();
        let waiter = Node::alloc();
        let held = lock.tail.swap(waiter, Relaxed);
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(holder) };
        // SAFETY: The holder's node is only freed by its successor.
        assert_eq!(unsafe { (*held).pred.load(Relaxed) }, available());
        assert_eq!(lock.tail.compare_exchange(waiter, held, Relaxed, Relaxed), Ok(waiter));
        // SAFETY: Nobody enqueued behind the detached waiter.
        unsafe { Node::free(waiter) };
    }

    #[test]
    fn try_lock_takes_over_released_tail() {
        let lock = Lock::new();
        release_behind_detached_waiter(&lock);
        let token = lock.try_lock().expect("released tail must not block try_lock");
        assert!(lock.is_locked());
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
        assert!(lock.tail.load(Relaxed).is_null());
    }

    #[test]
    fn released_tail_is_not_locked() {
        let lock = Lock::new();
        release_behind_detached_waiter(&lock);
        assert!(!lock.is_locked());
        assert!(lock.tail.load(Relaxed).is_null());
        let token = lock.try_lock().expect("lock must be free");
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
    }

    #[test]
    fn failed_try_lock_leaves_holder_at_tail() {
        let lock = Lock::new();
        let holder = lock.lock();
        let tail = lock.tail.load(Relaxed);
        assert!(lock.try_lock().is_none());
        assert!(lock.is_locked());
        assert_eq!(lock.tail.load(Relaxed), tail);
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(holder) };
        assert!(!lock.is_locked());
    }

    #[test]
    fn drop_frees_forgotten_holder() {
        let lock = Lock::new();
        core::mem::forget(lock.lock());
        assert!(lock.is_locked());
        drop(lock);
    }

    #[test]
    fn available_marker_is_not_a_node() {
        let lock = Lock::new();
        let token = lock.lock();
        assert_ne!(token.node.as_ptr(), available());
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type Lock = super::TimeoutLock<Yield>;

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Lock>();
    }
}
