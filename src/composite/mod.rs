//! Composite queue lock, and its fast path variant.
//!
//! The composite lock merges the queue and the timeout designs: a small, fixed
//! pool of [`POOL_SIZE`] reusable nodes forms a virtual queue, and only threads
//! holding one of them may spin in that queue. Everyone else backs off.
//!
//! An acquisition attempt runs three phases, all bounded by the same deadline:
//!
//! 1. Claim a node picked at random from the pool. A free node is simply
//!    taken. A released or abandoned node is recycled only if it is the
//!    current tail, by swinging the tail back past it. Any other node means
//!    contention, and the thread backs off before picking again.
//! 2. Splice the node into the queue by swapping it in as the new tail.
//! 3. Wait until the predecessor releases the lock, skipping over any
//!    predecessor that gave up in the meantime.
//!
//! A thread that runs out of time in phase 3 leaves its node behind marked as
//! abandoned, linked to its predecessor, for either its successor or a thread
//! claiming that node to clean up. Nodes are never lost: each one is either
//! free or reachable from the tail.
//!
//! The tail is a versioned reference (see [`stamped`]), since node indices are
//! recycled all the time, and every update of it advances the stamp.
//!
//! [`FastPathLock`] adds an uncontended bypass on top of this lock. See its
//! documentation for details.
//!
//! These locks are generic over the relax policy. User may choose a policy as
//! long as it implements the [`Relax`] trait. The following modules provide
//! type aliases for [`Mutex`] associated with a relax policy.
//!
//! [`stamped`]: crate::stamped
//! [`Mutex`]: crate::Mutex
//! [`Relax`]: crate::relax::Relax

use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, trace};

use crate::backoff::Backoff;
use crate::cfg::atomic::{AtomicU8, AtomicUsize};
use crate::error::AcquisitionTimeout;
use crate::lock::{ConstInit, RawLock, RawTimedLock, RawTryLock};
use crate::relax::Relax;
use crate::stamped::{AtomicStamped, Stamped};

mod fast;
pub use fast::{FastPathLock, FastPathToken};

/// The number of nodes of the pool.
pub const POOL_SIZE: usize = 4;

/// The initial upper bound of the backoff delay while claiming a node.
pub const MIN_BACKOFF: Duration = Duration::from_micros(10);

/// The cap of the backoff delay while claiming a node.
pub const MAX_BACKOFF: Duration = Duration::from_micros(100);

/// How long a blocking [`lock`] call tries before it sleeps.
///
/// [`lock`]: RawLock::lock
pub const PATIENCE: Duration = Duration::from_micros(500);

/// How long a blocking [`lock`] call sleeps between bounded attempts.
///
/// [`lock`]: RawLock::lock
pub const RETRY_SLEEP: Duration = Duration::from_millis(1);

/// Not claimed by anyone.
const FREE: u8 = 0;
/// Claimed, the owner is waiting for or holding the lock.
const WAITING: u8 = 1;
/// The owner released the lock, the successor frees it.
const RELEASED: u8 = 2;
/// The owner gave up, `pred` is where it was waiting.
const ABORTED: u8 = 3;

/// A node of the pool.
struct Node {
    state: AtomicU8,
    /// The predecessor of an abandoned node, as `index + 1`, or zero.
    pred: AtomicUsize,
}

impl Node {
    #[cfg(not(all(loom, test)))]
    const fn new() -> Self {
        Self { state: AtomicU8::new(FREE), pred: AtomicUsize::new(0) }
    }

    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    fn new() -> Self {
        Self { state: AtomicU8::new(FREE), pred: AtomicUsize::new(0) }
    }

    fn pred(&self) -> Option<u32> {
        let pred = self.pred.load(Relaxed);
        #[allow(clippy::cast_possible_truncation)]
        pred.checked_sub(1).map(|index| index as u32)
    }

    fn set_pred(&self, pred: Option<u32>) {
        self.pred.store(pred.map_or(0, |index| index as usize + 1), Relaxed);
    }
}

/// Which phase of an acquisition attempt ran out of time.
#[derive(Clone, Copy, Debug)]
enum Phase {
    Claim,
    Splice,
    Wait,
}

/// A composite queue lock with bounded waiting.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use compositelock::composite::CompositeLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// static MUTEX: Mutex<u64, CompositeLock<Spin>> = Mutex::const_new(0);
///
/// std::thread::scope(|s| {
///     for _ in 0..4 {
///         s.spawn(|| *MUTEX.lock() += 1);
///     }
/// });
/// let value = MUTEX.try_lock_for(Duration::from_secs(1)).map(|data| *data);
/// assert_eq!(value, Ok(4));
/// ```
pub struct CompositeLock<R> {
    tail: AtomicStamped,
    pool: [Node; POOL_SIZE],
    marker: PhantomData<fn() -> R>,
}

/// The pool node held by a [`CompositeLock`] acquisition.
#[derive(Debug)]
#[must_use]
pub struct CompositeToken {
    index: u32,
}

impl<R> CompositeLock<R> {
    /// Creates a new, unlocked lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        const NODE: Node = Node::new();
        let tail = AtomicStamped::new(Stamped::EMPTY);
        Self { tail, pool: [NODE; POOL_SIZE], marker: PhantomData }
    }

    /// Creates a new, unlocked lock (loom, non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new() -> Self {
        let tail = AtomicStamped::new(Stamped::EMPTY);
        let pool = core::array::from_fn(|_| Node::new());
        Self { tail, pool, marker: PhantomData }
    }

    fn node(&self, index: u32) -> &Node {
        &self.pool[index as usize]
    }

    /// Takes the first free node of the pool, if any.
    fn claim_free(&self) -> Option<u32> {
        (0..POOL_SIZE as u32).find(|&index| {
            let state = &self.node(index).state;
            state.compare_exchange(FREE, WAITING, Acquire, Relaxed).is_ok()
        })
    }

    /// Unwinds released and abandoned nodes off the tail of an idle queue,
    /// freeing them.
    ///
    /// Returns the empty tail, or `None` if the lock is held or has waiters,
    /// or if the tail kept moving under contention.
    fn drain_idle_tail(&self) -> Option<Stamped> {
        // Each unwound node shortens the queue, which holds at most the pool.
        for _ in 0..=POOL_SIZE {
            let tail = self.tail.load(Acquire);
            if tail.stamp().is_fast_path() {
                return None;
            }
            let Some(index) = tail.payload() else { return Some(tail) };
            let node = self.node(index);
            let pred = match node.state.load(Acquire) {
                RELEASED => None,
                ABORTED => node.pred(),
                _ => return None,
            };
            let new = Stamped::new(pred, tail.stamp().next());
            if self.tail.compare_exchange(tail, new, AcqRel, Relaxed).is_ok() {
                trace!(node = index, "unwound idle composite tail node");
                node.state.store(FREE, Release);
            }
        }
        None
    }

    /// Returns `true` if the lock is held, or about to be.
    ///
    /// Abandoned nodes at the tail are looked through, down to the node of
    /// the last thread that did not give up.
    fn is_held(&self) -> bool {
        let tail = self.tail.load(Relaxed);
        if tail.stamp().is_fast_path() {
            return true;
        }
        let mut next = tail.payload();
        for _ in 0..POOL_SIZE {
            let Some(index) = next else { return false };
            let node = self.node(index);
            match node.state.load(Relaxed) {
                ABORTED => next = node.pred(),
                WAITING => return true,
                _ => return false,
            }
        }
        // The chain only outgrows the pool while it is being rewritten.
        true
    }

    /// Marks the node as released, handing the lock over to its successor.
    fn release(&self, index: u32) {
        let prev = self.node(index).state.swap(RELEASED, Release);
        debug_assert_eq!(prev, WAITING, "unlock of an unheld node");
    }

    fn try_acquire(&self) -> Option<CompositeToken> {
        let tail = self.drain_idle_tail()?;
        let index = self.claim_free()?;
        let new = Stamped::new(Some(index), tail.stamp().next());
        match self.tail.compare_exchange(tail, new, AcqRel, Relaxed) {
            Ok(_) => Some(CompositeToken { index }),
            Err(_) => {
                self.node(index).state.store(FREE, Release);
                None
            }
        }
    }
}

impl<R: Relax> CompositeLock<R> {
    fn acquire(&self, deadline: Instant) -> Result<CompositeToken, AcquisitionTimeout> {
        let index = self.claim(deadline)?;
        let pred = self.splice(index, deadline)?;
        self.wait_for(index, pred, deadline)?;
        Ok(CompositeToken { index })
    }

    /// Claims a node of the pool, recycling it if it is an abandoned or a
    /// released tail.
    fn claim(&self, deadline: Instant) -> Result<u32, AcquisitionTimeout> {
        let mut backoff = Backoff::new(MIN_BACKOFF, MAX_BACKOFF);
        let mut rng = rand::thread_rng();
        loop {
            let index = rng.gen_range(0..POOL_SIZE as u32);
            let node = self.node(index);
            if node.state.compare_exchange(FREE, WAITING, Acquire, Relaxed).is_ok() {
                return Ok(index);
            }
            let tail = self.tail.load(Acquire);
            let state = node.state.load(Acquire);
            if matches!(state, ABORTED | RELEASED) && tail.payload() == Some(index) {
                let pred = if state == ABORTED { node.pred() } else { None };
                let new = Stamped::new(pred, tail.stamp().next());
                if self.tail.compare_exchange(tail, new, AcqRel, Relaxed).is_ok() {
                    trace!(node = index, aborted = state == ABORTED, "recycled composite tail node");
                    node.state.store(WAITING, Relaxed);
                    return Ok(index);
                }
            }
            backoff.backoff();
            if Instant::now() >= deadline {
                return Err(timed_out(Phase::Claim));
            }
        }
    }

    /// Swaps the claimed node in as the new tail, returning its predecessor.
    fn splice(&self, index: u32, deadline: Instant) -> Result<Option<u32>, AcquisitionTimeout> {
        loop {
            let tail = self.tail.load(Acquire);
            if Instant::now() >= deadline {
                self.node(index).state.store(FREE, Release);
                return Err(timed_out(Phase::Splice));
            }
            let new = Stamped::new(Some(index), tail.stamp().next());
            if self.tail.compare_exchange_weak(tail, new, AcqRel, Relaxed).is_ok() {
                return Ok(tail.payload());
            }
        }
    }

    /// Waits for the predecessor to release the lock.
    fn wait_for(
        &self,
        index: u32,
        mut pred: Option<u32>,
        deadline: Instant,
    ) -> Result<(), AcquisitionTimeout> {
        let mut relax = R::new();
        while let Some(pred_index) = pred {
            let pred_node = self.node(pred_index);
            match pred_node.state.load(Acquire) {
                RELEASED => {
                    pred_node.state.store(FREE, Release);
                    return Ok(());
                }
                ABORTED => {
                    pred = pred_node.pred();
                    pred_node.state.store(FREE, Release);
                    continue;
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                let node = self.node(index);
                node.set_pred(pred);
                node.state.store(ABORTED, Release);
                return Err(timed_out(Phase::Wait));
            }
            relax.relax();
        }
        Ok(())
    }

    /// Bounded attempts separated by coarse sleeps, until one succeeds.
    fn lock_retrying<T>(&self, f: impl Fn(Instant) -> Result<T, AcquisitionTimeout>) -> T {
        loop {
            match f(Instant::now() + PATIENCE) {
                Ok(token) => return token,
                Err(AcquisitionTimeout) => {
                    debug!(sleep = ?RETRY_SLEEP, "composite lock busy, sleeping before retry");
                    thread::sleep(RETRY_SLEEP);
                }
            }
        }
    }
}

fn timed_out(phase: Phase) -> AcquisitionTimeout {
    trace!(?phase, "composite lock attempt timed out");
    AcquisitionTimeout
}

impl<R> Default for CompositeLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ConstInit for CompositeLock<R> {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

impl<R> Debug for CompositeLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeLock").field("tail", &self.tail).finish_non_exhaustive()
    }
}

// SAFETY: A thread only holds the lock once its predecessor node was marked
// released with Release, which it loads with Acquire, or once it spliced into
// an empty queue whose last holder published its release the same way.
unsafe impl<R: Relax> RawLock for CompositeLock<R> {
    type Token = CompositeToken;

    fn lock(&self) -> CompositeToken {
        self.lock_retrying(|deadline| self.acquire(deadline))
    }

    unsafe fn unlock(&self, token: CompositeToken) {
        self.release(token.index);
    }
}

// SAFETY: A node is only spliced into an empty queue, whose last holder, if
// any, already released it.
unsafe impl<R: Relax> RawTryLock for CompositeLock<R> {
    fn try_lock(&self) -> Option<CompositeToken> {
        self.try_acquire()
    }

    fn is_locked(&self) -> bool {
        self.is_held()
    }
}

// SAFETY: A failed attempt leaves its node free, or abandoned in the queue for
// others to clean up.
unsafe impl<R: Relax> RawTimedLock for CompositeLock<R> {
    fn try_lock_until(&self, deadline: Instant) -> Result<CompositeToken, AcquisitionTimeout> {
        self.acquire(deadline)
    }
}

/// Composite locks that implement a `spin` relax policy.
///
/// During lock contention, these locks spin while signaling the processor
/// that they are running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`Mutex`] over a [`CompositeLock`] that implements the [`Spin`]
    /// relax policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::composite::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`CompositeLock`]: super::CompositeLock
    pub type Mutex<T> = crate::Mutex<T, super::CompositeLock<Spin>>;

    /// A fast path composite lock that implements a `spin` relax policy.
    pub mod fast {
        use crate::composite::FastPathLock;
        use crate::relax::Spin;

        /// A [`Mutex`] over a [`FastPathLock`] that implements the [`Spin`]
        /// relax policy.
        ///
        /// # Example
        ///
        /// ```
        /// use compositelock::composite::spins::fast::Mutex;
        ///
        /// let mutex = Mutex::new(0);
        /// let value = mutex.lock_then(|data| *data);
        /// assert_eq!(value, 0);
        /// ```
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, FastPathLock<Spin>>;
    }
}

/// Composite locks that implement a `yield` relax policy.
///
/// During lock contention, these locks will yield the current time slice to
/// the OS scheduler.
pub mod yields {
    use crate::relax::Yield;

    /// A [`Mutex`] over a [`CompositeLock`] that implements the [`Yield`]
    /// relax policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::composite::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`CompositeLock`]: super::CompositeLock
    pub type Mutex<T> = crate::Mutex<T, super::CompositeLock<Yield>>;

    /// A fast path composite lock that implements a `yield` relax policy.
    pub mod fast {
        use crate::composite::FastPathLock;
        use crate::relax::Yield;

        /// A [`Mutex`] over a [`FastPathLock`] that implements the [`Yield`]
        /// relax policy.
        ///
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, FastPathLock<Yield>>;
    }
}

#[cfg(all(not(loom), test))]
pub(crate) mod test {
    use std::sync::atomic::Ordering::Relaxed;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::{CompositeLock, ABORTED, FREE, POOL_SIZE, RELEASED, WAITING};
    use crate::lock::{RawLock, RawTimedLock, RawTryLock};
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = CompositeLock<Yield>;

    /// Asserts that every node of an idle lock is either free or reachable
    /// from the tail, through abandoned nodes down to a released one.
    pub fn assert_no_node_lost<R>(lock: &CompositeLock<R>) {
        let mut reachable = [false; POOL_SIZE];
        let mut next = lock.tail.load(Relaxed).payload();
        while let Some(index) = next {
            assert!(!reachable[index as usize], "cycle in the virtual queue");
            reachable[index as usize] = true;
            let node = lock.node(index);
            next = match node.state.load(Relaxed) {
                ABORTED => node.pred(),
                RELEASED => None,
                state => panic!("idle queue holds a node in state {state}"),
            };
        }
        for (index, node) in lock.pool.iter().enumerate() {
            let state = node.state.load(Relaxed);
            assert!(state == FREE || reachable[index], "node {index} lost in state {state}");
        }
    }

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
        // The holder and the waiters need one pool node each.
        tests::fifo_order_timed::<Lock>(POOL_SIZE - 1);
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
    fn test_guard_debug_display() {
        tests::test_guard_debug_display::<Lock>();
    }

    #[test]
    fn test_mutex_debug() {
        tests::test_mutex_debug::<Lock>();
    }

    #[test]
    fn test_mutex_default() {
        tests::test_mutex_default::<Lock>();
    }

    #[test]
    fn test_into_inner_drop() {
        tests::test_into_inner_drop::<Lock>();
    }

    #[test]
    fn test_get_mut() {
        tests::test_get_mut::<Lock>();
    }

    #[test]
    fn test_lock_arc_nested() {
        tests::test_lock_arc_nested::<Lock, Lock>();
    }

    #[test]
    fn test_acquire_more_than_one_lock() {
        tests::test_acquire_more_than_one_lock::<Lock>();
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
    fn release_leaves_node_at_tail() {
        let lock = Lock::new();
        let token = lock.lock();
        let index = token.index;
        assert_eq!(lock.node(index).state.load(Relaxed), WAITING);
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
        assert_eq!(lock.tail.load(Relaxed).payload(), Some(index));
        assert_eq!(lock.node(index).state.load(Relaxed), RELEASED);
        assert!(!lock.is_locked());
        assert_no_node_lost(&lock);
    }

    #[test]
    fn try_lock_recycles_released_tail() {
        let lock = Lock::new();
        let first = lock.lock();
        let index = first.index;
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(first) };
        let second = lock.try_lock().expect("released tail must be recycled");
        // The released node is either reused or back in the pool.
        let expected = if second.index == index { WAITING } else { FREE };
        assert_eq!(lock.node(index).state.load(Relaxed), expected);
        assert!(lock.try_lock().is_none());
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(second) };
        assert_no_node_lost(&lock);
    }

    #[test]
    fn abandoned_waiter_is_cleaned_up() {
        let lock = Lock::new();
        let holder = lock.lock();
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                lock.try_lock_until(Instant::now() + Duration::from_millis(5)).map(drop)
            });
            assert!(waiter.join().unwrap().is_err());
        });
        // The holder's node is the only one in use, unless the waiter left
        // an abandoned node at the tail.
        let tail = lock.tail.load(Relaxed).payload().unwrap();
        let state = lock.node(tail).state.load(Relaxed);
        assert!(state == WAITING || state == ABORTED);
        assert!(lock.is_locked());
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(holder) };
        assert_no_node_lost(&lock);

        let start = Instant::now();
        let token = lock.try_lock_until(start + Duration::from_secs(5)).unwrap();
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(token) };
        assert_no_node_lost(&lock);
    }

    #[test]
    fn idle_after_abandoned_waiter() {
        let lock = Lock::new();
        let holder = lock.lock();
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                lock.try_lock_until(Instant::now() + Duration::from_millis(5)).map(drop)
            });
            assert!(waiter.join().unwrap().is_err());
        });
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(holder) };
        // Nobody holds the lock, whatever the abandoned node left behind.
        assert!(!lock.is_locked());
        for _ in 0..100 {
            let token = lock.try_lock().expect("idle lock must be acquired");
            assert!(lock.is_locked());
            // SAFETY: The token was just returned by this lock.
            unsafe { lock.unlock(token) };
            assert!(!lock.is_locked());
        }
        assert_no_node_lost(&lock);
    }

    #[test]
    fn abandoned_chain_is_unwound() {
        let lock = Lock::new();
        let holder = lock.lock();
        thread::scope(|s| {
            // Queue up and give up in turn, leaving a chain of abandoned nodes.
            for _ in 0..POOL_SIZE - 1 {
                let waiter = s.spawn(|| {
                    lock.try_lock_until(Instant::now() + Duration::from_millis(5)).map(drop)
                });
                assert!(waiter.join().unwrap().is_err());
            }
        });
        assert!(lock.is_locked());
        assert!(lock.try_lock().is_none());
        // SAFETY: The token was returned by this lock.
        unsafe { lock.unlock(holder) };
        assert!(!lock.is_locked());
        let token = lock.try_lock().expect("idle lock must be acquired");
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
        assert_no_node_lost(&lock);
    }

    #[test]
    fn no_node_lost_after_contended_timeouts() {
        let lock = Lock::new();
        thread::scope(|s| {
            for _ in 0..2 * POOL_SIZE {
                s.spawn(|| {
                    for _ in 0..50 {
                        let timeout = Duration::from_micros(50);
                        if let Ok(token) = lock.try_lock_for(timeout) {
                            thread::sleep(Duration::from_micros(20));
                            // SAFETY: The token was returned by this lock.
                            unsafe { lock.unlock(token) };
                        }
                    }
                });
            }
        });
        assert_no_node_lost(&lock);
        // Every node is still usable: a relaxed deadline always succeeds.
        for _ in 0..2 * POOL_SIZE {
            let token = lock.try_lock_for(Duration::from_secs(5)).unwrap();
            // SAFETY: The token was returned by this lock.
            unsafe { lock.unlock(token) };
        }
        assert_no_node_lost(&lock);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type Lock = super::CompositeLock<Yield>;

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Lock>();
    }
}
