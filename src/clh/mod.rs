//! CLH queue lock.
//!
//! The CLH lock keeps an implicit queue of waiters: the lock only stores a
//! pointer to the most recently enqueued node, and every waiter remembers the
//! node it enqueued behind. Acquiring swaps the caller's node in as the new
//! tail and then spins on the predecessor's node until it is released. The
//! lock is fair (FIFO), the queue is unbounded, and only two threads ever
//! touch any one node's flag.
//!
//! Nodes are heap allocated and recycled: after a release, the predecessor's
//! node is no longer reachable by anyone else, so the releasing thread keeps
//! it as a spare for its next acquisition, of this or any other CLH lock.
//!
//! This lock is generic over the relax policy. User may choose a policy as
//! long as it implements the [`Relax`] trait. The following modules provide
//! type aliases for [`Mutex`] associated with a relax policy.
//!
//! [`Mutex`]: crate::Mutex
//! [`Relax`]: crate::relax::Relax

use core::cell::Cell;
use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crate::cfg::atomic::{fence, AtomicBool, AtomicPtr};
use crate::lock::RawLock;
use crate::relax::{self, Relax};

/// A queue node, `locked` while its owner holds or waits for the lock.
struct Node {
    locked: AtomicBool,
}

impl Node {
    fn new() -> Box<Self> {
        Box::new(Self { locked: AtomicBool::new(false) })
    }
}

std::thread_local! {
    static SPARE: Cell<Option<Box<Node>>> = const { Cell::new(None) };
}

/// Returns this thread's spare node, or a new one.
fn take_node() -> Box<Node> {
    SPARE.try_with(Cell::take).ok().flatten().unwrap_or_else(Node::new)
}

/// Keeps `node` as this thread's spare node.
fn recycle(node: Box<Node>) {
    // The node is simply freed once the thread local is gone.
    let _ = SPARE.try_with(|spare| spare.set(Some(node)));
}

/// A CLH queue lock.
///
/// # Examples
///
/// ```
/// use compositelock::clh::ClhLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// let mutex = Mutex::<_, ClhLock<Spin>>::new(0);
/// *mutex.lock() += 1;
/// assert_eq!(mutex.into_inner(), 1);
/// ```
pub struct ClhLock<R> {
    tail: AtomicPtr<Node>,
    marker: PhantomData<fn() -> R>,
}

/// The queue position held by a [`ClhLock`] acquisition.
#[must_use]
pub struct ClhToken {
    node: NonNull<Node>,
    pred: NonNull<Node>,
}

// SAFETY: The nodes are heap allocated and owned through the token, a release
// may happen on any thread.
unsafe impl Send for ClhToken {}
// SAFETY: No method of the token touches the nodes.
unsafe impl Sync for ClhToken {}

impl Debug for ClhToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClhToken").finish_non_exhaustive()
    }
}

impl<R> ClhLock<R> {
    /// Creates a new, unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        let tail = AtomicPtr::new(Box::into_raw(Node::new()));
        Self { tail, marker: PhantomData }
    }
}

impl<R> Default for ClhLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for ClhLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClhLock").finish_non_exhaustive()
    }
}

impl<R> Drop for ClhLock<R> {
    fn drop(&mut self) {
        let tail = self.tail.load(Relaxed);
        // SAFETY: The tail node is always a live allocation owned by the lock
        // while nobody holds or waits for it, which `&mut self` guarantees.
        drop(unsafe { Box::from_raw(tail) });
    }
}

// SAFETY: A thread only enters once its predecessor cleared the flag with
// Release, which the waiter observes through an Acquire fence.
unsafe impl<R: Relax> RawLock for ClhLock<R> {
    type Token = ClhToken;

    fn lock(&self) -> ClhToken {
        let node = take_node();
        node.locked.store(true, Relaxed);
        let node = Box::into_raw(node);
        let pred = self.tail.swap(node, AcqRel);
        // SAFETY: Only this thread, as the successor of `pred`, may access or
        // free the predecessor node from now on.
        let pred_locked = unsafe { &(*pred).locked };
        relax::spin_until::<R, _>(|| !pred_locked.load(Relaxed));
        fence(Acquire);
        // SAFETY: Both pointers come from `Box::into_raw`, never null.
        unsafe { ClhToken { node: NonNull::new_unchecked(node), pred: NonNull::new_unchecked(pred) } }
    }

    unsafe fn unlock(&self, token: ClhToken) {
        // SAFETY: Our node stays alive until a successor recycles it, which
        // can only happen after the flag is cleared below.
        let node = unsafe { token.node.as_ref() };
        debug_assert!(node.locked.load(Relaxed), "unlock of an unheld ClhLock node");
        node.locked.store(false, Release);
        // SAFETY: The predecessor node was handed over to this acquisition,
        // no other thread can reach it anymore.
        recycle(unsafe { Box::from_raw(token.pred.as_ptr()) });
    }
}

/// A CLH lock that implements a `spin` relax policy.
///
/// During lock contention, this lock spins while signaling the processor that
/// it is running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`Mutex`] over a [`ClhLock`] that implements the [`Spin`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::clh::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`ClhLock`]: super::ClhLock
    pub type Mutex<T> = crate::Mutex<T, super::ClhLock<Spin>>;
}

/// A CLH lock that implements a `yield` relax policy.
///
/// During lock contention, this lock will yield the current time slice to the
/// OS scheduler.
pub mod yields {
    use crate::relax::Yield;

    /// A [`Mutex`] over a [`ClhLock`] that implements the [`Yield`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::clh::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`ClhLock`]: super::ClhLock
    pub type Mutex<T> = crate::Mutex<T, super::ClhLock<Yield>>;
}

#[cfg(all(not(loom), test))]
mod test {
    use core::cell::Cell;

    use super::{ClhLock, SPARE};
    use crate::lock::RawLock;
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = ClhLock<Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<Lock>();
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
        tests::fifo_order::<Lock>(4);
    }

    #[test]
    fn smoke() {
        tests::smoke::<Lock>();
    }

    #[test]
    fn test_guard_debug_display() {
        tests::test_guard_debug_display::<Lock>();
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
    fn release_recycles_predecessor() {
        let lock = Lock::new();
        let initial = lock.tail.load(core::sync::atomic::Ordering::Relaxed);
        let token = lock.lock();
        assert_eq!(token.pred.as_ptr(), initial);
        // SAFETY: The token was just returned by this lock.
        unsafe { lock.unlock(token) };
        let spare = SPARE.with(Cell::take).map(Box::into_raw);
        assert_eq!(spare, Some(initial));
        // SAFETY: The node was allocated by `Box` and moved out of the slot.
        drop(unsafe { Box::from_raw(initial) });
    }
}
