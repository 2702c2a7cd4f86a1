//! Array based queue locks.
//!
//! Threads line up by drawing tickets from a shared counter, and each ticket
//! waits on its own slot of a fixed size circular array. The lock is handed
//! over from slot to slot, so it is fair: threads that have waited for longer
//! are scheduled first (FIFO). Each waiting thread only spins on its own slot.
//!
//! The array has [`CAPACITY`] slots, which should cover the maximum number of
//! threads expected to contend at once. Extra threads still get a correct
//! lock, but they have to share slots with others.
//!
//! Two variants are provided. [`ArrayLock`] lays the slots out contiguously,
//! so adjacent slots share cache lines, and a release invalidates the line
//! other waiters spin on. [`PaddedArrayLock`] aligns each slot to its own pair
//! of cache lines, trading memory for no false sharing. Both behave the same.
//!
//! These locks are generic over the relax policy. User may choose a policy as
//! long as it implements the [`Relax`] trait. The following modules provide
//! type aliases for [`Mutex`] associated with a relax policy.
//!
//! [`Mutex`]: crate::Mutex
//! [`Relax`]: crate::relax::Relax

use core::fmt::{self, Debug, Formatter};

use crate::lock::{RawLock, RawTryLock};
use crate::relax::Relax;

mod queue;
use queue::{Packed, Padded, Queue};

pub use queue::CAPACITY;

/// An array based queue lock.
///
/// # Examples
///
/// ```
/// use compositelock::array::ArrayLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// let mutex = Mutex::<_, ArrayLock<Spin>>::new(0);
/// *mutex.lock() += 1;
/// assert_eq!(mutex.into_inner(), 1);
/// ```
pub struct ArrayLock<R> {
    queue: Queue<Packed, R>,
}

/// An array based queue lock whose slots never share a cache line.
///
/// # Examples
///
/// ```
/// use compositelock::array::PaddedArrayLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// let mutex = Mutex::<_, PaddedArrayLock<Spin>>::new(0);
/// *mutex.lock() += 1;
/// assert_eq!(mutex.into_inner(), 1);
/// ```
pub struct PaddedArrayLock<R> {
    queue: Queue<Padded, R>,
}

impl<R> ArrayLock<R> {
    /// Creates a new, unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self { queue: Queue::new() }
    }
}

impl<R> PaddedArrayLock<R> {
    /// Creates a new, unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self { queue: Queue::new() }
    }
}

impl<R> Default for ArrayLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Default for PaddedArrayLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for ArrayLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayLock").field("queue", &self.queue).finish()
    }
}

impl<R> Debug for PaddedArrayLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaddedArrayLock").field("queue", &self.queue).finish()
    }
}

// SAFETY: A ticket is only let in once the previous ticket was released, and
// the Acquire load of the turn pairs with the Release store of `unlock`.
unsafe impl<R: Relax> RawLock for ArrayLock<R> {
    /// The ticket drawn by this acquisition.
    type Token = usize;

    fn lock(&self) -> usize {
        self.queue.lock()
    }

    unsafe fn unlock(&self, ticket: usize) {
        self.queue.unlock(ticket);
    }
}

// SAFETY: A ticket is only drawn by `try_lock` when its turn has come.
unsafe impl<R: Relax> RawTryLock for ArrayLock<R> {
    fn try_lock(&self) -> Option<usize> {
        self.queue.try_lock()
    }

    fn is_locked(&self) -> bool {
        self.queue.is_locked()
    }
}

// SAFETY: Same as `ArrayLock`.
unsafe impl<R: Relax> RawLock for PaddedArrayLock<R> {
    /// The ticket drawn by this acquisition.
    type Token = usize;

    fn lock(&self) -> usize {
        self.queue.lock()
    }

    unsafe fn unlock(&self, ticket: usize) {
        self.queue.unlock(ticket);
    }
}

// SAFETY: Same as `ArrayLock`.
unsafe impl<R: Relax> RawTryLock for PaddedArrayLock<R> {
    fn try_lock(&self) -> Option<usize> {
        self.queue.try_lock()
    }

    fn is_locked(&self) -> bool {
        self.queue.is_locked()
    }
}

/// Array based queue locks that implement a `spin` relax policy.
///
/// During lock contention, these locks spin while signaling the processor
/// that they are running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`Mutex`] over an [`ArrayLock`] that implements the [`Spin`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::array::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`ArrayLock`]: super::ArrayLock
    pub type Mutex<T> = crate::Mutex<T, super::ArrayLock<Spin>>;

    /// A padded array lock that implements a `spin` relax policy.
    pub mod padded {
        use crate::array::PaddedArrayLock;
        use crate::relax::Spin;

        /// A [`Mutex`] over a [`PaddedArrayLock`] that implements the
        /// [`Spin`] relax policy.
        ///
        /// # Example
        ///
        /// ```
        /// use compositelock::array::spins::padded::Mutex;
        ///
        /// let mutex = Mutex::new(0);
        /// let value = mutex.lock_then(|data| *data);
        /// assert_eq!(value, 0);
        /// ```
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, PaddedArrayLock<Spin>>;
    }
}

/// Array based queue locks that implement a `yield` relax policy.
///
/// During lock contention, these locks will yield the current time slice to
/// the OS scheduler.
pub mod yields {
    use crate::relax::Yield;

    /// A [`Mutex`] over an [`ArrayLock`] that implements the [`Yield`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::array::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`ArrayLock`]: super::ArrayLock
    pub type Mutex<T> = crate::Mutex<T, super::ArrayLock<Yield>>;

    /// A padded array lock that implements a `yield` relax policy.
    pub mod padded {
        use crate::array::PaddedArrayLock;
        use crate::relax::Yield;

        /// A [`Mutex`] over a [`PaddedArrayLock`] that implements the
        /// [`Yield`] relax policy.
        ///
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, PaddedArrayLock<Yield>>;
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{ArrayLock, PaddedArrayLock, CAPACITY};
    use crate::lock::{RawLock, RawTryLock};
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = ArrayLock<Yield>;
    type Padded = PaddedArrayLock<Yield>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<Lock>();
        tests::lots_and_lots_lock::<Padded>();
    }

    #[test]
    fn lots_and_lots_try_lock() {
        tests::lots_and_lots_try_lock::<Lock>();
        tests::lots_and_lots_try_lock::<Padded>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<Lock>();
        tests::lots_and_lots_mixed_lock::<Padded>();
    }

    #[test]
    fn mutual_exclusion() {
        tests::mutual_exclusion::<Lock>();
        tests::mutual_exclusion::<Padded>();
    }

    #[test]
    fn no_lost_updates() {
        tests::no_lost_updates::<Lock>();
        tests::no_lost_updates::<Padded>();
    }

    #[test]
    fn fifo_order() {
        tests::fifo_order::<Lock>(4);
        tests::fifo_order::<Padded>(4);
    }

    #[test]
    fn smoke() {
        tests::smoke::<Lock>();
    }

    #[test]
    fn test_try_lock() {
        tests::test_try_lock::<Lock>();
        tests::test_try_lock::<Padded>();
    }

    #[test]
    fn test_mutex_debug() {
        tests::test_mutex_debug::<Lock>();
    }

    #[test]
    fn test_get_mut() {
        tests::test_get_mut::<Lock>();
    }

    #[test]
    fn test_lock_arc_access_in_unwind() {
        tests::test_lock_arc_access_in_unwind::<Padded>();
    }

    #[test]
    fn test_lock_unsized() {
        tests::test_lock_unsized::<Padded>();
    }

    #[test]
    fn tickets_wrap_around_the_array() {
        let lock = Lock::new();
        for expected in 0..3 * CAPACITY {
            let ticket = lock.lock();
            assert_eq!(ticket, expected);
            assert!(lock.is_locked());
            // SAFETY: The ticket was just drawn from this lock.
            unsafe { lock.unlock(ticket) };
            assert!(!lock.is_locked());
        }
    }

    #[test]
    fn more_threads_than_slots() {
        let mutex = crate::Mutex::<usize, Padded>::new(0);
        std::thread::scope(|s| {
            for _ in 0..CAPACITY + 4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        mutex.lock_then(|data| *data += 1);
                    }
                });
            }
        });
        assert_eq!(mutex.into_inner(), (CAPACITY + 4) * 100);
    }

    #[test]
    fn padded_slots_do_not_share_lines() {
        assert!(core::mem::size_of::<super::queue::Padded>() >= 128);
        assert!(core::mem::align_of::<super::queue::Padded>() >= 128);
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type Lock = super::ArrayLock<Yield>;

    #[test]
    fn lock_join() {
        models::lock_join::<Lock>();
    }

    #[test]
    fn try_lock_join() {
        models::try_lock_join::<Lock>();
    }

    #[test]
    fn mixed_lock_join() {
        models::mixed_lock_join::<Lock>();
    }
}
