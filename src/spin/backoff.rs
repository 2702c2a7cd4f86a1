use core::cell::Cell;
use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::cfg::atomic::AtomicBool;
use crate::lock::{ConstInit, RawLock, RawTryLock};
use crate::relax::{self, Relax};

/// The initial upper bound of a backoff delay.
pub const MIN_DELAY: Duration = Duration::from_micros(1);

/// The cap of the backoff delay.
pub const MAX_DELAY: Duration = Duration::from_micros(100);

std::thread_local! {
    static BACKOFF: Cell<Backoff> = const { Cell::new(Backoff::new(MIN_DELAY, MAX_DELAY)) };
}

/// Runs `f` against this thread's backoff state.
fn with_backoff(f: impl FnOnce(&mut Backoff)) {
    let fresh = Backoff::new(MIN_DELAY, MAX_DELAY);
    let mut backoff = BACKOFF.try_with(Cell::get).unwrap_or(fresh);
    f(&mut backoff);
    // The state is simply dropped once the thread local is gone.
    let _ = BACKOFF.try_with(|state| state.set(backoff));
}

/// A test-and-test-and-set lock that backs off after losing a race.
///
/// A thread that observes the lock free but then fails to swap the flag has
/// just lost to another thread, a strong hint of contention. Instead of
/// retrying right away, it sleeps a random delay that doubles on every lost
/// race, from [`MIN_DELAY`] up to [`MAX_DELAY`]. The delay state is private
/// to each thread, and is reset as soon as the thread takes the lock.
///
/// This reduces, but does not remove, the risk of starvation, and waiters
/// are still served in no particular order.
pub struct BackoffLock<R> {
    locked: AtomicBool,
    marker: PhantomData<fn() -> R>,
}

impl<R> BackoffLock<R> {
    /// Creates a new, unlocked lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { locked: AtomicBool::new(false), marker: PhantomData }
    }

    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new() -> Self {
        Self { locked: AtomicBool::new(false), marker: PhantomData }
    }
}

impl<R> Default for BackoffLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for BackoffLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffLock").field("locked", &self.locked.load(Relaxed)).finish()
    }
}

impl<R> ConstInit for BackoffLock<R> {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

// SAFETY: Only the thread that swapped the flag from `false` to `true` holds
// the lock, and the Acquire swap pairs with the Release store of `unlock`.
unsafe impl<R: Relax> RawLock for BackoffLock<R> {
    type Token = ();

    fn lock(&self) {
        loop {
            relax::spin_until::<R, _>(|| !self.locked.load(Relaxed));
            let true = self.locked.swap(true, Acquire) else { break };
            with_backoff(Backoff::backoff);
        }
        with_backoff(Backoff::reset);
    }

    unsafe fn unlock(&self, (): ()) {
        debug_assert!(self.locked.load(Relaxed), "unlock of an unlocked BackoffLock");
        self.locked.store(false, Release);
    }
}

// SAFETY: Same as `RawLock`, a successful swap is the only way in.
unsafe impl<R: Relax> RawTryLock for BackoffLock<R> {
    fn try_lock(&self) -> Option<()> {
        self.locked.compare_exchange(false, true, Acquire, Relaxed).ok().map(drop)
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::thread;
    use std::time::Duration;

    use super::{with_backoff, MIN_DELAY};
    use crate::lock::RawLock;
    use crate::relax::Spin;
    use crate::test::tests;

    fn backoff_limit() -> Duration {
        let mut limit = Duration::ZERO;
        with_backoff(|backoff| limit = backoff.limit());
        limit
    }

    type Lock = super::BackoffLock<Spin>;

    #[test]
    fn lots_and_lots_lock() {
        tests::lots_and_lots_lock::<Lock>();
    }

    #[test]
    fn lots_and_lots_mixed_lock() {
        tests::lots_and_lots_mixed_lock::<Lock>();
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
    fn test_lock_arc_access_in_unwind() {
        tests::test_lock_arc_access_in_unwind::<Lock>();
    }

    #[test]
    fn backoff_grows_while_losing() {
        with_backoff(|backoff| backoff.backoff());
        with_backoff(|backoff| backoff.backoff());
        assert_eq!(backoff_limit(), MIN_DELAY * 4);
    }

    #[test]
    fn acquisition_resets_backoff() {
        let lock = Lock::new();
        // Pretend this thread lost a few races before.
        for _ in 0..3 {
            with_backoff(|backoff| backoff.backoff());
        }
        assert!(backoff_limit() > MIN_DELAY);
        lock.lock();
        assert_eq!(backoff_limit(), MIN_DELAY);
        // SAFETY: The lock was just acquired by this thread.
        unsafe { lock.unlock(()) };
    }

    #[test]
    fn contended_acquisition_resets_backoff() {
        let lock = Lock::new();
        lock.lock();
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                lock.lock();
                let limit = backoff_limit();
                // SAFETY: The lock was just acquired by this thread.
                unsafe { lock.unlock(()) };
                limit
            });
            thread::sleep(Duration::from_millis(5));
            // SAFETY: The lock was acquired by this thread above.
            unsafe { lock.unlock(()) };
            assert_eq!(waiter.join().unwrap(), MIN_DELAY);
        });
    }
}
