use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicBool;
use crate::lock::{ConstInit, RawLock, RawTryLock};
use crate::relax::{self, Relax};

/// A test-and-test-and-set spin lock.
///
/// Waiting threads first spin reading the flag from their own cache, and only
/// attempt the swap once the flag is observed clear. This saves the coherence
/// traffic of [`TasLock`] while the lock is held, but every release still
/// triggers a burst of swaps from all waiters.
///
/// [`TasLock`]: super::TasLock
pub struct TtasLock<R> {
    locked: AtomicBool,
    marker: PhantomData<fn() -> R>,
}

impl<R> TtasLock<R> {
    /// Creates a new, unlocked lock (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { locked: AtomicBool::new(false), marker: PhantomData }
    }

    /// Creates a new, unlocked lock (loom, non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new() -> Self {
        Self { locked: AtomicBool::new(false), marker: PhantomData }
    }
}

impl<R> Default for TtasLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for TtasLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtasLock").field("locked", &self.locked.load(Relaxed)).finish()
    }
}

impl<R> ConstInit for TtasLock<R> {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

// SAFETY: Only the thread that swapped the flag from `false` to `true` holds
// the lock, and the Acquire swap pairs with the Release store of `unlock`.
unsafe impl<R: Relax> RawLock for TtasLock<R> {
    type Token = ();

    fn lock(&self) {
        loop {
            relax::spin_until::<R, _>(|| !self.locked.load(Relaxed));
            let true = self.locked.swap(true, Acquire) else { return };
        }
    }

    unsafe fn unlock(&self, (): ()) {
        debug_assert!(self.locked.load(Relaxed), "unlock of an unlocked TtasLock");
        self.locked.store(false, Release);
    }
}

// SAFETY: Same as `RawLock`, a successful swap is the only way in.
unsafe impl<R: Relax> RawTryLock for TtasLock<R> {
    fn try_lock(&self) -> Option<()> {
        self.locked.compare_exchange(false, true, Acquire, Relaxed).ok().map(drop)
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = super::TtasLock<Yield>;

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
    fn test_mutex_from() {
        tests::test_mutex_from::<Lock>();
    }

    #[test]
    fn test_into_inner() {
        tests::test_into_inner::<Lock>();
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
    fn test_lock_unsized() {
        tests::test_lock_unsized::<Lock>();
    }
}

#[cfg(all(loom, test))]
mod model {
    use crate::loom::models;
    use crate::relax::Yield;

    type Lock = super::TtasLock<Yield>;

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
