use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicBool;
use crate::lock::{ConstInit, RawLock, RawTryLock};
use crate::relax::Relax;

/// A test-and-set spin lock.
///
/// Every acquisition attempt is an atomic swap of the shared flag, so waiting
/// threads keep invalidating the cache line the flag lives in. There is no
/// fairness and no bound on how long a thread may wait.
///
/// # Examples
///
/// ```
/// use compositelock::spin::TasLock;
/// use compositelock::relax::Spin;
/// use compositelock::Mutex;
///
/// let mutex = Mutex::<_, TasLock<Spin>>::new(0);
/// *mutex.lock() += 1;
/// assert_eq!(mutex.into_inner(), 1);
/// ```
pub struct TasLock<R> {
    locked: AtomicBool,
    marker: PhantomData<fn() -> R>,
}

impl<R> TasLock<R> {
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

impl<R> Default for TasLock<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Debug for TasLock<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TasLock").field("locked", &self.locked.load(Relaxed)).finish()
    }
}

impl<R> ConstInit for TasLock<R> {
    #[cfg(not(all(loom, test)))]
    const INIT: Self = Self::new();
}

// SAFETY: Only the thread that swapped the flag from `false` to `true` holds
// the lock, and the Acquire swap pairs with the Release store of `unlock`.
unsafe impl<R: Relax> RawLock for TasLock<R> {
    type Token = ();

    fn lock(&self) {
        let mut relax = R::new();
        while self.locked.swap(true, Acquire) {
            relax.relax();
        }
    }

    unsafe fn unlock(&self, (): ()) {
        debug_assert!(self.locked.load(Relaxed), "unlock of an unlocked TasLock");
        self.locked.store(false, Release);
    }
}

// SAFETY: Same as `RawLock`, a successful swap is the only way in.
unsafe impl<R: Relax> RawTryLock for TasLock<R> {
    fn try_lock(&self) -> Option<()> {
        let false = self.locked.swap(true, Acquire) else { return None };
        Some(())
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use crate::relax::Yield;
    use crate::test::tests;

    type Lock = super::TasLock<Yield>;

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
    fn test_mutex_debug() {
        tests::test_mutex_debug::<Lock>();
    }

    #[test]
    fn test_lock_released_on_panic() {
        tests::test_lock_released_on_panic::<Lock>();
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

    type Lock = super::TasLock<Yield>;

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
