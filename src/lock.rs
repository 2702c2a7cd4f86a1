use std::time::{Duration, Instant};

use crate::error::AcquisitionTimeout;

/// The contract every lock algorithm of this crate implements.
///
/// A `RawLock` does not own the data it protects; see [`Mutex`] for the data
/// carrying wrapper. All implementations are drop-in substitutable: a caller
/// acquires with [`lock`], runs its critical section and then hands the
/// returned token back to [`unlock`].
///
/// The token carries whatever per-acquisition state an algorithm needs to
/// release the lock later on, such as the queue slot or queue node that was
/// claimed. It is owned by the caller, so no lock needs thread local storage
/// to remember who holds it.
///
/// # Safety
///
/// Implementations must guarantee that, between a `lock` (or any successful
/// try variant) and the matching `unlock`, no other call returns a token.
/// Releasing must publish every write made during the critical section to
/// the next acquirer (release/acquire ordering).
///
/// [`Mutex`]: crate::Mutex
/// [`lock`]: RawLock::lock
/// [`unlock`]: RawLock::unlock
pub unsafe trait RawLock: Default + Send + Sync {
    /// Per-acquisition state, returned by `lock` and consumed by `unlock`.
    type Token;

    /// Acquires this lock, blocking the current thread until it is able to
    /// do so.
    fn lock(&self) -> Self::Token;

    /// Releases this lock.
    ///
    /// # Safety
    ///
    /// `token` must have been returned by an acquisition of this same lock
    /// instance, and must not have been released yet.
    unsafe fn unlock(&self, token: Self::Token);
}

/// Locks that support a single, non-blocking acquisition attempt.
///
/// # Safety
///
/// Same requirements as [`RawLock`]. A `Some` token means the lock is held.
pub unsafe trait RawTryLock: RawLock {
    /// Attempts to acquire this lock without blocking.
    ///
    /// Succeeds only if the lock is not held and nobody is waiting for it.
    fn try_lock(&self) -> Option<Self::Token>;

    /// Returns `true` if the lock is currently held.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    fn is_locked(&self) -> bool;
}

/// Locks that support bounded waiting.
///
/// # Safety
///
/// Same requirements as [`RawLock`]. In addition, a failed attempt must leave
/// every shared structure of the lock usable by other threads.
pub unsafe trait RawTimedLock: RawLock {
    /// Attempts to acquire this lock until `deadline` is reached.
    ///
    /// Returns [`AcquisitionTimeout`] if the lock could not be acquired in
    /// time. The call returns at or shortly after `deadline`.
    fn try_lock_until(&self, deadline: Instant) -> Result<Self::Token, AcquisitionTimeout>;

    /// Attempts to acquire this lock for at most `timeout`.
    fn try_lock_for(&self, timeout: Duration) -> Result<Self::Token, AcquisitionTimeout> {
        self.try_lock_until(Instant::now() + timeout)
    }
}

/// Locks that can be created in a const context.
///
/// Not available for Loom builds, since Loom primitives are not compiler-time
/// evaluable.
pub trait ConstInit {
    /// A new, unlocked instance.
    #[cfg(not(all(loom, test)))]
    const INIT: Self;
}
