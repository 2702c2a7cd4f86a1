use thiserror::Error;

/// The error returned by bounded acquisitions whose deadline elapsed before
/// the lock could be taken.
///
/// A timed out attempt never leaves shared state behind for the caller to
/// clean up: the caller may simply retry or give up.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use compositelock::composite::spins::Mutex;
///
/// let mutex = Mutex::new(0);
/// let guard = mutex.lock();
/// let err = std::thread::scope(|s| {
///     s.spawn(|| mutex.try_lock_for(Duration::from_millis(1)).map(drop)).join()
/// });
/// assert!(err.unwrap().is_err());
/// drop(guard);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("lock acquisition timed out")]
pub struct AcquisitionTimeout;
