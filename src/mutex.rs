use core::fmt::{self, Debug, Display, Formatter};
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use std::time::{Duration, Instant};

use crate::cfg::cell::{UnsafeCell, UnsafeCellWith};
use crate::error::AcquisitionTimeout;
use crate::lock::{ConstInit, RawLock, RawTimedLock, RawTryLock};

/// A mutual exclusion primitive useful for protecting shared data.
///
/// This mutex is generic over the lock algorithm `L`, any [`RawLock`] of this
/// crate can be plugged in. Each mutex has a type parameter which represents
/// the data that it is protecting. The data can only be accessed through the
/// RAII guards returned from [`lock`], [`try_lock`] and [`try_lock_until`],
/// which guarantees that the data is only ever accessed when the mutex is
/// locked.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use std::sync::mpsc::channel;
///
/// use compositelock::Mutex;
/// use compositelock::clh::ClhLock;
/// use compositelock::relax::Spin;
///
/// type SpinMutex<T> = Mutex<T, ClhLock<Spin>>;
///
/// const N: usize = 10;
///
/// // Spawn a few threads to increment a shared variable (non-atomically), and
/// // let the main thread know once all increments are done.
/// //
/// // Here we're using an Arc to share memory among threads, and the data inside
/// // the Arc is protected with a mutex.
/// let data = Arc::new(SpinMutex::new(0));
///
/// let (tx, rx) = channel();
/// for _ in 0..N {
///     let (data, tx) = (data.clone(), tx.clone());
///     thread::spawn(move || {
///         // The shared state can only be accessed once the lock is held.
///         // Our non-atomic increment is safe because we're the only thread
///         // which can access the shared state when the lock is held.
///         let mut data = data.lock();
///         *data += 1;
///         if *data == N {
///             tx.send(()).unwrap();
///         }
///         // the lock is unlocked here when `data` goes out of scope.
///     });
/// }
///
/// rx.recv().unwrap();
/// ```
/// [`lock`]: Mutex::lock
/// [`try_lock`]: Mutex::try_lock
/// [`try_lock_until`]: Mutex::try_lock_until
pub struct Mutex<T: ?Sized, L> {
    lock: L,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send, L: Send> Send for Mutex<T, L> {}
unsafe impl<T: ?Sized + Send, L: Sync> Sync for Mutex<T, L> {}

impl<T, L: RawLock> Mutex<T, L> {
    /// Creates a new mutex in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::spin::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// ```
    #[inline]
    pub fn new(value: T) -> Self {
        let data = UnsafeCell::new(value);
        Self { lock: L::default(), data }
    }

    /// Consumes this mutex, returning the underlying data.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::spin::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// assert_eq!(mutex.into_inner(), 0);
    /// ```
    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

#[cfg(not(all(loom, test)))]
impl<T, L: ConstInit> Mutex<T, L> {
    /// Creates a new mutex in an unlocked state in a const context.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::composite::spins::Mutex;
    ///
    /// static MUTEX: Mutex<i32> = Mutex::const_new(0);
    /// assert_eq!(*MUTEX.lock(), 0);
    /// ```
    #[inline]
    pub const fn const_new(value: T) -> Self {
        let data = UnsafeCell::new(value);
        Self { lock: L::INIT, data }
    }
}

impl<T: ?Sized, L: RawLock> Mutex<T, L> {
    /// Acquires this mutex, blocking the current thread until it is able to do so.
    ///
    /// Upon returning, the thread is the only thread with the lock held. An
    /// RAII guard is returned to allow scoped unlock of the lock. When the
    /// guard goes out of scope, the mutex will be unlocked.
    ///
    /// Algorithms with bounded waiting retry internally, sleeping a coarse
    /// interval between attempts, until they succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// use compositelock::array::spins::Mutex;
    ///
    /// let mutex = Arc::new(Mutex::new(0));
    /// let c_mutex = Arc::clone(&mutex);
    ///
    /// thread::spawn(move || {
    ///     *c_mutex.lock() = 10;
    /// })
    /// .join().expect("thread::spawn failed");
    ///
    /// assert_eq!(*mutex.lock(), 10);
    /// ```
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, L> {
        MutexGuard::new(self, self.lock.lock())
    }

    /// Acquires this mutex and then runs the closure against the protected data.
    ///
    /// This function will block if the lock is unavailable.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::timeout::spins::Mutex;
    ///
    /// let mutex = Mutex::new(1);
    /// let value = mutex.lock_then(|data| {
    ///     *data += 1;
    ///     *data
    /// });
    /// assert_eq!(value, 2);
    /// ```
    #[inline]
    pub fn lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        self.lock().with_mut(f)
    }

    /// Returns a reference to the underlying lock algorithm.
    #[inline]
    pub fn raw(&self) -> &L {
        &self.lock
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `Mutex` mutably, no actual locking needs to
    /// take place - the mutable borrow statically guarantees no locks exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::clh::spins::Mutex;
    ///
    /// let mut mutex = Mutex::new(0);
    /// *mutex.get_mut() = 10;
    /// assert_eq!(*mutex.lock(), 10);
    /// ```
    #[cfg(not(all(loom, test)))]
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: We hold exclusive access to the Mutex data.
        unsafe { &mut *self.data.get() }
    }
}

impl<T: ?Sized, L: RawTryLock> Mutex<T, L> {
    /// Attempts to acquire this mutex without blocking the thread.
    ///
    /// If the lock could not be acquired at this time, then [`None`] is
    /// returned. Otherwise, an RAII guard is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::composite::spins::fast::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.try_lock().unwrap();
    /// assert!(mutex.try_lock().is_none());
    /// drop(guard);
    /// assert!(mutex.try_lock().is_some());
    /// ```
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, L>> {
        self.lock.try_lock().map(|token| MutexGuard::new(self, token))
    }

    /// Attempts to acquire this mutex and then runs a closure against the
    /// protected data, or against `None` if the lock is busy.
    ///
    /// This function does not block.
    #[inline]
    pub fn try_lock_then<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(Option<&mut T>) -> Ret,
    {
        match self.try_lock() {
            Some(mut guard) => guard.with_mut(|data| f(Some(data))),
            None => f(None),
        }
    }

    /// Returns `true` if the lock is currently held.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<T: ?Sized, L: RawTimedLock> Mutex<T, L> {
    /// Attempts to acquire this mutex until `deadline` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionTimeout`] if the lock was not acquired in time.
    #[inline]
    pub fn try_lock_until(
        &self,
        deadline: Instant,
    ) -> Result<MutexGuard<'_, T, L>, AcquisitionTimeout> {
        let token = self.lock.try_lock_until(deadline)?;
        Ok(MutexGuard::new(self, token))
    }

    /// Attempts to acquire this mutex for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionTimeout`] if the lock was not acquired in time.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use compositelock::timeout::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let guard = mutex.try_lock_for(Duration::from_millis(10)).unwrap();
    /// assert_eq!(*guard, 0);
    /// ```
    #[inline]
    pub fn try_lock_for(
        &self,
        timeout: Duration,
    ) -> Result<MutexGuard<'_, T, L>, AcquisitionTimeout> {
        self.try_lock_until(Instant::now() + timeout)
    }
}

impl<T: Default, L: RawLock> Default for Mutex<T, L> {
    /// Creates a `Mutex<T, L>`, with the `Default` value for `T`.
    #[inline]
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<T, L: RawLock> From<T> for Mutex<T, L> {
    /// Creates a `Mutex<T, L>` from a instance of `T`.
    #[inline]
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: ?Sized + Debug, L: RawTryLock> Debug for Mutex<T, L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        self.try_lock_then(|data| match data {
            Some(data) => d.field("data", &&*data),
            None => d.field("data", &format_args!("<locked>")),
        });
        d.finish()
    }
}

/// An RAII implementation of a "scoped lock" of a mutex. When this structure is
/// dropped (falls out of scope), the lock will be unlocked.
///
/// The data protected by the mutex can be accessed through this guard via its
/// [`Deref`] and [`DerefMut`] implementations.
///
/// [`Deref`]: core::ops::Deref
/// [`DerefMut`]: core::ops::DerefMut
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized, L: RawLock> {
    lock: &'a Mutex<T, L>,
    token: ManuallyDrop<L::Token>,
    marker: PhantomData<&'a mut T>,
}

impl<'a, T: ?Sized, L: RawLock> MutexGuard<'a, T, L> {
    /// Creates a new `MutexGuard` instance.
    fn new(lock: &'a Mutex<T, L>, token: L::Token) -> Self {
        Self { lock, token: ManuallyDrop::new(token), marker: PhantomData }
    }

    /// Runs `f` against a shared reference pointing to the underlying data.
    fn with<F, Ret>(&self, f: F) -> Ret
    where
        F: FnOnce(&T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { self.lock.data.with_unchecked(f) }
    }

    /// Runs `f` against a mutable reference pointing to the underlying data.
    fn with_mut<F, Ret>(&mut self, f: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { self.lock.data.with_mut_unchecked(f) }
    }

    /// Returns a reference to the token of this acquisition.
    #[cfg(test)]
    pub(crate) fn token(&self) -> &L::Token {
        &self.token
    }
}

impl<T: ?Sized + Debug, L: RawLock> Debug for MutexGuard<'_, T, L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.with(|data| data.fmt(f))
    }
}

impl<T: ?Sized + Display, L: RawLock> Display for MutexGuard<'_, T, L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.with(|data| data.fmt(f))
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, L: RawLock> core::ops::Deref for MutexGuard<'_, T, L> {
    type Target = T;

    /// Dereferences the guard to access the underlying data.
    #[inline(always)]
    fn deref(&self) -> &T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &*self.lock.data.get() }
    }
}

#[cfg(not(all(loom, test)))]
impl<T: ?Sized, L: RawLock> core::ops::DerefMut for MutexGuard<'_, T, L> {
    /// Mutably dereferences the guard to access the underlying data.
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: A guard instance holds the lock locked.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized, L: RawLock> Drop for MutexGuard<'_, T, L> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: The token is taken exactly once, here, and it was returned
        // by an acquisition of this same lock.
        unsafe {
            let token = ManuallyDrop::take(&mut self.token);
            self.lock.lock.unlock(token);
        }
    }
}
