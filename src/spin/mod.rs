//! Baseline spin locks built on a single shared flag.
//!
//! These locks are the simplest members of the family, and differ only in
//! how a waiting thread tests and sets the flag:
//!
//! - [`TasLock`]: retries an atomic swap until it wins.
//! - [`TtasLock`]: reads the flag until it is clear, then swaps.
//! - [`BackoffLock`]: like [`TtasLock`], but sleeps a randomized, growing
//!   delay after every lost swap.
//!
//! None of them guarantees any ordering among waiters, nor a bound on how
//! long one may wait. For FIFO fairness see the queue locks of this crate.
//!
//! All of these locks are generic over the relax policy. User may choose a
//! policy as long as it implements the [`Relax`] trait. The following modules
//! provide type aliases for [`Mutex`] associated with a relax policy.
//!
//! [`Mutex`]: crate::Mutex
//! [`Relax`]: crate::relax::Relax

mod backoff;
mod tas;
mod ttas;

pub use backoff::{BackoffLock, MAX_DELAY, MIN_DELAY};
pub use tas::TasLock;
pub use ttas::TtasLock;

/// Flag based spin locks that implement a `spin` relax policy.
///
/// During lock contention, these locks spin while signaling the processor
/// that they are running a busy-wait spin-loop.
pub mod spins {
    use crate::relax::Spin;

    /// A [`Mutex`] over a [`TtasLock`] that implements the [`Spin`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::spin::spins::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`TtasLock`]: super::TtasLock
    pub type Mutex<T> = crate::Mutex<T, super::TtasLock<Spin>>;

    /// A test-and-set lock that implements a `spin` relax policy.
    pub mod tas {
        use crate::relax::Spin;
        use crate::spin::TasLock;

        /// A [`Mutex`] over a [`TasLock`] that implements the [`Spin`] relax
        /// policy.
        ///
        /// # Example
        ///
        /// ```
        /// use compositelock::spin::spins::tas::Mutex;
        ///
        /// let mutex = Mutex::new(0);
        /// let value = mutex.lock_then(|data| *data);
        /// assert_eq!(value, 0);
        /// ```
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, TasLock<Spin>>;
    }

    /// A backoff lock that implements a `spin` relax policy.
    pub mod backoff {
        use crate::relax::Spin;
        use crate::spin::BackoffLock;

        /// A [`Mutex`] over a [`BackoffLock`] that implements the [`Spin`]
        /// relax policy.
        ///
        /// # Example
        ///
        /// ```
        /// use compositelock::spin::spins::backoff::Mutex;
        ///
        /// let mutex = Mutex::new(0);
        /// let value = mutex.lock_then(|data| *data);
        /// assert_eq!(value, 0);
        /// ```
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, BackoffLock<Spin>>;
    }
}

/// Flag based spin locks that implement a `yield` relax policy.
///
/// During lock contention, these locks will yield the current time slice to
/// the OS scheduler.
pub mod yields {
    use crate::relax::Yield;

    /// A [`Mutex`] over a [`TtasLock`] that implements the [`Yield`] relax
    /// policy.
    ///
    /// # Example
    ///
    /// ```
    /// use compositelock::spin::yields::Mutex;
    ///
    /// let mutex = Mutex::new(0);
    /// let value = mutex.lock_then(|data| *data);
    /// assert_eq!(value, 0);
    /// ```
    /// [`Mutex`]: crate::Mutex
    /// [`TtasLock`]: super::TtasLock
    pub type Mutex<T> = crate::Mutex<T, super::TtasLock<Yield>>;

    /// A test-and-set lock that implements a `yield` relax policy.
    pub mod tas {
        use crate::relax::Yield;
        use crate::spin::TasLock;

        /// A [`Mutex`] over a [`TasLock`] that implements the [`Yield`] relax
        /// policy.
        ///
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, TasLock<Yield>>;
    }

    /// A backoff lock that implements a `yield` relax policy.
    pub mod backoff {
        use crate::relax::Yield;
        use crate::spin::BackoffLock;

        /// A [`Mutex`] over a [`BackoffLock`] that implements the [`Yield`]
        /// relax policy.
        ///
        /// [`Mutex`]: crate::Mutex
        pub type Mutex<T> = crate::Mutex<T, BackoffLock<Yield>>;
    }
}
