//! A family of spin based [mutual exclusion] locks, from a plain test-and-set
//! flag up to a composite queue lock with timeouts and an uncontended fast
//! path.
//!
//! Every algorithm implements the same [`RawLock`] contract, so they are
//! drop-in substitutable behind the data carrying [`Mutex`]:
//!
//! | Lock                         | Fair | Bounded wait | `try_lock` |
//! |------------------------------|------|--------------|------------|
//! | [`spin::TasLock`]            | no   | no           | yes        |
//! | [`spin::TtasLock`]           | no   | no           | yes        |
//! | [`spin::BackoffLock`]        | no   | no           | yes        |
//! | [`array::ArrayLock`]         | FIFO | no           | yes        |
//! | [`array::PaddedArrayLock`]   | FIFO | no           | yes        |
//! | [`clh::ClhLock`]             | FIFO | no           | no         |
//! | [`timeout::TimeoutLock`]     | FIFO | yes          | yes        |
//! | [`composite::CompositeLock`] | FIFO | yes          | yes        |
//! | [`composite::FastPathLock`]  | FIFO | yes          | yes        |
//! | [`monitor::MonitorLock`]     | no   | no           | yes        |
//!
//! Locks with a bounded wait implement [`RawTimedLock`]: an acquisition with a
//! deadline either returns the lock or an [`AcquisitionTimeout`], and a timed
//! out attempt leaves nothing behind for the caller to clean up. Their plain
//! [`lock`] retries bounded attempts until one succeeds.
//!
//! ## Use cases
//!
//! [Spinlocks are usually not what you want]. The majority of use cases are well
//! covered by OS-based mutexes like [`std::sync::Mutex`] or [`parking_lot::Mutex`].
//! These implementations will notify the system that the waiting thread should
//! be parked, freeing the processor to work on something else.
//!
//! The locks of this crate are meant for studying and comparing spinning
//! strategies under contention. The [`monitor`] lock, which does park waiters,
//! is included as the baseline to compare them against.
//!
//! ## Relax policies
//!
//! Waiting loops of every spinning lock are generic over a [`Relax`] policy,
//! and each lock module exports `spins` and `yields` aliases that pair the
//! [`Mutex`] with the [`Spin`] and [`Yield`] policies respectively.
//!
//! ## Logging
//!
//! Timeouts, abandoned queue nodes and retry sleeps are reported as
//! [`tracing`] events at the `trace` and `debug` levels. Nothing is emitted
//! unless the application installs a subscriber.
//!
//! ## Features
//!
//! This crate does not provide any default features. Features that can be enabled
//! are:
//!
//! ### lock_api
//!
//! This feature implements the [`RawMutex`] trait from the [lock_api] crate for
//! an adapter over the locks of this crate that support `try_lock`, and
//! [`RawMutexTimed`] for those with a bounded wait. Aliases are provided by the
//! [`lock_api`] module.
//!
//! [mutual exclusion]: https://en.wikipedia.org/wiki/Lock_(computer_science)
//! [`lock`]: RawLock::lock
//! [`Relax`]: relax::Relax
//! [`Spin`]: relax::Spin
//! [`Yield`]: relax::Yield
//! [`std::sync::Mutex`]: https://doc.rust-lang.org/std/sync/struct.Mutex.html
//! [`parking_lot::Mutex`]: https://docs.rs/parking_lot/latest/parking_lot/type.Mutex.html
//! [lock_api]: https://docs.rs/lock_api/latest/lock_api
//! [`RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html
//! [`RawMutexTimed`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutexTimed.html
//! [Spinlocks are usually not what you want]: https://matklad.github.io/2020/01/02/spinlocks-considered-harmful.html

#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use error::AcquisitionTimeout;
pub use lock::{ConstInit, RawLock, RawTimedLock, RawTryLock};
pub use mutex::{Mutex, MutexGuard};

pub mod account;
pub mod array;
pub mod backoff;
pub mod clh;
pub mod composite;
pub mod monitor;
pub mod relax;
pub mod spin;
pub mod stamped;
pub mod timeout;

#[cfg(all(feature = "lock_api", not(loom)))]
#[cfg_attr(docsrs, doc(cfg(feature = "lock_api")))]
pub mod lock_api;

pub(crate) mod cfg;

mod error;
mod lock;
mod mutex;

#[cfg(test)]
pub(crate) mod test;

#[cfg(all(loom, test))]
pub(crate) mod loom;
