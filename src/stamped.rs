//! A versioned reference: a small payload paired with a version stamp, both
//! updated by a single compare-and-swap.
//!
//! The payload is an optional index into some fixed pool of nodes, which is
//! exactly what a queue tail needs. Since indices of a small pool are reused
//! all the time, comparing payloads alone is subject to the ABA hazard: a
//! thread may observe index `i`, get preempted while `i` is released and
//! reclaimed by others, and then wrongly succeed a swap against the "same"
//! `i`. Every update is therefore expected to advance the [`Stamp`], so a
//! compare-and-swap against a stale snapshot fails even if the payload has
//! cycled back to the observed value.
//!
//! The stamp also carries one flag bit, see [`Stamp::FAST_PATH`]. It is kept
//! apart from the version counter: incrementing the counter never changes the
//! flag, and toggling the flag never changes the counter.

use core::fmt::{self, Debug, Formatter};
use core::sync::atomic::Ordering;

use crate::cfg::atomic::AtomicU64;

/// The version stamp of a [`Stamped`] reference.
///
/// Bits `0..=30` hold a wrapping version counter and bit `31` holds the fast
/// path flag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stamp(u32);

impl Stamp {
    /// The bit reserved for the "fast path active" flag.
    pub const FAST_PATH: u32 = 1 << 31;

    /// The bits reserved for the version counter.
    pub const COUNTER: u32 = !Self::FAST_PATH;

    /// The initial stamp: counter at zero, flag clear.
    pub const ZERO: Self = Self(0);

    /// Creates a stamp from its raw bit representation.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bit representation of this stamp.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns the version counter, without the flag.
    #[must_use]
    pub const fn counter(self) -> u32 {
        self.0 & Self::COUNTER
    }

    /// Returns the stamp with the counter advanced by one.
    ///
    /// The counter wraps around inside its own bits, the flag is preserved.
    ///
    /// # Examples
    ///
    /// ```
    /// use compositelock::stamped::Stamp;
    ///
    /// let max = Stamp::from_bits(Stamp::COUNTER).with_fast_path();
    /// let next = max.next();
    /// assert_eq!(next.counter(), 0);
    /// assert!(next.is_fast_path());
    /// ```
    #[must_use]
    pub const fn next(self) -> Self {
        let counter = self.0.wrapping_add(1) & Self::COUNTER;
        Self((self.0 & Self::FAST_PATH) | counter)
    }

    /// Returns `true` if the fast path flag is set.
    #[must_use]
    pub const fn is_fast_path(self) -> bool {
        self.0 & Self::FAST_PATH != 0
    }

    /// Returns the stamp with the fast path flag set.
    #[must_use]
    pub const fn with_fast_path(self) -> Self {
        Self(self.0 | Self::FAST_PATH)
    }

    /// Returns the stamp with the fast path flag cleared.
    #[must_use]
    pub const fn without_fast_path(self) -> Self {
        Self(self.0 & Self::COUNTER)
    }
}

impl Debug for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stamp")
            .field("counter", &self.counter())
            .field("fast_path", &self.is_fast_path())
            .finish()
    }
}

/// A snapshot of an [`AtomicStamped`]: an optional pool index and a stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stamped {
    payload: Option<u32>,
    stamp: Stamp,
}

impl Stamped {
    /// Creates a new snapshot.
    ///
    /// `u32::MAX` is not a valid payload, it is reserved for the encoding.
    #[must_use]
    pub const fn new(payload: Option<u32>, stamp: Stamp) -> Self {
        debug_assert!(!matches!(payload, Some(u32::MAX)));
        Self { payload, stamp }
    }

    /// An empty payload with a zero stamp.
    pub const EMPTY: Self = Self::new(None, Stamp::ZERO);

    /// Returns the payload.
    #[must_use]
    pub const fn payload(self) -> Option<u32> {
        self.payload
    }

    /// Returns the stamp.
    #[must_use]
    pub const fn stamp(self) -> Stamp {
        self.stamp
    }

    const fn pack(self) -> u64 {
        let payload = match self.payload {
            Some(index) => index as u64 + 1,
            None => 0,
        };
        (payload << 32) | self.stamp.bits() as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn unpack(bits: u64) -> Self {
        let payload = match (bits >> 32) as u32 {
            0 => None,
            encoded => Some(encoded - 1),
        };
        let stamp = Stamp::from_bits(bits as u32);
        Self { payload, stamp }
    }
}

/// An atomically updatable [`Stamped`] reference.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::Ordering::{Acquire, Relaxed};
/// use compositelock::stamped::{AtomicStamped, Stamped};
///
/// let tail = AtomicStamped::new(Stamped::EMPTY);
/// let seen = tail.load(Relaxed);
/// let claimed = Stamped::new(Some(2), seen.stamp().next());
///
/// assert!(tail.compare_exchange(seen, claimed, Acquire, Relaxed).is_ok());
/// // The old snapshot is stale now.
/// assert!(tail.compare_exchange(seen, claimed, Acquire, Relaxed).is_err());
/// ```
pub struct AtomicStamped {
    inner: AtomicU64,
}

impl AtomicStamped {
    /// Creates a new atomic reference holding `value` (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new(value: Stamped) -> Self {
        Self { inner: AtomicU64::new(value.pack()) }
    }

    /// Creates a new atomic reference holding `value` (loom, non-const).
    #[cfg(all(loom, test))]
    #[cfg(not(tarpaulin_include))]
    pub fn new(value: Stamped) -> Self {
        Self { inner: AtomicU64::new(value.pack()) }
    }

    /// Loads the current payload and stamp.
    #[inline]
    pub fn load(&self, order: Ordering) -> Stamped {
        Stamped::unpack(self.inner.load(order))
    }

    /// Stores `value` unconditionally.
    #[inline]
    pub fn store(&self, value: Stamped, order: Ordering) {
        self.inner.store(value.pack(), order);
    }

    /// Stores `new` if both the payload and the stamp equal `current`.
    ///
    /// # Errors
    ///
    /// Returns the actual value if it did not match `current`.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: Stamped,
        new: Stamped,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Stamped, Stamped> {
        self.inner
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(Stamped::unpack)
            .map_err(Stamped::unpack)
    }

    /// Like [`compare_exchange`], but allowed to fail spuriously.
    ///
    /// # Errors
    ///
    /// Returns the actual value if the exchange did not take place.
    ///
    /// [`compare_exchange`]: AtomicStamped::compare_exchange
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: Stamped,
        new: Stamped,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Stamped, Stamped> {
        self.inner
            .compare_exchange_weak(current.pack(), new.pack(), success, failure)
            .map(Stamped::unpack)
            .map_err(Stamped::unpack)
    }
}

impl Debug for AtomicStamped {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
    use std::sync::Barrier;
    use std::thread;

    use proptest::prelude::*;

    use super::{AtomicStamped, Stamp, Stamped};

    #[test]
    fn empty_round_trips() {
        let tail = AtomicStamped::new(Stamped::EMPTY);
        assert_eq!(tail.load(Relaxed), Stamped::EMPTY);
        let value = Stamped::new(Some(0), Stamp::ZERO.next().with_fast_path());
        tail.store(value, Relaxed);
        assert_eq!(tail.load(Relaxed), value);
    }

    #[test]
    fn stale_stamp_rejects_recycled_payload() {
        let tail = AtomicStamped::new(Stamped::new(Some(1), Stamp::ZERO));
        let stale = tail.load(Acquire);
        let barrier = Barrier::new(2);

        thread::scope(|s| {
            s.spawn(|| {
                // Release node 1, then reclaim it: the payload cycles back.
                let seen = tail.load(Acquire);
                let released = Stamped::new(None, seen.stamp().next());
                tail.compare_exchange(seen, released, AcqRel, Acquire).unwrap();
                let reclaimed = Stamped::new(Some(1), released.stamp().next());
                tail.compare_exchange(released, reclaimed, AcqRel, Acquire).unwrap();
                barrier.wait();
            });
            barrier.wait();
        });

        let current = tail.load(Acquire);
        assert_eq!(current.payload(), stale.payload());
        let new = Stamped::new(None, stale.stamp().next());
        let err = tail.compare_exchange(stale, new, AcqRel, Acquire).unwrap_err();
        assert_eq!(err, current);
    }

    #[test]
    fn only_one_winner_per_stamp() {
        const THREADS: u32 = 8;
        let tail = AtomicStamped::new(Stamped::EMPTY);
        let seen = tail.load(Acquire);
        let barrier = Barrier::new(THREADS as usize);
        let winners: u32 = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|index| {
                    let (tail, barrier) = (&tail, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        let new = Stamped::new(Some(index), seen.stamp().next());
                        u32::from(tail.compare_exchange(seen, new, AcqRel, Acquire).is_ok())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn packed_layout() {
        let stamp = Stamp::from_bits(5).with_fast_path();
        let value = Stamped::new(Some(2), stamp);
        assert_eq!(value.pack(), (3 << 32) | u64::from(stamp.bits()));
        assert_eq!(Stamped::unpack(value.pack()), value);
        assert_eq!(Stamped::new(None, Stamp::from_bits(7)).pack(), 7);
    }

    #[test]
    fn debug_shows_fields() {
        let stamp = Stamp::ZERO.next().with_fast_path();
        let repr = format!("{stamp:?}");
        assert_eq!(repr, "Stamp { counter: 1, fast_path: true }");
    }

    proptest! {
        #[test]
        fn next_keeps_flag(bits: u32) {
            let stamp = Stamp::from_bits(bits);
            let next = stamp.next();
            prop_assert_eq!(next.is_fast_path(), stamp.is_fast_path());
            prop_assert_eq!(next.counter(), stamp.counter().wrapping_add(1) & Stamp::COUNTER);
        }

        #[test]
        fn flag_keeps_counter(bits: u32) {
            let stamp = Stamp::from_bits(bits);
            prop_assert_eq!(stamp.with_fast_path().counter(), stamp.counter());
            prop_assert_eq!(stamp.without_fast_path().counter(), stamp.counter());
            prop_assert!(stamp.with_fast_path().is_fast_path());
            prop_assert!(!stamp.without_fast_path().is_fast_path());
        }

        #[test]
        fn pack_is_lossless(payload in proptest::option::of(0u32..u32::MAX), bits: u32) {
            let value = Stamped::new(payload, Stamp::from_bits(bits));
            prop_assert_eq!(Stamped::unpack(value.pack()), value);
        }
    }
}
