use core::array;
use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::cfg::atomic::AtomicUsize;
use crate::relax::{self, Relax};

/// The number of slots of the circular array.
pub const CAPACITY: usize = 20;

/// A slot of the circular array, holding the ticket currently allowed in.
pub trait Slot {
    /// Creates a slot that lets `ticket` in.
    fn new(ticket: usize) -> Self;

    /// Returns the turn of this slot.
    fn turn(&self) -> &AtomicUsize;
}

/// A slot laid out right next to its neighbours.
#[repr(transparent)]
pub struct Packed(AtomicUsize);

impl Slot for Packed {
    fn new(ticket: usize) -> Self {
        Self(AtomicUsize::new(ticket))
    }

    fn turn(&self) -> &AtomicUsize {
        &self.0
    }
}

/// A slot aligned to a pair of cache lines, so no two slots ever share one,
/// including on targets that prefetch lines in pairs.
#[repr(align(128))]
pub struct Padded(AtomicUsize);

impl Slot for Padded {
    fn new(ticket: usize) -> Self {
        Self(AtomicUsize::new(ticket))
    }

    fn turn(&self) -> &AtomicUsize {
        &self.0
    }
}

/// The circular array queue shared by both array locks.
///
/// A thread draws a ticket from `next` and waits on slot `ticket % CAPACITY`
/// until that slot's turn equals its ticket. Releasing hands the turn to the
/// slot of the following ticket. Since a slot remembers which ticket it lets
/// in, rather than a plain flag, threads beyond the capacity only share a
/// slot and wait for their round instead of entering together.
pub struct Queue<S, R> {
    next: AtomicUsize,
    slots: [S; CAPACITY],
    marker: PhantomData<fn() -> R>,
}

impl<S: Slot, R> Queue<S, R> {
    /// Creates a new queue that lets the first ticket in.
    pub fn new() -> Self {
        // No ticket maps to `usize::MAX` until the counter comes close to
        // wrapping, and by then every slot was overwritten.
        let slots = array::from_fn(|index| S::new(if index == 0 { 0 } else { usize::MAX }));
        Self { next: AtomicUsize::new(0), slots, marker: PhantomData }
    }

    fn slot(&self, ticket: usize) -> &AtomicUsize {
        self.slots[ticket % CAPACITY].turn()
    }

    /// Returns `true` if the next ticket would have to wait.
    pub fn is_locked(&self) -> bool {
        let next = self.next.load(Relaxed);
        self.slot(next).load(Relaxed) != next
    }

    /// Releases the lock held by `ticket`.
    pub fn unlock(&self, ticket: usize) {
        debug_assert_eq!(self.slot(ticket).load(Relaxed), ticket, "ticket does not hold the lock");
        let next = ticket.wrapping_add(1);
        self.slot(next).store(next, Release);
    }
}

impl<S: Slot, R: Relax> Queue<S, R> {
    /// Draws a ticket and waits for its turn.
    pub fn lock(&self) -> usize {
        let ticket = self.next.fetch_add(1, Relaxed);
        let slot = self.slot(ticket);
        relax::spin_until::<R, _>(|| slot.load(Acquire) == ticket);
        ticket
    }

    /// Draws a ticket only if it is allowed in right away.
    pub fn try_lock(&self) -> Option<usize> {
        let ticket = self.next.load(Relaxed);
        let true = self.slot(ticket).load(Acquire) == ticket else { return None };
        let next = ticket.wrapping_add(1);
        self.next.compare_exchange(ticket, next, Relaxed, Relaxed).ok()
    }
}

impl<S, R> Debug for Queue<S, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("next", &self.next.load(Relaxed))
            .field("capacity", &CAPACITY)
            .finish()
    }
}
