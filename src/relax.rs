// Modified version of relax.rs from spin-rs to support Loom yielding.
//
// Original file at its most recent change (at the time of writing):
// https://github.com/mvdnes/spin-rs/blob/5860ee114094cf200b97348ff332155fbd7159b4/src/relax.rs
//
// Copyright (c) 2014 Mathijs van de Nes
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Strategies that determine how a waiting thread burns time while it re-tests
//! a shared location.
//!
//! Every spinning lock of this crate is generic over one of these strategies.
//! They only govern the busy-wait loops (waiting on a flag, a predecessor or a
//! queue slot). The randomized, sleep-based delays used after a failed atomic
//! attempt are a separate concern, see [`Backoff`].
//!
//! [`Backoff`]: crate::backoff::Backoff

use crate::cfg::{hint, thread};

/// A trait implemented by spinning relax strategies.
pub trait Relax {
    /// Initialize the state for the relaxing operation, if any.
    fn new() -> Self;

    /// Perform the relaxing operation during a period of contention.
    fn relax(&mut self);
}

/// A strategy that rapidly spins while informing the CPU that it should power
/// down non-essential components via [`core::hint::spin_loop`].
///
/// Note that spinning is a 'dumb' strategy and most schedulers cannot correctly
/// differentiate it from useful work, thereby misallocating even more CPU time
/// to the spinning process. This is known as [priority inversion].
///
/// If you see signs that priority inversion is occurring, consider switching to
/// [`Yield`] or, even better, to one of the bounded locks of this crate, which
/// give up and sleep once their patience runs out.
///
/// [priority inversion]: https://matklad.github.io/2020/01/02/spinlocks-considered-harmful.html
#[derive(Debug)]
pub struct Spin;

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// A strategy that yields the current time slice to the scheduler in favour of
/// other threads or processes.
///
/// Queue locks degrade badly when there are more waiting threads than cores,
/// since the thread that should run next may not be scheduled at all. Yielding
/// gives it a chance to run.
///
/// When running Loom models, this calls Loom's `yield_now` to tell Loom that
/// another thread needs to be scheduled in order for the current one to make
/// progress.
#[derive(Debug)]
pub struct Yield;

impl Relax for Yield {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline]
    fn relax(&mut self) {
        thread::yield_now();
    }
}

/// A strategy that rapidly spins, without telling the CPU to do any powering down.
///
/// You almost certainly do not want to use this. Use [`Spin`] instead. It exists
/// for completeness and for targets that, for some reason, miscompile or do not
/// support spin hint intrinsics despite attempting to generate code for them
/// (i.e: this is a workaround for possible compiler bugs).
#[derive(Debug)]
pub struct Loop;

impl Relax for Loop {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn relax(&mut self) {}
}

/// Spins with `R` until `done` returns `true`.
#[inline]
pub(crate) fn spin_until<R: Relax, F: FnMut() -> bool>(mut done: F) {
    let mut relax = R::new();
    while !done() {
        relax.relax();
    }
}
