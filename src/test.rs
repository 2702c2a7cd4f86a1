use crate::lock::{RawLock, RawTryLock};
use crate::mutex::Mutex;

/// An arbitrary unsigned integer type.
pub type Int = u32;

/// Get a copy of the mutex protected data.
pub fn get<L: RawLock>(mutex: &Mutex<Int, L>) -> Int {
    mutex.lock_then(|data| *data)
}

/// Increments a shared integer.
pub fn inc<L: RawLock>(mutex: &Mutex<Int, L>) {
    mutex.lock_then(|data| *data += 1);
}

/// Tries to increment a shared integer.
pub fn try_inc<L: RawTryLock>(mutex: &Mutex<Int, L>) {
    mutex.try_lock_then(|data| {
        if let Some(data) = data {
            *data += 1;
        }
    });
}

#[cfg(all(not(loom), test))]
pub mod tests {
    // Modified test suite from the Rust's Mutex implementation with minor changes
    // since the API is not compatible with this crate implementation and some
    // new tests as well.
    //
    // Copyright 2014 The Rust Project Developers.
    //
    // Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
    // http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
    // <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
    // option. This file may not be copied, modified, or distributed
    // except according to those terms.

    use core::ops::RangeInclusive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{get, inc, try_inc, Int};
    use crate::lock::{RawLock, RawTimedLock, RawTryLock};
    use crate::mutex::Mutex;

    #[derive(Eq, PartialEq, Debug)]
    pub struct NonCopy(u32);

    pub struct Foo(Arc<AtomicUsize>);

    impl Drop for Foo {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    const ITERS: Int = 1000;
    const THREADS: Int = 4;
    const EXPECTED_VALUE: Int = ITERS * THREADS;
    const EXPECTED_RANGE: RangeInclusive<Int> = 1..=EXPECTED_VALUE;

    /// How long a spawned waiter is given to enqueue itself.
    const ENQUEUE_DELAY: Duration = Duration::from_millis(50);

    /// A deadline far enough that it is never reached by a healthy lock.
    const LONG_WAIT: Duration = Duration::from_secs(30);

    fn lock_inc_for<L: RawLock, const END: Int>(mutex: &Mutex<Int, L>) {
        for _ in 0..END {
            inc(mutex);
        }
    }

    fn try_lock_inc_for<L: RawTryLock, const END: Int>(mutex: &Mutex<Int, L>) {
        for _ in 0..END {
            try_inc(mutex);
        }
    }

    fn mixed_lock_inc_for<L: RawTryLock, const END: Int>(mutex: &Mutex<Int, L>) {
        for r in 0..END {
            let f = if r % 2 == 0 { inc } else { try_inc };
            f(mutex);
        }
    }

    fn timed_lock_inc_for<L: RawTimedLock, const END: Int>(mutex: &Mutex<Int, L>) {
        for _ in 0..END {
            if let Ok(mut data) = mutex.try_lock_for(LONG_WAIT) {
                *data += 1;
            }
        }
    }

    fn lots_and_lots<L, const THREADS: Int>(f: fn(&Mutex<Int, L>)) -> Int
    where
        L: RawLock + 'static,
    {
        let mutex = Arc::new(Mutex::new(0));
        let (tx, rx) = channel();
        for _ in 0..THREADS {
            let c_mutex = Arc::clone(&mutex);
            let c_tx = tx.clone();
            thread::spawn(move || {
                f(&c_mutex);
                c_tx.send(()).unwrap();
            });
        }
        drop(tx);
        for _ in 0..THREADS {
            rx.recv().unwrap();
        }
        get(&mutex)
    }

    pub fn lots_and_lots_lock<L: RawLock + 'static>() {
        let value = lots_and_lots::<L, THREADS>(lock_inc_for::<L, ITERS>);
        assert_eq!(value, EXPECTED_VALUE);
    }

    pub fn lots_and_lots_try_lock<L: RawTryLock + 'static>() {
        let value = lots_and_lots::<L, THREADS>(try_lock_inc_for::<L, ITERS>);
        assert!(EXPECTED_RANGE.contains(&value));
    }

    pub fn lots_and_lots_mixed_lock<L: RawTryLock + 'static>() {
        let value = lots_and_lots::<L, THREADS>(mixed_lock_inc_for::<L, ITERS>);
        assert!(EXPECTED_RANGE.contains(&value));
    }

    pub fn lots_and_lots_timed_lock<L: RawTimedLock + 'static>() {
        let value = lots_and_lots::<L, THREADS>(timed_lock_inc_for::<L, ITERS>);
        assert_eq!(value, EXPECTED_VALUE);
    }

    /// At most one thread is ever inside the critical section.
    pub fn mutual_exclusion<L: RawLock>() {
        let mutex = Mutex::<Int, L>::new(0);
        let inside = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..ITERS {
                        mutex.lock_then(|data| {
                            let others = inside.fetch_add(1, Ordering::Relaxed);
                            assert_eq!(others, 0);
                            *data += 1;
                            core::hint::spin_loop();
                            inside.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                });
            }
        });
        assert_eq!(mutex.into_inner(), EXPECTED_VALUE);
    }

    /// Mixed increases and decreases of random amounts leave the counter at
    /// the exact signed sum of every operation.
    pub fn no_lost_updates<L: RawLock>() {
        const INITIAL: i64 = 1_000;
        let mutex = Mutex::<i64, L>::new(INITIAL);
        let sum: i64 = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|seed| {
                    let mutex = &mutex;
                    s.spawn(move || {
                        let mut rng = StdRng::seed_from_u64(u64::from(seed));
                        let mut sum = 0;
                        for _ in 0..ITERS {
                            let amount = rng.gen_range(0..1000);
                            let amount = if rng.gen() { amount } else { -amount };
                            mutex.lock_then(|balance| *balance += amount);
                            sum += amount;
                        }
                        sum
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).sum()
        });
        assert_eq!(mutex.into_inner(), INITIAL + sum);
    }

    /// Waiters that enqueue one after the other are served in that order.
    ///
    /// The main thread holds the lock while `waiters` threads are spawned,
    /// each given time to enqueue before the next one starts.
    pub fn fifo_order<L: RawLock>(waiters: usize) {
        fifo_order_with::<L>(waiters, |mutex, index| mutex.lock().push(index));
    }

    /// Same as [`fifo_order`], but waiters acquire through a bounded attempt
    /// with a deadline that is never reached.
    pub fn fifo_order_timed<L: RawTimedLock>(waiters: usize) {
        fifo_order_with::<L>(waiters, |mutex, index| {
            mutex.try_lock_for(LONG_WAIT).unwrap().push(index);
        });
    }

    fn fifo_order_with<L: RawLock>(waiters: usize, f: fn(&Mutex<Vec<usize>, L>, usize)) {
        let mutex = Mutex::<Vec<usize>, L>::new(Vec::new());
        thread::scope(|s| {
            let guard = mutex.lock();
            for index in 0..waiters {
                let mutex = &mutex;
                s.spawn(move || f(mutex, index));
                thread::sleep(ENQUEUE_DELAY);
            }
            drop(guard);
        });
        let expected: Vec<_> = (0..waiters).collect();
        assert_eq!(mutex.into_inner(), expected);
    }

    /// A bounded attempt against a lock that is held for longer than the
    /// deadline fails at, or shortly after, the deadline.
    pub fn bounded_wait<L: RawTimedLock>() {
        const TIMEOUT: Duration = Duration::from_millis(20);
        let mutex = Mutex::<Int, L>::new(0);
        let guard = mutex.lock();
        thread::scope(|s| {
            let handle = s.spawn(|| {
                let start = Instant::now();
                let result = mutex.try_lock_for(TIMEOUT).map(drop);
                (result, start.elapsed())
            });
            let (result, elapsed) = handle.join().unwrap();
            assert!(result.is_err());
            assert!(elapsed >= TIMEOUT);
            assert!(elapsed < LONG_WAIT);
        });
        drop(guard);
        // A timed out attempt must leave the lock fully usable.
        assert!(mutex.try_lock_for(LONG_WAIT).is_ok());
        inc(&mutex);
        assert_eq!(get(&mutex), 1);
    }

    /// Many bounded attempts time out while the lock is held, after which
    /// every waiter must still be able to get in.
    pub fn timeouts_leave_lock_usable<L: RawTimedLock>() {
        let mutex = Mutex::<Int, L>::new(0);
        thread::scope(|s| {
            let guard = mutex.lock();
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        let failures = (0..10)
                            .filter(|_| mutex.try_lock_for(Duration::from_micros(200)).is_err())
                            .count();
                        assert_eq!(failures, 10);
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            drop(guard);
            for _ in 0..THREADS {
                s.spawn(|| lock_inc_for::<L, ITERS>(&mutex));
            }
        });
        assert_eq!(mutex.into_inner(), EXPECTED_VALUE);
    }

    pub fn smoke<L: RawLock>() {
        let mutex = Mutex::<Int, L>::new(1);
        drop(mutex.lock());
        drop(mutex.lock());
    }

    pub fn test_guard_debug_display<L: RawLock>() {
        let value = 42;
        let mutex = Mutex::<Int, L>::new(value);
        let guard = mutex.lock();
        assert_eq!(format!("{value:?}"), format!("{guard:?}"));
        assert_eq!(format!("{value}"), format!("{guard}"));
    }

    pub fn test_mutex_debug<L: RawTryLock>() {
        let value = 42;
        let mutex = Mutex::<Int, L>::new(value);
        let msg = format!("Mutex {{ data: {value:?} }}");
        assert_eq!(msg, format!("{mutex:?}"));

        let guard = mutex.lock();
        let msg = "Mutex { data: <locked> }".to_string();
        assert_eq!(msg, format!("{mutex:?}"));
        drop(guard);
    }

    pub fn test_mutex_default<L: RawLock>() {
        let mutex: Mutex<Int, L> = Default::default();
        assert_eq!(Int::default(), mutex.into_inner());
    }

    pub fn test_mutex_from<L: RawLock>() {
        let value = 42;
        let mutex = Mutex::<Int, L>::from(value);
        assert_eq!(value, mutex.into_inner());
    }

    pub fn test_try_lock<L: RawTryLock>() {
        let mutex = Mutex::<(), L>::new(());
        assert!(!mutex.is_locked());
        mutex.try_lock_then(|data| {
            assert!(mutex.is_locked());
            assert!(mutex.try_lock().is_none());
            *data.unwrap() = ();
        });
        assert!(!mutex.is_locked());
        assert!(mutex.try_lock().is_some());
    }

    pub fn test_into_inner<L: RawLock>() {
        let mutex = Mutex::<NonCopy, L>::new(NonCopy(10));
        assert_eq!(mutex.into_inner(), NonCopy(10));
    }

    pub fn test_into_inner_drop<L: RawLock>() {
        let num_drops = Arc::new(AtomicUsize::new(0));
        let mutex = Mutex::<Foo, L>::new(Foo(num_drops.clone()));
        assert_eq!(num_drops.load(Ordering::SeqCst), 0);
        {
            let _inner = mutex.into_inner();
            assert_eq!(num_drops.load(Ordering::SeqCst), 0);
        }
        assert_eq!(num_drops.load(Ordering::SeqCst), 1);
    }

    pub fn test_get_mut<L: RawLock>() {
        let mut mutex = Mutex::<NonCopy, L>::new(NonCopy(10));
        *mutex.get_mut() = NonCopy(20);
        assert_eq!(mutex.into_inner(), NonCopy(20));
    }

    pub fn test_lock_arc_nested<L1, L2>()
    where
        L1: RawLock + 'static,
        L2: RawLock + 'static,
    {
        // Tests nested locks and access
        // to underlying data.
        let arc1 = Arc::new(Mutex::<Int, L1>::new(1));
        let arc2 = Arc::new(Mutex::<_, L2>::new(arc1));
        let _t = thread::spawn(move || {
            let val = arc2.lock_then(|arc1| get(arc1));
            assert_eq!(val, 1);
        })
        .join();
    }

    pub fn test_acquire_more_than_one_lock<L: RawLock + 'static>() {
        let arc = Arc::new(Mutex::<Int, L>::new(1));
        let mut threads = Vec::new();
        for _ in 0..4 {
            let c_arc = Arc::clone(&arc);
            let t = thread::spawn(move || {
                c_arc.lock_then(|_d| {
                    let mutex = Mutex::<Int, L>::new(1);
                    mutex.lock_then(|_d| ());
                });
            });
            threads.push(t);
        }
        for thread in threads {
            let _t = thread.join();
        }
    }

    pub fn test_lock_arc_access_in_unwind<L: RawLock + 'static>() {
        let arc = Arc::new(Mutex::<Int, L>::new(1));
        let arc2 = arc.clone();
        let _ = thread::spawn(move || {
            struct Unwinder<L: RawLock> {
                i: Arc<Mutex<Int, L>>,
            }
            impl<L: RawLock> Drop for Unwinder<L> {
                fn drop(&mut self) {
                    inc(&self.i);
                }
            }
            let _u = Unwinder { i: arc2 };
            panic!();
        })
        .join();
        let value = get(&arc);
        assert_eq!(value, 2);
    }

    pub fn test_lock_released_on_panic<L: RawLock + 'static>() {
        let arc = Arc::new(Mutex::<Int, L>::new(1));
        let arc2 = arc.clone();
        let result = thread::spawn(move || {
            let mut guard = arc2.lock();
            *guard += 1;
            panic!();
        })
        .join();
        assert!(result.is_err());
        assert_eq!(get(&arc), 2);
    }

    pub fn test_lock_unsized<L: RawLock>() {
        let mutex = Mutex::<[Int; 3], L>::new([1, 2, 3]);
        let mutex: &Mutex<[Int], L> = &mutex;
        mutex.lock_then(|data| {
            data[0] = 4;
            data[2] = 5;
        });
        let comp: &[Int] = &[4, 2, 5];
        assert_eq!(comp, &*mutex.lock());
    }
}
