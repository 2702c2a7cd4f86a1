pub mod models {
    use core::array;

    use loom::sync::Arc;
    use loom::{model, thread};

    use crate::lock::{RawLock, RawTryLock};
    use crate::mutex::Mutex;
    use crate::test::{get, inc, try_inc, Int};

    /// Get a copy of the shared integer, converting it to usize.
    ///
    /// Panics if the cast fails.
    fn get_unwrap<L: RawLock>(mutex: &Mutex<Int, L>) -> usize {
        get(mutex).try_into().unwrap()
    }

    // Three or more lockers make the queue lock models run for too long.
    const LOCKS: usize = 2;
    const TRY_LOCKS: usize = 3;

    /// Evaluates that concurrent `try_lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn try_lock_join<L: RawTryLock + 'static>() {
        model(|| {
            const RUNS: usize = TRY_LOCKS;
            let mutex = Arc::new(Mutex::<Int, L>::new(0));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || try_inc(&mutex))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&mutex);
            assert!((1..=RUNS).contains(&value));
        });
    }

    /// Evaluates that concurrent `lock` calls will serialize all mutations
    /// against the shared data, therefore no data races.
    pub fn lock_join<L: RawLock + 'static>() {
        model(|| {
            const RUNS: usize = LOCKS;
            let mutex = Arc::new(Mutex::<Int, L>::new(0));
            let handles: [_; RUNS] = array::from_fn(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || inc(&mutex))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&mutex);
            assert_eq!(RUNS, value);
        });
    }

    /// Evaluates that concurrent `lock` and `try_lock` calls will serialize
    /// all mutations against the shared data, therefore no data races.
    pub fn mixed_lock_join<L: RawTryLock + 'static>() {
        model(|| {
            const RUNS: usize = LOCKS;
            let mutex = Arc::new(Mutex::<Int, L>::new(0));
            let handles: [_; RUNS] = array::from_fn(|run| {
                let mutex = Arc::clone(&mutex);
                let f = if run % 2 == 0 { inc } else { try_inc };
                thread::spawn(move || f(&mutex))
            });
            for handle in handles {
                handle.join().unwrap();
            }
            let value = get_unwrap(&mutex);
            assert!((1..=RUNS).contains(&value));
        });
    }
}
