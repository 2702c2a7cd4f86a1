use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use compositelock::composite::CompositeLock;
use compositelock::relax::Spin;

// Requires the `lock_api` feature.
//
// You may export this types to your callers, change the inner lock type
// (as long as it implements the same raw mutex interfaces), without breaking
// their code.
//
// Maybe a `TimeoutLock` is better for your use case? Switch it!
pub type Mutex<T> = compositelock::lock_api::Mutex<T, CompositeLock<Spin>>;
pub type MutexGuard<'a, T> = compositelock::lock_api::MutexGuard<'a, T, CompositeLock<Spin>>;

fn main() {
    const N: usize = 10;

    // Spawn a few threads to increment a shared variable (non-atomically), and
    // let the main thread know once all increments are done.
    //
    // Here we're using an Arc to share memory among threads, and the data inside
    // the Arc is protected with a mutex.
    let data = Arc::new(Mutex::new(0));

    let (tx, rx) = channel();
    for _ in 0..N {
        let (data, tx) = (data.clone(), tx.clone());
        thread::spawn(move || {
            // The shared state can only be accessed once the lock is held.
            // Our non-atomic increment is safe because we're the only thread
            // which can access the shared state when the lock is held.
            let mut data: MutexGuard<'_, usize> = data.lock();
            *data += 1;
            if *data == N {
                tx.send(()).unwrap();
            }
            // the lock is unlocked here when `data` goes out of scope.
        });
    }
    let _message = rx.recv();

    // Would return `None` if the lock could not be taken within 10ms.
    let count = data.try_lock_for(Duration::from_millis(10)).unwrap();
    assert_eq!(*count, N);
    // lock is unlock here when `count` goes out of scope.
}
