use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};

use compositelock::array::{ArrayLock, PaddedArrayLock};
use compositelock::clh::ClhLock;
use compositelock::composite::{CompositeLock, FastPathLock};
use compositelock::monitor::MonitorLock;
use compositelock::relax::Spin;
use compositelock::spin::{BackoffLock, TasLock, TtasLock};
use compositelock::timeout::TimeoutLock;
use compositelock::{Mutex, RawLock};

fn gen_lock_unlock<L: RawLock>(bencher: &mut Bencher) {
    let mutex = Mutex::<u32, L>::new(0);

    bencher.iter(|| {
        let mut guard = mutex.lock();
        *guard = guard.wrapping_add(1);
        drop(guard);
    });
}

fn gen_lock_unlock_read_contention<L: RawLock + 'static>(bencher: &mut Bencher) {
    let data = Arc::new(Mutex::<u32, L>::new(0));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        move || {
            while Arc::strong_count(&data) > 1 {
                for _ in 0..1000 {
                    black_box(*data.lock());
                }
            }
        }
    });

    bencher.iter(|| {
        let mut data = data.lock();
        *data = data.wrapping_add(1);
        drop(data);
    });

    drop(data);
    thread.join().unwrap();
}

fn gen_lock_unlock_write_contention<L: RawLock + 'static>(bencher: &mut Bencher) {
    let data = Arc::new(Mutex::<u32, L>::new(0));

    let thread = thread::spawn({
        let data = Arc::clone(&data);
        move || {
            while Arc::strong_count(&data) > 1 {
                for _ in 0..1000 {
                    let mut m = data.lock();
                    *m = m.wrapping_add(1);
                    drop(m);
                }
            }
        }
    });

    bencher.iter(|| {
        let mut m = data.lock();
        *m = m.wrapping_add(1);
        drop(m);
    });

    drop(data);
    thread.join().unwrap();
}

fn bench_lock<L: RawLock + 'static>(criterion: &mut Criterion, name: &str) {
    let mut group = criterion.benchmark_group(name);
    group.bench_function("lock_unlock", gen_lock_unlock::<L>);
    group.bench_function("read_contention", gen_lock_unlock_read_contention::<L>);
    group.bench_function("write_contention", gen_lock_unlock_write_contention::<L>);
    group.finish();
}

fn flag_locks(criterion: &mut Criterion) {
    bench_lock::<TasLock<Spin>>(criterion, "tas");
    bench_lock::<TtasLock<Spin>>(criterion, "ttas");
    bench_lock::<BackoffLock<Spin>>(criterion, "backoff");
}

fn queue_locks(criterion: &mut Criterion) {
    bench_lock::<ArrayLock<Spin>>(criterion, "array");
    bench_lock::<PaddedArrayLock<Spin>>(criterion, "padded_array");
    bench_lock::<ClhLock<Spin>>(criterion, "clh");
}

fn bounded_locks(criterion: &mut Criterion) {
    bench_lock::<TimeoutLock<Spin>>(criterion, "timeout");
    bench_lock::<CompositeLock<Spin>>(criterion, "composite");
    bench_lock::<FastPathLock<Spin>>(criterion, "fast_path");
}

fn blocking_locks(criterion: &mut Criterion) {
    bench_lock::<MonitorLock>(criterion, "monitor");
}

criterion_group!(locks, flag_locks, queue_locks, bounded_locks, blocking_locks);
criterion_main!(locks);
