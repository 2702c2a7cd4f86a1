use std::thread;

use compositelock::account::Account;
use compositelock::array::{ArrayLock, PaddedArrayLock};
use compositelock::clh::ClhLock;
use compositelock::composite::{CompositeLock, FastPathLock};
use compositelock::monitor::MonitorLock;
use compositelock::relax::{Spin, Yield};
use compositelock::spin::{BackoffLock, TasLock, TtasLock};
use compositelock::timeout::TimeoutLock;
use compositelock::RawLock;

const INITIAL: i64 = 1_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("compositelock=info").try_init();
}

/// Half of the threads deposit and half withdraw one unit per iteration, so
/// the final balance must equal the initial one.
fn deposit_withdrawal<L: RawLock>(threads: usize, iterations: usize) {
    init_tracing();
    let account = Account::<L>::new(INITIAL);
    thread::scope(|s| {
        for id in 0..threads {
            let account = &account;
            s.spawn(move || {
                for _ in 0..iterations {
                    if id % 2 == 0 {
                        account.increase(1);
                    } else {
                        account.decrease(1);
                    }
                }
            });
        }
    });
    assert_eq!(account.read(), INITIAL);
}

fn every_lock(threads: usize, iterations: usize) {
    deposit_withdrawal::<TasLock<Yield>>(threads, iterations);
    deposit_withdrawal::<TtasLock<Yield>>(threads, iterations);
    deposit_withdrawal::<BackoffLock<Yield>>(threads, iterations);
    deposit_withdrawal::<ArrayLock<Yield>>(threads, iterations);
    deposit_withdrawal::<PaddedArrayLock<Yield>>(threads, iterations);
    deposit_withdrawal::<ClhLock<Yield>>(threads, iterations);
    deposit_withdrawal::<TimeoutLock<Yield>>(threads, iterations);
    deposit_withdrawal::<CompositeLock<Yield>>(threads, iterations);
    deposit_withdrawal::<FastPathLock<Yield>>(threads, iterations);
    deposit_withdrawal::<MonitorLock>(threads, iterations);
}

#[test]
fn no_lost_updates() {
    every_lock(4, 2_000);
}

#[test]
fn no_lost_updates_with_spinning_waiters() {
    deposit_withdrawal::<TtasLock<Spin>>(4, 2_000);
    deposit_withdrawal::<ArrayLock<Spin>>(4, 2_000);
    deposit_withdrawal::<CompositeLock<Spin>>(4, 2_000);
    deposit_withdrawal::<FastPathLock<Spin>>(4, 2_000);
}

#[test]
fn more_threads_than_array_slots() {
    deposit_withdrawal::<ArrayLock<Yield>>(24, 200);
    deposit_withdrawal::<PaddedArrayLock<Yield>>(24, 200);
}

#[test]
#[ignore = "heavy workload, run with --ignored"]
fn no_lost_updates_heavy() {
    every_lock(10, 100_000);
}
