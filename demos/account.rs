use std::env;
use std::process::ExitCode;
use std::thread;
use std::time::Instant;

use compositelock::account::Account;
use compositelock::array::{ArrayLock, PaddedArrayLock};
use compositelock::clh::ClhLock;
use compositelock::composite::{CompositeLock, FastPathLock};
use compositelock::monitor::MonitorLock;
use compositelock::relax::Spin;
use compositelock::spin::{BackoffLock, TasLock, TtasLock};
use compositelock::timeout::TimeoutLock;
use compositelock::RawLock;
use tracing::{error, info};

const THREADS: usize = 10;
const ITERATIONS: usize = 10_000;
const INITIAL: i64 = 1_000_000;

// Usage: cargo run --example account -- [lock]
//
// Set `RUST_LOG=compositelock=trace` to see timeouts and abandoned nodes.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let name = env::args().nth(1).unwrap_or_else(|| String::from("composite"));
    let run = match name.as_str() {
        "tas" => deposit_withdrawal::<TasLock<Spin>>,
        "ttas" => deposit_withdrawal::<TtasLock<Spin>>,
        "backoff" => deposit_withdrawal::<BackoffLock<Spin>>,
        "array" => deposit_withdrawal::<ArrayLock<Spin>>,
        "padded" => deposit_withdrawal::<PaddedArrayLock<Spin>>,
        "clh" => deposit_withdrawal::<ClhLock<Spin>>,
        "timeout" => deposit_withdrawal::<TimeoutLock<Spin>>,
        "composite" => deposit_withdrawal::<CompositeLock<Spin>>,
        "fast" => deposit_withdrawal::<FastPathLock<Spin>>,
        "monitor" => deposit_withdrawal::<MonitorLock>,
        _ => {
            error!(lock = %name, "unknown lock");
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let balance = run();
    info!(lock = %name, balance, elapsed = ?start.elapsed(), "done");
    if balance == INITIAL {
        ExitCode::SUCCESS
    } else {
        error!(expected = INITIAL, balance, "lost updates");
        ExitCode::FAILURE
    }
}

/// Even threads deposit and odd threads withdraw, one unit at a time.
fn deposit_withdrawal<L: RawLock>() -> i64 {
    let account = Account::<L>::new(INITIAL);
    thread::scope(|s| {
        for id in 0..THREADS {
            let account = &account;
            s.spawn(move || {
                for _ in 0..ITERATIONS {
                    if id % 2 == 0 {
                        account.deposit(1);
                    } else {
                        account.withdraw(1);
                    }
                }
            });
        }
    });
    account.read()
}
