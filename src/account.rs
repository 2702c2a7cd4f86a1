//! A lock protected bank account balance.
//!
//! [`Account`] is the shared resource the locks of this crate are exercised
//! against: every update is a read-modify-write of one integer, so any lost
//! update caused by a broken lock shows up in the final balance.

use core::fmt::{self, Debug, Formatter};

use crate::lock::{RawLock, RawTryLock};
use crate::mutex::Mutex;

/// An integer balance guarded by a lock of type `L`.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use compositelock::account::Account;
/// use compositelock::composite::CompositeLock;
/// use compositelock::relax::Yield;
///
/// let account = Account::<CompositeLock<Yield>>::new(100);
/// thread::scope(|s| {
///     s.spawn(|| account.deposit(5));
///     s.spawn(|| account.withdraw(5));
/// });
/// assert_eq!(account.read(), 100);
/// ```
pub struct Account<L> {
    balance: Mutex<i64, L>,
}

impl<L: RawLock> Account<L> {
    /// Opens an account with the given initial balance.
    #[must_use]
    pub fn new(balance: i64) -> Self {
        Self { balance: Mutex::new(balance) }
    }

    /// Adds `amount` to the balance.
    pub fn increase(&self, amount: i64) {
        self.balance.lock_then(|balance| *balance += amount);
    }

    /// Subtracts `amount` from the balance, which may go negative.
    pub fn decrease(&self, amount: i64) {
        self.balance.lock_then(|balance| *balance -= amount);
    }

    /// Same as [`increase`](Self::increase).
    pub fn deposit(&self, amount: i64) {
        self.increase(amount);
    }

    /// Same as [`decrease`](Self::decrease).
    pub fn withdraw(&self, amount: i64) {
        self.decrease(amount);
    }

    /// Returns the current balance, read under the lock.
    pub fn read(&self) -> i64 {
        self.balance.lock_then(|balance| *balance)
    }

    /// Consumes the account, returning the final balance.
    pub fn into_inner(self) -> i64 {
        self.balance.into_inner()
    }

    /// Returns the lock guarding the balance.
    pub fn raw(&self) -> &L {
        self.balance.raw()
    }
}

impl<L: RawLock> Default for Account<L> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<L: RawTryLock> Debug for Account<L> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account").field("balance", &self.balance).finish()
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use std::thread;

    use super::Account;
    use crate::array::{ArrayLock, PaddedArrayLock};
    use crate::clh::ClhLock;
    use crate::composite::{CompositeLock, FastPathLock};
    use crate::lock::{RawLock, RawTryLock};
    use crate::monitor::MonitorLock;
    use crate::relax::Yield;
    use crate::spin::{BackoffLock, TasLock, TtasLock};
    use crate::timeout::TimeoutLock;

    const THREADS: usize = 6;
    const ITERATIONS: i64 = 1_000;
    const INITIAL: i64 = 1_000_000;

    fn deposit_withdrawal<L: RawLock>() {
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
        assert_eq!(account.into_inner(), INITIAL);
    }

    #[test]
    fn balance_changes() {
        let account = Account::<TasLock<Yield>>::default();
        account.increase(10);
        account.decrease(25);
        assert_eq!(account.read(), -15);
        assert!(!account.raw().is_locked());
    }

    #[test]
    fn debug_shows_balance() {
        let account = Account::<TtasLock<Yield>>::new(7);
        assert_eq!(format!("{account:?}"), "Account { balance: Mutex { data: 7 } }");
    }

    #[test]
    fn deposit_withdrawal_tas() {
        deposit_withdrawal::<TasLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_ttas() {
        deposit_withdrawal::<TtasLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_backoff() {
        deposit_withdrawal::<BackoffLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_array() {
        deposit_withdrawal::<ArrayLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_padded_array() {
        deposit_withdrawal::<PaddedArrayLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_clh() {
        deposit_withdrawal::<ClhLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_timeout() {
        deposit_withdrawal::<TimeoutLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_composite() {
        deposit_withdrawal::<CompositeLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_fast_path() {
        deposit_withdrawal::<FastPathLock<Yield>>();
    }

    #[test]
    fn deposit_withdrawal_monitor() {
        deposit_withdrawal::<MonitorLock>();
    }
}
