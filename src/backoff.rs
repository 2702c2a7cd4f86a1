//! Randomized exponential backoff.
//!
//! Used by locks that, after a failed atomic attempt, would rather sleep for a
//! while than keep hammering the shared location. A [`Backoff`] value is never
//! shared between threads: it grows while its owner keeps losing races, and
//! is reset once the owner gets in.

use std::thread;
use std::time::Duration;

use rand::Rng;

/// A randomized exponential backoff with a growing upper limit.
///
/// Each call to [`backoff`] sleeps the current thread for a uniformly random
/// duration in `[0, limit)`, then doubles `limit`, capped at `max`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use compositelock::backoff::Backoff;
///
/// let mut backoff = Backoff::new(Duration::from_micros(1), Duration::from_micros(8));
/// assert_eq!(backoff.limit(), Duration::from_micros(1));
/// backoff.backoff();
/// assert_eq!(backoff.limit(), Duration::from_micros(2));
/// ```
///
/// [`backoff`]: Backoff::backoff
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    limit: Duration,
}

impl Backoff {
    /// Creates a new backoff whose limit starts at `min` and never exceeds
    /// `max`.
    ///
    /// If `max` is smaller than `min`, `min` is used as the cap.
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        let max = if max.as_nanos() < min.as_nanos() { min } else { max };
        Self { min, max, limit: min }
    }

    /// Returns the current upper bound of the next random delay.
    #[must_use]
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Sleeps for a random duration in `[0, limit)` and doubles the limit.
    pub fn backoff(&mut self) {
        let delay = self.next_delay(&mut rand::thread_rng());
        thread::sleep(delay);
    }

    /// Restores the limit to its initial value.
    pub fn reset(&mut self) {
        self.limit = self.min;
    }

    /// Draws the next delay from `rng` and grows the limit.
    pub(crate) fn next_delay<G: Rng + ?Sized>(&mut self, rng: &mut G) -> Duration {
        let nanos = u64::try_from(self.limit.as_nanos()).unwrap_or(u64::MAX);
        let delay = Duration::from_nanos(rng.gen_range(0..nanos.max(1)));
        self.limit = self.limit.saturating_mul(2).min(self.max);
        delay
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::Backoff;

    #[test]
    fn limit_doubles_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_micros(10), Duration::from_micros(100));
        let mut rng = StdRng::seed_from_u64(7);
        let limits: Vec<_> = (0..6)
            .map(|_| {
                backoff.next_delay(&mut rng);
                backoff.limit().as_micros()
            })
            .collect();
        assert_eq!(limits, [20, 40, 80, 100, 100, 100]);
    }

    #[test]
    fn reset_restores_min() {
        let mut backoff = Backoff::new(Duration::from_micros(1), Duration::from_micros(100));
        backoff.backoff();
        backoff.backoff();
        assert_ne!(backoff.limit(), Duration::from_micros(1));
        backoff.reset();
        assert_eq!(backoff.limit(), Duration::from_micros(1));
    }

    #[test]
    fn max_below_min() {
        let backoff = Backoff::new(Duration::from_micros(50), Duration::from_micros(5));
        let mut clone = backoff;
        clone.next_delay(&mut StdRng::seed_from_u64(0));
        assert_eq!(clone.limit(), Duration::from_micros(50));
    }

    #[test]
    fn zero_limit_never_sleeps() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::ZERO);
        let delay = backoff.next_delay(&mut StdRng::seed_from_u64(0));
        assert_eq!(delay, Duration::ZERO);
    }

    proptest! {
        #[test]
        fn delay_is_below_limit(min in 1u64..10_000, extra in 0u64..100_000, seed: u64, rounds in 1usize..32) {
            let (min, max) = (Duration::from_nanos(min), Duration::from_nanos(min + extra));
            let mut backoff = Backoff::new(min, max);
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..rounds {
                let limit = backoff.limit();
                let delay = backoff.next_delay(&mut rng);
                prop_assert!(delay < limit);
                prop_assert!(backoff.limit() <= max);
                prop_assert!(backoff.limit() >= limit);
            }
        }
    }
}
