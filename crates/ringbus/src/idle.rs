use std::hint;
use std::thread;

/// Wait strategy for callers that spin on a full or empty ring.
///
/// The transport itself never blocks: a full ring fails the offer and an
/// empty ring returns a zero poll. Callers that want to wait drive one of
/// these between attempts. Early steps burn a short, linearly growing
/// burst of PAUSE hints to stay on-core while the other side catches up;
/// once spinning has not helped, each step yields to the scheduler; after
/// the yield rounds the strategy reports itself exhausted so callers can
/// surface backpressure instead of waiting forever.
#[derive(Debug, Default)]
pub struct IdleStrategy {
    attempts: u32,
}

/// PAUSE-burst steps before the strategy starts yielding.
const SPIN_ROUNDS: u32 = 24;
/// Scheduler yields before the strategy reports exhaustion.
const YIELD_ROUNDS: u32 = 16;

impl IdleStrategy {
    /// A fresh strategy at the lightest step.
    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// Wait one step.
    ///
    /// Steps past the exhaustion point keep yielding, so a caller that
    /// chooses to wait indefinitely stays scheduler-friendly.
    #[inline]
    pub fn idle(&mut self) {
        if self.attempts < SPIN_ROUNDS {
            for _ in 0..=self.attempts * 4 {
                hint::spin_loop();
            }
        } else {
            thread::yield_now();
        }
        self.attempts = self.attempts.saturating_add(1);
    }

    /// True once the spin and yield rounds are used up.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= SPIN_ROUNDS + YIELD_ROUNDS
    }

    /// Start over after making progress.
    #[inline]
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_after_fixed_step_budget() {
        let mut strategy = IdleStrategy::new();

        let mut steps = 0u32;
        while !strategy.is_exhausted() {
            strategy.idle();
            steps += 1;
        }
        assert_eq!(steps, SPIN_ROUNDS + YIELD_ROUNDS);

        // An exhausted strategy is still usable; it just keeps yielding.
        strategy.idle();
        assert!(strategy.is_exhausted());
    }

    #[test]
    fn test_reset_rearms_the_strategy() {
        let mut strategy = IdleStrategy::default();
        for _ in 0..100 {
            strategy.idle();
        }
        assert!(strategy.is_exhausted());

        strategy.reset();
        assert!(!strategy.is_exhausted());
    }
}
