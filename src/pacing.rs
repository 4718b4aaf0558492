use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::PacingConfig;
use crate::domain::Outcome;

/// Inter-attempt delays for one batch run.
///
/// Attempt indices are 1-based and global across the first pass and the retry pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingPolicy {
    pub regular_delay: Duration,
    pub cooldown_every: u64,
    pub cooldown: Duration,
    pub penalty_delay: Duration,
}

impl PacingPolicy {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            regular_delay: Duration::ZERO,
            cooldown_every: 0,
            cooldown: Duration::ZERO,
            penalty_delay: Duration::ZERO,
        }
    }

    /// Long pause to take before issuing attempt `attempt_index`, if one is due.
    pub fn cooldown_before(&self, attempt_index: u64) -> Option<Duration> {
        if self.cooldown_every == 0 || attempt_index == 0 || self.cooldown.is_zero() {
            return None;
        }
        (attempt_index % self.cooldown_every == 0).then_some(self.cooldown)
    }

    /// Delay after an attempt has been classified.
    pub fn delay_after(&self, outcome: &Outcome) -> Duration {
        if outcome.is_failed() {
            self.penalty_delay
        } else {
            self.regular_delay
        }
    }

    /// Full wait attributable to attempt `attempt_index`: its cooldown plus its post-attempt delay.
    pub fn next_delay(&self, attempt_index: u64, last_outcome: &Outcome) -> Duration {
        self.cooldown_before(attempt_index).unwrap_or_default() + self.delay_after(last_outcome)
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from(&PacingConfig::default())
    }
}

impl From<&PacingConfig> for PacingPolicy {
    fn from(value: &PacingConfig) -> Self {
        Self {
            regular_delay: Duration::from_millis(value.regular_delay_ms),
            cooldown_every: value.cooldown_every,
            cooldown: Duration::from_millis(value.cooldown_ms),
            penalty_delay: Duration::from_millis(value.penalty_delay_ms),
        }
    }
}

/// Shared cancellation flag checked between attempts and during pauses.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    Completed,
    Interrupted,
}

pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration, cancel: &CancelFlag) -> Pause;
}

/// Blocks the calling thread in short slices so cancellation is noticed promptly.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSleeper {
    slice: Duration,
}

impl ThreadSleeper {
    pub fn new() -> Self {
        Self {
            slice: Duration::from_millis(100),
        }
    }
}

impl Default for ThreadSleeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelFlag) -> Pause {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return Pause::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return Pause::Completed;
            }
            thread::sleep(self.slice.min(deadline - now));
        }
    }
}
