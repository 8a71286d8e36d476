//! Sleep abstraction
//!
//! Pull clock-in and clock programming need short, mandatory pauses. They go
//! through [`Delay`] so tests can record them instead of sleeping.

use std::thread;
use std::time::Duration;

/// Settle time around each edge of the legacy pull clock-in sequence
pub const PULL_SETTLE: Duration = Duration::from_micros(1);

/// Settle time after changing clock source/MASH and after a PWM ratio change
pub const CLOCK_SETTLE: Duration = Duration::from_micros(10);

/// Pause between reads of a busy clock generator
pub const BUSY_POLL: Duration = Duration::from_micros(10);

/// Blocking pause provider
pub trait Delay: Send + Sync {
    fn delay(&self, duration: Duration);
}

/// [`Delay`] backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn delay(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Spin until `ready` returns true, calling `idle` between attempts
///
/// Returns the number of failed polls. With `Some(limit)` the spin gives up
/// after `limit` failed polls and returns that count as the error.
pub fn poll_until(
    limit: Option<u64>,
    mut ready: impl FnMut() -> bool,
    mut idle: impl FnMut(),
) -> Result<u64, u64> {
    let mut polls = 0u64;
    loop {
        if ready() {
            return Ok(polls);
        }
        if matches!(limit, Some(limit) if polls >= limit) {
            return Err(polls);
        }
        idle();
        polls += 1;
    }
}
