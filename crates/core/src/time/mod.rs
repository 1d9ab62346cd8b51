//! Scheduling abstraction shared by the phase clock.
//!
//! [`RealTimeSource`] fires callbacks from a dedicated timer thread against the
//! wall clock. [`VirtualTimeSource`] only moves when told to, so tests can land
//! exactly on phase boundaries. Both honour the same contract: a callback runs
//! at most once, never before its deadline, and never after a successful
//! [`TimeSource::cancel`].

use std::time::Duration;

use crate::Result;

mod real;
mod virtual_time;

pub use real::RealTimeSource;
pub use virtual_time::VirtualTimeSource;

/// Single-shot callback handed to a [`TimeSource`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of one scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Something that can run a callback after a delay and take it back.
pub trait TimeSource: Send + Sync {
    /// Time elapsed on this source since it was created.
    fn now(&self) -> Duration;

    /// Runs `callback` once, `delay` from now.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId>;

    /// Drops the callback for `id` if it has not started yet. Returns whether a
    /// pending callback was removed.
    fn cancel(&self, id: TimerId) -> bool;

    /// Number of callbacks currently waiting to fire.
    fn pending(&self) -> usize;
}
