//! Deadline arithmetic for a timed exam.
//!
//! `Countdown` holds nothing but the absolute deadline and a fire-once latch.
//! Remaining time is always derived from the deadline, so delayed or skipped
//! ticks never drift the expiry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CountdownError {
    #[error("exam duration of {0:?} cannot be represented as a deadline")]
    DurationOutOfRange(Duration),
}

/// Observation produced by a single countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// The deadline is still ahead.
    Running { remaining: Duration },
    /// The deadline has been reached; reported exactly once.
    Expired,
    /// Expiry was already reported by an earlier tick.
    Finished,
}

#[derive(Debug)]
pub struct Countdown {
    deadline: DateTime<Utc>,
    fired: AtomicBool,
}

impl Countdown {
    /// Create a countdown ending `duration` after `started_at`.
    ///
    /// # Errors
    ///
    /// Returns `CountdownError::DurationOutOfRange` if the deadline overflows.
    pub fn starting_at(started_at: DateTime<Utc>, duration: Duration) -> Result<Self, CountdownError> {
        let delta = chrono::Duration::from_std(duration)
            .map_err(|_| CountdownError::DurationOutOfRange(duration))?;
        let deadline = started_at
            .checked_add_signed(delta)
            .ok_or(CountdownError::DurationOutOfRange(duration))?;
        Ok(Self::until(deadline))
    }

    #[must_use]
    pub fn until(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline,
            fired: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Time left before the deadline, saturating at zero.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).to_std().unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Evaluate the countdown at `now`.
    ///
    /// Only one call, across all threads, ever observes `Expired`.
    pub fn poll(&self, now: DateTime<Utc>) -> CountdownTick {
        if self.has_fired() {
            return CountdownTick::Finished;
        }

        let remaining = self.remaining_at(now);
        if !remaining.is_zero() {
            return CountdownTick::Running { remaining };
        }

        match self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => CountdownTick::Expired,
            Err(_) => CountdownTick::Finished,
        }
    }
}
