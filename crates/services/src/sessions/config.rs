use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Interval between countdown ticks when nothing else is configured.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Smallest tick interval accepted; tokio intervals cannot have a zero period.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables for an exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Read `EXAM_TICK_MS` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidNumber` if the variable is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidNumber` if `EXAM_TICK_MS` is not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let Some(raw) = lookup("EXAM_TICK_MS") else {
            return Ok(Self::default());
        };
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Self::default().with_tick_interval(Duration::from_millis(ms))),
            _ => Err(ConfigError::InvalidNumber {
                key: "EXAM_TICK_MS",
                raw,
            }),
        }
    }

    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(MIN_TICK_INTERVAL);
        self
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }
}
