//! Time source and duration parsing.
//!
//! Token validity is always evaluated against a [`Clock`] handed to the
//! component that needs it, so that tests can pin "now" to an exact
//! instant instead of racing the wall clock.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use crate::error::{Error, Result};

/// Supplies the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}

/// Wall clock time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<SystemTime>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Sets the clock to `now`.
    pub fn set(&self, now: SystemTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += duration;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.now
            .lock()
            .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }
}

/// Parses a duration such as `90`, `300s`, `5m`, `1h 30m` or `2days`.
///
/// Bare numbers are seconds; anything else goes through [`humantime`].
///
/// # Errors
///
/// Returns `InvalidArgument` if `humantime` rejects the string.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    humantime::parse_duration(input)
        .map_err(|e| Error::invalid_argument(format!("invalid duration \"{input}\": {e}")))
}
