//! Time source shared by every operation on an election.

use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock that never goes backwards.
///
/// If the system time steps back, the last reading is repeated until the
/// wall clock catches up again.
#[derive(Debug)]
pub struct SystemClock {
    last: Mutex<OffsetDateTime>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { last: Mutex::new(OffsetDateTime::UNIX_EPOCH) }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        let wall = OffsetDateTime::now_utc();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if wall > *last {
            *last = wall;
        }
        *last
    }
}

/// Deterministic clock for tests. Time only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self { current: Mutex::new(start) }
    }

    fn current(&self) -> std::sync::MutexGuard<'_, OffsetDateTime> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Moves time forward. Negative durations are ignored.
    pub fn advance(&self, by: Duration) {
        if by.is_positive() {
            *self.current() += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.current()
    }
}
