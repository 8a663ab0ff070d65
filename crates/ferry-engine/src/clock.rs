//! Wall-clock abstraction.
//!
//! Timestamps recorded in [`Communication`](crate::Communication)s and used
//! for hang detection come from a [`Clock`], so that tests can substitute a
//! clock they control.

use chrono::Utc;

pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// The system's real-time clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
