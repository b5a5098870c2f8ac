//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Shared primitives and utilities for the core runtime."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Clock abstraction injected wherever elapsed-time decisions are made.
///
/// Health classification and task stamping never read the wall clock
/// directly; tests drive a [`ManualClock`] instead of sleeping.
pub trait Clock: Send + Sync {
    /// Current instant according to this clock.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at the supplied instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the Unix epoch.
    pub fn at_epoch() -> Self {
        Self::starting_at(Utc.timestamp_millis_opt(0).single().unwrap_or_default())
    }

    /// Advance the clock by the supplied duration.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = *now + chrono::Duration::milliseconds(delta.as_millis() as i64);
    }

    /// Pin the clock to a specific instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
