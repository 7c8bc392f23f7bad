//! Time source for the engine.
//!
//! Every "now" the engine observes comes through the [`Clock`] trait: slot-end
//! checks, imminence checks, allocation timestamps, deadline enforcement.
//! Injecting the clock keeps those decisions deterministic under test; the
//! clinic's own deployments use [`SystemClock`].
//!
//! All times are naive local times: the clinic operates in a single zone and
//! the clock is the only place where that zone is resolved.

use chrono::NaiveDateTime;
use std::sync::Mutex;

/// A source of the current clinic-local time.
pub trait Clock: Send + Sync {
    /// The current date and time in the clinic's local zone.
    fn now(&self) -> NaiveDateTime;
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

/// Clock backed by the operating system, in the local zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// A settable clock for deterministic tests.
///
/// The contained instant only moves when a test calls [`FixedClock::set`] or
/// [`FixedClock::advance`].
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to an absolute instant.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().expect("clock mutex poisoned") = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.lock().expect("clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Duration};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_fixed_clock_holds_still() {
        let clock = FixedClock::new(at(9, 0));
        assert_eq!(clock.now(), at(9, 0));
        assert_eq!(clock.now(), at(9, 0));
    }

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let clock = FixedClock::new(at(9, 0));
        clock.advance(Duration::minutes(45));
        assert_eq!(clock.now(), at(9, 45));
        clock.set(at(18, 0));
        assert_eq!(clock.now(), at(18, 0));
    }
}
