//! Mock-accelerated clock.
//!
//! The station operates on a wall clock that advances faster than real
//! time so that multi-hour charging sessions can be observed in seconds.
//! `MockInstant` is a real calendar timestamp (so stepped-tariff hour-of-day
//! lookups stay meaningful); only its rate of advance is synthetic.

use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

pub type MockInstant = DateTime<Utc>;

pub trait Clock: Send + Sync {
    fn now(&self) -> MockInstant;
}

/// Boot-anchored wall clock accelerated by a constant integer rate.
///
/// `now() = anchor_wall + (real_elapsed * rate)`. Monotonic by construction:
/// real time never goes backwards, so neither does the mock clock.
pub struct AcceleratedClock {
    anchor_real: Instant,
    anchor_wall: MockInstant,
    rate: u32,
}

impl AcceleratedClock {
    pub fn new(rate: u32) -> Self {
        Self {
            anchor_real: Instant::now(),
            anchor_wall: Utc::now(),
            rate: rate.max(1),
        }
    }

    #[cfg(test)]
    pub fn with_anchor(rate: u32, anchor_wall: MockInstant) -> Self {
        Self {
            anchor_real: Instant::now(),
            anchor_wall,
            rate: rate.max(1),
        }
    }
}

impl Clock for AcceleratedClock {
    fn now(&self) -> MockInstant {
        let elapsed_real = self.anchor_real.elapsed();
        let scaled_millis = elapsed_real.as_millis() as i64 * self.rate as i64;
        self.anchor_wall + ChronoDuration::milliseconds(scaled_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accelerates_by_rate() {
        let anchor = Utc::now();
        let clock = AcceleratedClock::with_anchor(60, anchor);
        std::thread::sleep(std::time::Duration::from_millis(50));
        let now = clock.now();
        let elapsed_mock = (now - anchor).num_milliseconds();
        // ~50ms real * 60 = ~3000ms mock, allow generous scheduling jitter.
        assert!(elapsed_mock >= 2000, "elapsed_mock={elapsed_mock}");
    }

    #[test]
    fn monotonic() {
        let clock = AcceleratedClock::new(60);
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
