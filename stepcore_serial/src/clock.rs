//! Host time to mcu clock conversion.

use nix::time::{ClockId, clock_gettime};
use serde::Serialize;

/// Host monotonic time [s], the time base of every transport timestamp.
pub fn monotonic() -> f64 {
    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .map_or(0.0, |ts| ts.tv_sec() as f64 + ts.tv_nsec() as f64 * 1e-9)
}

/// Linear model of the mcu clock, fed by the clock synchronization layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClockEstimate {
    /// Estimated mcu frequency [Hz]; zero until the first estimate arrives.
    pub est_freq: f64,
    /// Host time of the reference sample [s].
    pub conv_time: f64,
    /// Mcu clock at `conv_time`.
    pub conv_clock: u64,
    /// Most recent clock reported by the mcu.
    pub last_clock: u64,
}

impl ClockEstimate {
    pub fn new(est_freq: f64, conv_time: f64, conv_clock: u64, last_clock: u64) -> Self {
        Self {
            est_freq,
            conv_time,
            conv_clock,
            last_clock,
        }
    }

    /// Whether a frequency estimate is available.
    #[inline]
    pub fn is_known(&self) -> bool {
        self.est_freq > 0.0
    }

    /// Estimated mcu clock at host time `time`.
    #[inline]
    pub fn clock_from_time(&self, time: f64) -> u64 {
        let ticks = ((time - self.conv_time) * self.est_freq) as i64;
        self.conv_clock.saturating_add_signed(ticks)
    }

    /// Ticks covered by `secs` seconds.
    #[inline]
    pub fn ticks(&self, secs: f64) -> u64 {
        (secs * self.est_freq) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_around_reference() {
        let est = ClockEstimate::new(1_000_000.0, 10.0, 5_000_000, 5_000_000);
        assert!(est.is_known());
        assert_eq!(est.clock_from_time(10.5), 5_500_000);
        assert_eq!(est.clock_from_time(9.0), 4_000_000);
        assert_eq!(est.ticks(0.25), 250_000);
    }

    #[test]
    fn monotonic_never_goes_back() {
        let a = monotonic();
        let b = monotonic();
        assert!(a > 0.0);
        assert!(b >= a);
    }

    #[test]
    fn unknown_until_set() {
        assert!(!ClockEstimate::default().is_known());
        assert_eq!(ClockEstimate::default().clock_from_time(3.0), 0);
    }
}
