//! Round-trip time estimation and retransmission timeout.
//!
//! RFC 6298 smoothing with a deliberately pessimistic first sample (the
//! first `srtt` is ten times the measured delay) and a 1 ms floor on the
//! variance term.

use serde::Serialize;

/// Smallest retransmission timeout [s].
pub const MIN_RTO: f64 = 0.025;

/// Largest retransmission timeout [s].
pub const MAX_RTO: f64 = 5.000;

/// Smoothed round-trip state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RttEstimator {
    pub srtt: f64,
    pub rttvar: f64,
    pub rto: f64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self {
            srtt: 0.0,
            rttvar: 0.0,
            rto: MIN_RTO,
        }
    }
}

impl RttEstimator {
    /// Fold in one round-trip measurement of `delta` seconds.
    pub fn sample(&mut self, delta: f64) {
        if self.srtt == 0.0 {
            self.rttvar = delta / 2.0;
            self.srtt = delta * 10.0;
        } else {
            self.rttvar = (3.0 * self.rttvar + (self.srtt - delta).abs()) / 4.0;
            self.srtt = (7.0 * self.srtt + delta) / 8.0;
        }
        let rttvar4 = (self.rttvar * 4.0).max(0.001);
        self.rto = (self.srtt + rttvar4).clamp(MIN_RTO, MAX_RTO);
    }

    /// Double the timeout after a timeout-triggered retransmit.
    pub fn backoff(&mut self) {
        self.rto = (self.rto * 2.0).min(MAX_RTO);
    }
}
