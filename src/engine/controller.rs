//! Adaptive breath control.
//!
//! Each domain carries one controller: a negative-feedback loop on the
//! breath rate. When the invariant's deviation from its baseline leaves
//! the outer tolerance band, the rate is damped multiplicatively; after a
//! streak of consecutive ticks inside the tighter inner band, the rate is
//! restored toward its base value. Controller state is explicit and
//! per-domain: the engine passes it through every tick, there is no
//! global adaptation.
//!
//! The damping and restoration factors and the band widths are tunable
//! parameters, not constants.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domains::DomainId;
use crate::error::{MirrorError, MirrorResult};

/// Tuning for one domain's breath controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ControllerTuning {
    /// Base breath rate (the set point).
    #[validate(range(min = 0.000_000_001))]
    pub base_rate: f64,
    /// Floor the damped rate never goes below.
    #[validate(range(min = 0.0))]
    pub min_rate: f64,
    /// Multiplicative damping applied when the deviation leaves the outer
    /// band.
    #[validate(range(min = 0.000_001, max = 1.0))]
    pub damping: f64,
    /// Fraction of the gap to base closed per restoring tick.
    #[validate(range(min = 0.000_001, max = 1.0))]
    pub restore: f64,
    /// Outer tolerance band on the invariant deviation.
    #[validate(range(min = 0.000_000_000_001))]
    pub outer_band: f64,
    /// Inner band; deviations at or below it count as calm ticks.
    #[validate(range(min = 0.000_000_000_001))]
    pub inner_band: f64,
    /// Consecutive in-band ticks required before restoring.
    #[validate(range(min = 1))]
    pub calm_ticks: u32,
}

impl ControllerTuning {
    /// Default tuning for a domain.
    ///
    /// The oscillator and qubit advance by a timestep, so their base rate
    /// is small and their bands tight; the remaining domains blend at
    /// full rate and tolerate the natural wander of their invariants.
    #[must_use]
    pub fn for_domain(domain: DomainId) -> Self {
        let (base_rate, outer_band, inner_band) = match domain {
            DomainId::Oscillator | DomainId::Qubit => (0.1, 0.01, 0.005),
            DomainId::NumberTheoretic => (1.0, 0.1, 0.02),
            DomainId::Graph => (1.0, 0.2, 0.05),
            DomainId::Thermodynamic => (1.0, 0.15, 0.05),
        };
        Self {
            base_rate,
            min_rate: base_rate * 0.05,
            damping: 0.5,
            restore: 0.5,
            outer_band,
            inner_band,
            calm_ticks: 3,
        }
    }

    /// Validate constraints the schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the inner band exceeds the outer band or the
    /// rate floor exceeds the base rate.
    pub fn validate_semantic(&self) -> MirrorResult<()> {
        self.validate()?;
        if self.inner_band > self.outer_band {
            return Err(MirrorError::config(format!(
                "inner band {} must not exceed outer band {}",
                self.inner_band, self.outer_band
            )));
        }
        if self.min_rate > self.base_rate {
            return Err(MirrorError::config(format!(
                "rate floor {} must not exceed base rate {}",
                self.min_rate, self.base_rate
            )));
        }
        Ok(())
    }
}

/// Per-domain adaptive controller state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathController {
    tuning: ControllerTuning,
    rate: f64,
    calm_streak: u32,
}

impl BreathController {
    /// Create a controller at its base rate.
    #[must_use]
    pub fn new(tuning: ControllerTuning) -> Self {
        let rate = tuning.base_rate;
        Self {
            tuning,
            rate,
            calm_streak: 0,
        }
    }

    /// The rate to use for the next breath update.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// The controller's tuning.
    #[must_use]
    pub const fn tuning(&self) -> &ControllerTuning {
        &self.tuning
    }

    /// Whether a deviation sits inside the outer tolerance band.
    #[must_use]
    pub fn within_tolerance(&self, deviation: f64) -> bool {
        deviation <= self.tuning.outer_band
    }

    /// Feed this tick's deviation into the feedback loop.
    pub fn observe(&mut self, deviation: f64) {
        if deviation > self.tuning.outer_band {
            self.rate = (self.rate * self.tuning.damping).max(self.tuning.min_rate);
            self.calm_streak = 0;
        } else if deviation <= self.tuning.inner_band {
            self.calm_streak = self.calm_streak.saturating_add(1);
            if self.calm_streak >= self.tuning.calm_ticks {
                self.rate += self.tuning.restore * (self.tuning.base_rate - self.rate);
            }
        } else {
            self.calm_streak = 0;
        }
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Falsification: the rate never leaves [min_rate, base_rate] for
        /// any deviation sequence.
        #[test]
        fn prop_rate_stays_bounded(devs in proptest::collection::vec(0.0f64..2.0, 1..200)) {
            let mut controller = BreathController::new(ControllerTuning {
                base_rate: 1.0,
                min_rate: 0.05,
                damping: 0.5,
                restore: 0.5,
                outer_band: 0.1,
                inner_band: 0.02,
                calm_ticks: 3,
            });
            for dev in devs {
                controller.observe(dev);
                prop_assert!(controller.rate() >= 0.05 - 1e-12);
                prop_assert!(controller.rate() <= 1.0 + 1e-12);
            }
        }
    }
}
