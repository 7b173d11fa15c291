//! Harmonic oscillator mirror domain.
//!
//! One phase-space point (q, p) advanced by the symplectic leap-frog
//! scheme. The mirror split separates the positive and negative frequency
//! components of the point; the invariant is the total energy
//! `E = ½(p² + ω²q²)`.
//!
//! A pure symplectic step never forgets a kick, so the breath update ends
//! with a weak amplitude rescale toward the reference energy, driven by the
//! kick-response gain. With gain 0 the update is plain leap-frog.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{BreathParams, DomainId, Invariant, MirrorSplit};
use crate::engine::schedule::Kick;
use crate::error::{MirrorError, MirrorResult};

/// Harmonic oscillator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorState {
    /// Position.
    q: f64,
    /// Momentum.
    p: f64,
    /// Angular frequency ω (rad/s).
    omega: f64,
    /// Energy at construction; the amplitude controller's set point.
    reference_energy: f64,
}

impl OscillatorState {
    /// Create an oscillator from initial conditions.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the amplitudes are non-finite, ω is not
    /// positive, or the initial energy is zero (the amplitude controller
    /// needs a non-degenerate set point).
    pub fn new(q: f64, p: f64, omega: f64) -> MirrorResult<Self> {
        if !q.is_finite() || !p.is_finite() {
            return Err(MirrorError::config("oscillator amplitudes must be finite"));
        }
        if !omega.is_finite() || omega <= 0.0 {
            return Err(MirrorError::config(format!(
                "oscillator frequency must be positive, got {omega}"
            )));
        }
        let reference_energy = 0.5 * (p * p + omega * omega * q * q);
        if reference_energy <= f64::EPSILON {
            return Err(MirrorError::config(
                "oscillator initial energy must be non-zero",
            ));
        }
        Ok(Self {
            q,
            p,
            omega,
            reference_energy,
        })
    }

    /// Current position.
    #[must_use]
    pub const fn position(&self) -> f64 {
        self.q
    }

    /// Current momentum.
    #[must_use]
    pub const fn momentum(&self) -> f64 {
        self.p
    }

    /// Angular frequency.
    #[must_use]
    pub const fn omega(&self) -> f64 {
        self.omega
    }

    /// Total energy `E = ½(p² + ω²q²)`.
    #[must_use]
    pub fn energy(&self) -> f64 {
        0.5 * (self.p * self.p + self.omega * self.omega * self.q * self.q)
    }

    /// Split into positive and negative frequency components
    /// `a± = ½(q ± i·p/ω)`.
    #[must_use]
    pub fn split(&self) -> MirrorSplit {
        let half_q = 0.5 * self.q;
        let half_p = 0.5 * self.p / self.omega;
        MirrorSplit::FrequencyComponents {
            positive: Complex64::new(half_q, half_p),
            negative: Complex64::new(half_q, -half_p),
            omega: self.omega,
        }
    }

    /// One leap-frog step with `dt = params.rate`, followed by the
    /// amplitude rescale toward the reference energy.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the step produces a non-finite
    /// value.
    pub fn breath_update(&mut self, params: &BreathParams) -> MirrorResult<()> {
        let dt = params.rate;
        let omega_sq = self.omega * self.omega;

        let p_half = self.p - 0.5 * dt * omega_sq * self.q;
        self.q += dt * p_half;
        self.p = p_half - 0.5 * dt * omega_sq * self.q;

        // Amplitude control: rescale the phase-space point toward the
        // reference energy. ln E relaxes geometrically at rate `gain`.
        let energy = self.energy();
        if params.gain > 0.0 && energy > f64::EPSILON {
            let scale = (self.reference_energy / energy).powf(0.5 * params.gain);
            self.q *= scale;
            self.p *= scale;
        }

        self.check_finite("breath_update")
    }

    /// Apply an amplitude jolt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for kick kinds that do not target the
    /// oscillator, `NumericInstability` if the jolt produces a non-finite
    /// value.
    pub fn perturb(&mut self, kick: &Kick) -> MirrorResult<()> {
        match kick {
            Kick::AmplitudeJolt { dq, dp } => {
                self.q += dq;
                self.p += dp;
                self.check_finite("perturb")
            }
            other => Err(MirrorError::invalid_state(
                DomainId::Oscillator,
                format!("kick {other:?} does not target the oscillator"),
            )),
        }
    }

    /// Energy invariant.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the energy is non-finite.
    pub fn invariant(&self) -> MirrorResult<Invariant> {
        let invariant = Invariant::scalar(self.energy());
        if invariant.is_finite() {
            Ok(invariant)
        } else {
            Err(MirrorError::numeric(DomainId::Oscillator, "energy"))
        }
    }

    fn check_finite(&self, location: &str) -> MirrorResult<()> {
        if self.q.is_finite() && self.p.is_finite() {
            Ok(())
        } else {
            Err(MirrorError::numeric(DomainId::Oscillator, location))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::domains::Recombined;

    fn params(rate: f64, gain: f64) -> BreathParams {
        BreathParams { rate, gain }
    }

    #[test]
    fn test_new_validates_input() {
        assert!(OscillatorState::new(1.0, 0.0, 1.0).is_ok());
        assert!(OscillatorState::new(f64::NAN, 0.0, 1.0).is_err());
        assert!(OscillatorState::new(1.0, 0.0, 0.0).is_err());
        assert!(OscillatorState::new(1.0, 0.0, -2.0).is_err());
        assert!(OscillatorState::new(0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_split_round_trip() {
        let state = OscillatorState::new(0.7, -0.3, 2.0).unwrap();
        let Recombined::PhaseSpace { q, p } = state.split().combine() else {
            panic!("oscillator split must recombine to a phase-space point");
        };
        assert!((q - 0.7).abs() < 1e-12);
        assert!((p - (-0.3)).abs() < 1e-12);
    }

    #[test]
    fn test_leapfrog_conserves_energy_without_gain() {
        let mut state = OscillatorState::new(1.0, 0.0, 1.0).unwrap();
        let initial = state.energy();

        for _ in 0..200 {
            state.breath_update(&params(0.1, 0.0)).unwrap();
        }

        let drift = (state.energy() - initial).abs() / initial;
        assert!(drift < 0.01, "Energy drift {drift} too large");
    }

    #[test]
    fn test_gain_restores_energy_after_kick() {
        let mut state = OscillatorState::new(1.0, 0.0, 1.0).unwrap();
        let reference = state.energy();

        state
            .perturb(&Kick::AmplitudeJolt { dq: 0.0, dp: 1.0 })
            .unwrap();
        assert!(state.energy() > 1.5 * reference);

        for _ in 0..30 {
            state.breath_update(&params(0.1, 0.2)).unwrap();
        }

        let residual = (state.energy() - reference).abs() / reference;
        assert!(residual < 0.01, "Residual energy error {residual}");
    }

    #[test]
    fn test_perturb_rejects_foreign_kick() {
        let mut state = OscillatorState::new(1.0, 0.0, 1.0).unwrap();
        let err = state.perturb(&Kick::PhaseKick { radians: 1.0 }).unwrap_err();
        assert!(err.is_domain_local());
    }

    #[test]
    fn test_perturb_detects_non_finite_jolt() {
        let mut state = OscillatorState::new(1.0, 0.0, 1.0).unwrap();
        let err = state
            .perturb(&Kick::AmplitudeJolt {
                dq: f64::INFINITY,
                dp: 0.0,
            })
            .unwrap_err();
        assert!(matches!(err, MirrorError::NumericInstability { .. }));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod proptests {
    use super::*;
    use crate::domains::Recombined;
    use proptest::prelude::*;

    proptest! {
        /// Falsification: split/combine round-trips any valid state.
        #[test]
        fn prop_split_round_trip(
            q in -10.0f64..10.0,
            p in -10.0f64..10.0,
            omega in 0.1f64..10.0,
        ) {
            prop_assume!(p.abs() > 1e-6 || q.abs() > 1e-6);
            let state = OscillatorState::new(q, p, omega).unwrap();
            let Recombined::PhaseSpace { q: q2, p: p2 } = state.split().combine() else {
                return Err(TestCaseError::fail("wrong recombined kind"));
            };
            prop_assert!((q - q2).abs() < 1e-9);
            prop_assert!((p - p2).abs() < 1e-9);
        }

        /// Falsification: leap-frog keeps energy bounded for small steps.
        #[test]
        fn prop_energy_bounded(
            q in 0.1f64..5.0,
            p in -5.0f64..5.0,
            steps in 10usize..200,
        ) {
            let mut state = OscillatorState::new(q, p, 1.0).unwrap();
            let initial = state.energy();
            let params = BreathParams { rate: 0.05, gain: 0.0 };

            for _ in 0..steps {
                state.breath_update(&params).unwrap();
            }

            let drift = (state.energy() - initial).abs() / initial;
            prop_assert!(drift < 0.05, "drift {} too large", drift);
        }
    }
}
