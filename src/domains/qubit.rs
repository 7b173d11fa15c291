//! Qubit mirror domain.
//!
//! A single qubit (2 amplitudes) or a two-qubit composite (4 amplitudes)
//! evolving under a fixed Z Hamiltonian. The unitary is built from a
//! truncated exponential series and the state is renormalized after every
//! step, so the norm is preserved exactly up to floating tolerance.
//!
//! The mirror split removes the global phase: a logical (phase-free)
//! component and the extracted phase factor. The invariant is the state
//! norm for a single qubit and the concurrence `2·|a₀₀a₁₁ − a₀₁a₁₀|` for a
//! two-qubit state.
//!
//! The Z Hamiltonian only advances phases, so amplitude magnitudes are
//! constants of the unperturbed motion. The breath update exploits that:
//! after evolving, magnitudes relax toward their reference values at the
//! kick-response gain, which restores concurrence after an amplitude jolt
//! without disturbing the unitary dynamics.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{BreathParams, DomainId, Invariant, MirrorSplit};
use crate::engine::schedule::Kick;
use crate::error::{MirrorError, MirrorResult};

/// Terms kept in the truncated exponential series.
const SERIES_TERMS: usize = 12;

/// Qubit register state: 2 or 4 complex amplitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QubitState {
    /// State-vector amplitudes (normalized).
    amps: Vec<Complex64>,
    /// Hamiltonian frequency ω.
    omega: f64,
    /// Amplitude magnitudes at construction.
    reference_mags: Vec<f64>,
}

impl QubitState {
    /// Create a qubit state from complex amplitudes.
    ///
    /// # Errors
    ///
    /// Returns `Config` unless there are exactly 2 or 4 finite amplitudes
    /// with non-zero norm and ω is positive. The state is normalized on
    /// construction.
    pub fn new(amps: Vec<Complex64>, omega: f64) -> MirrorResult<Self> {
        if amps.len() != 2 && amps.len() != 4 {
            return Err(MirrorError::config(format!(
                "qubit state needs 2 or 4 amplitudes, got {}",
                amps.len()
            )));
        }
        if amps.iter().any(|a| !a.re.is_finite() || !a.im.is_finite()) {
            return Err(MirrorError::config("qubit amplitudes must be finite"));
        }
        if !omega.is_finite() || omega <= 0.0 {
            return Err(MirrorError::config(format!(
                "qubit frequency must be positive, got {omega}"
            )));
        }
        let norm = norm_of(&amps);
        if norm <= f64::EPSILON {
            return Err(MirrorError::config("qubit state must have non-zero norm"));
        }
        let amps: Vec<Complex64> = amps.into_iter().map(|a| a / norm).collect();
        let reference_mags = amps.iter().map(|a| a.norm()).collect();
        Ok(Self {
            amps,
            omega,
            reference_mags,
        })
    }

    /// The maximally entangled Bell state `(|00⟩ + |11⟩)/√2`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if ω is not positive.
    pub fn bell(omega: f64) -> MirrorResult<Self> {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        Self::new(
            vec![
                Complex64::new(half, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(0.0, 0.0),
                Complex64::new(half, 0.0),
            ],
            omega,
        )
    }

    /// Current amplitudes.
    #[must_use]
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amps
    }

    /// Whether this is a two-qubit composite state.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.amps.len() == 4
    }

    /// State norm.
    #[must_use]
    pub fn norm(&self) -> f64 {
        norm_of(&self.amps)
    }

    /// Concurrence of a two-qubit pure state, `2·|a₀₀a₁₁ − a₀₁a₁₀|`.
    ///
    /// Returns `None` for a single qubit.
    #[must_use]
    pub fn concurrence(&self) -> Option<f64> {
        if self.amps.len() == 4 {
            let det = self.amps[0] * self.amps[3] - self.amps[1] * self.amps[2];
            Some(2.0 * det.norm())
        } else {
            None
        }
    }

    /// Bloch-sphere coordinates (x, y, z) of a single qubit.
    ///
    /// Returns `None` for a composite state.
    #[must_use]
    pub fn bloch_coords(&self) -> Option<(f64, f64, f64)> {
        if self.amps.len() != 2 {
            return None;
        }
        let a = self.amps[0];
        let b = self.amps[1];
        let cross = a.conj() * b;
        Some((
            2.0 * cross.re,
            2.0 * cross.im,
            a.norm_sqr() - b.norm_sqr(),
        ))
    }

    /// Split into the global-phase-free logical component and the phase.
    ///
    /// The phase is taken from the first amplitude of non-negligible
    /// magnitude, so the logical part is invariant under global phase
    /// rotations of the whole register.
    #[must_use]
    pub fn split(&self) -> MirrorSplit {
        let phase = self
            .amps
            .iter()
            .find(|a| a.norm() > 1e-12)
            .map_or(Complex64::new(1.0, 0.0), |a| *a / a.norm());
        let logical = self.amps.iter().map(|a| a * phase.conj()).collect();
        MirrorSplit::LogicalPhase { logical, phase }
    }

    /// One unitary step `U = exp(−i·H·dt)` with `dt = params.rate`,
    /// followed by exact renormalization and the magnitude relaxation.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the evolved state is non-finite,
    /// `InvalidState` if its norm collapses.
    pub fn breath_update(&mut self, params: &BreathParams) -> MirrorResult<()> {
        let h = self.hamiltonian_diagonal();
        self.amps = evolve_series(&self.amps, &h, params.rate);
        self.renormalize()?;

        // Pull magnitudes toward their reference values; phases are left
        // alone, so unperturbed evolution is unaffected.
        if params.gain > 0.0 {
            let gain = params.gain.clamp(0.0, 1.0);
            for (amp, &target) in self.amps.iter_mut().zip(self.reference_mags.iter()) {
                let mag = amp.norm();
                let relaxed = mag + gain * (target - mag);
                if mag > 1e-12 {
                    *amp *= relaxed / mag;
                } else {
                    *amp = Complex64::new(relaxed, 0.0);
                }
            }
            self.renormalize()?;
        }

        self.check_finite("breath_update")
    }

    /// Apply a phase kick or an amplitude jolt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for kick kinds that do not target the qubit,
    /// for an out-of-range jolt index, or if the kicked state cannot be
    /// renormalized.
    pub fn perturb(&mut self, kick: &Kick) -> MirrorResult<()> {
        match kick {
            Kick::PhaseKick { radians } => {
                self.amps[0] *= Complex64::from_polar(1.0, *radians);
            }
            Kick::StateJolt { index, re, im } => {
                let Some(amp) = self.amps.get_mut(*index) else {
                    return Err(MirrorError::invalid_state(
                        DomainId::Qubit,
                        format!("jolt index {index} out of range"),
                    ));
                };
                *amp += Complex64::new(*re, *im);
            }
            other => {
                return Err(MirrorError::invalid_state(
                    DomainId::Qubit,
                    format!("kick {other:?} does not target the qubit"),
                ));
            }
        }
        self.renormalize()?;
        self.check_finite("perturb")
    }

    /// Norm invariant (single qubit) or concurrence invariant (two-qubit).
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the value is non-finite.
    pub fn invariant(&self) -> MirrorResult<Invariant> {
        let invariant = match self.concurrence() {
            Some(c) => Invariant::scalar(c),
            None => Invariant::scalar(self.norm()),
        };
        if invariant.is_finite() {
            Ok(invariant)
        } else {
            Err(MirrorError::numeric(DomainId::Qubit, "invariant"))
        }
    }

    /// Diagonal of `H = ω/2·Σz` (σz for one qubit, σz⊗I + I⊗σz for two).
    fn hamiltonian_diagonal(&self) -> Vec<f64> {
        let half = 0.5 * self.omega;
        if self.amps.len() == 2 {
            vec![half, -half]
        } else {
            vec![2.0 * half, 0.0, 0.0, -2.0 * half]
        }
    }

    fn renormalize(&mut self) -> MirrorResult<()> {
        let norm = self.norm();
        if norm <= f64::EPSILON || !norm.is_finite() {
            return Err(MirrorError::invalid_state(
                DomainId::Qubit,
                "state norm collapsed and cannot be repaired",
            ));
        }
        for amp in &mut self.amps {
            *amp /= norm;
        }
        Ok(())
    }

    fn check_finite(&self, location: &str) -> MirrorResult<()> {
        if self
            .amps
            .iter()
            .all(|a| a.re.is_finite() && a.im.is_finite())
        {
            Ok(())
        } else {
            Err(MirrorError::numeric(DomainId::Qubit, location))
        }
    }
}

fn norm_of(amps: &[Complex64]) -> f64 {
    amps.iter().map(Complex64::norm_sqr).sum::<f64>().sqrt()
}

/// Apply `exp(−i·H·dt)` to a state vector for a diagonal Hamiltonian,
/// via the truncated series `Σ (−i·dt)ᵏ Hᵏ ψ / k!`.
fn evolve_series(amps: &[Complex64], diagonal: &[f64], dt: f64) -> Vec<Complex64> {
    let mut result = amps.to_vec();
    let mut term = amps.to_vec();
    for k in 1..=SERIES_TERMS {
        let factor = Complex64::new(0.0, -dt / k as f64);
        for (t, &h) in term.iter_mut().zip(diagonal.iter()) {
            *t *= factor * h;
        }
        for (r, t) in result.iter_mut().zip(term.iter()) {
            *r += t;
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::domains::Recombined;

    fn params(rate: f64, gain: f64) -> BreathParams {
        BreathParams { rate, gain }
    }

    fn plus_state() -> QubitState {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        QubitState::new(
            vec![Complex64::new(half, 0.0), Complex64::new(half, 0.0)],
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_input() {
        assert!(QubitState::new(vec![Complex64::new(1.0, 0.0)], 1.0).is_err());
        assert!(QubitState::new(
            vec![Complex64::new(0.0, 0.0), Complex64::new(0.0, 0.0)],
            1.0
        )
        .is_err());
        assert!(QubitState::new(
            vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
            0.0
        )
        .is_err());
        assert!(QubitState::new(
            vec![Complex64::new(f64::NAN, 0.0), Complex64::new(0.0, 0.0)],
            1.0
        )
        .is_err());
    }

    #[test]
    fn test_normalized_on_construction() {
        let state = QubitState::new(
            vec![Complex64::new(3.0, 0.0), Complex64::new(4.0, 0.0)],
            1.0,
        )
        .unwrap();
        assert!((state.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bell_concurrence_is_one() {
        let bell = QubitState::bell(1.0).unwrap();
        assert!((bell.concurrence().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_split_round_trip() {
        // Give the state a global phase; the split should extract it.
        let phase = Complex64::from_polar(1.0, 0.7);
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let state = QubitState::new(
            vec![phase * half, phase * Complex64::new(0.0, half)],
            1.0,
        )
        .unwrap();

        let split = state.split();
        let Recombined::Amplitudes(back) = split.combine() else {
            panic!("qubit split must recombine to amplitudes");
        };
        for (orig, rec) in state.amplitudes().iter().zip(back.iter()) {
            assert!((orig - rec).norm() < 1e-12);
        }

        // The logical part's leading amplitude is phase-free.
        let MirrorSplit::LogicalPhase { logical, .. } = split else {
            panic!("wrong split kind");
        };
        assert!(logical[0].im.abs() < 1e-12);
    }

    #[test]
    fn test_evolution_preserves_norm() {
        let mut state = plus_state();
        for _ in 0..200 {
            state.breath_update(&params(0.1, 0.0)).unwrap();
        }
        assert!((state.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_evolution_rotates_bloch_vector() {
        // |+⟩ under H = ω/2·σz precesses in the equatorial plane.
        let mut state = plus_state();
        let (x0, _, z0) = state.bloch_coords().unwrap();
        assert!((x0 - 1.0).abs() < 1e-9);

        for _ in 0..10 {
            state.breath_update(&params(0.1, 0.0)).unwrap();
        }

        let (x1, y1, z1) = state.bloch_coords().unwrap();
        assert!((z1 - z0).abs() < 1e-9, "z must be conserved under σz");
        assert!((x1 - 1.0).abs() > 1e-3 || y1.abs() > 1e-3, "state must precess");
        // The Bloch vector stays on the unit sphere.
        let r = (x1 * x1 + y1 * y1 + z1 * z1).sqrt();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bell_concurrence_stable_under_evolution() {
        let mut bell = QubitState::bell(1.0).unwrap();
        for _ in 0..200 {
            bell.breath_update(&params(0.1, 0.0)).unwrap();
        }
        assert!((bell.concurrence().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_phase_kick_preserves_bell_concurrence() {
        let mut bell = QubitState::bell(1.0).unwrap();
        bell.perturb(&Kick::PhaseKick {
            radians: std::f64::consts::FRAC_PI_2,
        })
        .unwrap();
        assert!((bell.concurrence().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_state_jolt_degrades_then_gain_restores_concurrence() {
        let mut bell = QubitState::bell(1.0).unwrap();
        bell.perturb(&Kick::StateJolt {
            index: 1,
            re: 0.5,
            im: 0.0,
        })
        .unwrap();
        let kicked = bell.concurrence().unwrap();
        assert!(kicked < 0.95, "concurrence after jolt: {kicked}");

        for _ in 0..30 {
            bell.breath_update(&params(0.1, 0.2)).unwrap();
        }
        let recovered = bell.concurrence().unwrap();
        assert!(recovered > 0.99, "concurrence after recovery: {recovered}");
    }

    #[test]
    fn test_perturb_rejects_foreign_kick() {
        let mut state = plus_state();
        let err = state
            .perturb(&Kick::MassInjection { amount: 1.0 })
            .unwrap_err();
        assert!(err.is_domain_local());
    }

    #[test]
    fn test_jolt_index_out_of_range() {
        let mut state = plus_state();
        let err = state
            .perturb(&Kick::StateJolt {
                index: 5,
                re: 0.1,
                im: 0.0,
            })
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_single_qubit_invariant_is_norm() {
        let state = plus_state();
        let inv = state.invariant().unwrap();
        assert!((inv.primary - 1.0).abs() < 1e-12);
        assert!(inv.secondary.is_none());
    }
}
