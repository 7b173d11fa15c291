//! Thermodynamic mirror domain.
//!
//! The state is a discrete probability distribution over n states with a
//! linear energy spectrum on [0, 1]. The breath update mixes a periodic
//! (reversible) shift with a Gaussian-kernel (irreversible) diffusion, then
//! relaxes toward the uniform distribution at the kick-response gain and
//! renormalizes. The invariant pair is (expected energy, Shannon entropy):
//! energy is held near its baseline by the relaxation, entropy never
//! decreases because every stage is entropy non-decreasing (the shift
//! permutes, the diffusion and the uniform mixing are doubly-stochastic
//! averages).
//!
//! The mirror split follows the diffusion residue: the irreversible part is
//! the positive excess the kernel would add, the reversible part is the
//! remainder.

use serde::{Deserialize, Serialize};

use super::{BreathParams, DomainId, Invariant, MirrorSplit};
use crate::engine::rng::MirrorRng;
use crate::engine::schedule::Kick;
use crate::error::{MirrorError, MirrorResult};

/// Offset guarding `ln` in the entropy sum.
const ENTROPY_EPS: f64 = 1e-12;

/// Discrete distribution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermoState {
    /// Probability distribution (normalized, non-negative).
    dist: Vec<f64>,
    /// Linear energy spectrum on [0, 1].
    energies: Vec<f64>,
    /// Gaussian kernel width.
    sigma: f64,
    /// Periodic shift of the reversible update.
    shift: i64,
    /// Row-normalized Gaussian kernel, row-major.
    kernel: Vec<f64>,
}

impl ThermoState {
    /// Create a distribution state.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the distribution has fewer than 3 states,
    /// contains negative or non-finite mass, sums to zero, or if σ is not
    /// positive.
    pub fn new(distribution: Vec<f64>, sigma: f64, shift: i64) -> MirrorResult<Self> {
        let n = distribution.len();
        if n < 3 {
            return Err(MirrorError::config(
                "distribution needs at least 3 states",
            ));
        }
        if distribution.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(MirrorError::config(
                "distribution mass must be finite and non-negative",
            ));
        }
        let total: f64 = distribution.iter().sum();
        if total <= f64::EPSILON {
            return Err(MirrorError::config("distribution must have non-zero mass"));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(MirrorError::config(format!(
                "kernel width must be positive, got {sigma}"
            )));
        }

        let dist: Vec<f64> = distribution.iter().map(|p| p / total).collect();
        let energies: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
        let kernel = gaussian_kernel(n, sigma);
        Ok(Self {
            dist,
            energies,
            sigma,
            shift,
            kernel,
        })
    }

    /// A delta peak at the center of `n_states` states.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the parameters are invalid.
    pub fn peaked(n_states: usize, sigma: f64, shift: i64) -> MirrorResult<Self> {
        if n_states < 3 {
            return Err(MirrorError::config(
                "distribution needs at least 3 states",
            ));
        }
        let mut dist = vec![0.0; n_states];
        dist[n_states / 2] = 1.0;
        Self::new(dist, sigma, shift)
    }

    /// The current distribution.
    #[must_use]
    pub fn distribution(&self) -> &[f64] {
        &self.dist
    }

    /// Number of states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dist.len()
    }

    /// Always false: construction requires at least 3 states.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dist.is_empty()
    }

    /// Expected energy under the linear spectrum.
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.dist
            .iter()
            .zip(self.energies.iter())
            .map(|(p, e)| p * e)
            .sum()
    }

    /// Shannon entropy (base e).
    #[must_use]
    pub fn entropy(&self) -> f64 {
        -self
            .dist
            .iter()
            .map(|p| p * (p + ENTROPY_EPS).ln())
            .sum::<f64>()
    }

    /// Split into reversible and irreversible parts via the diffusion
    /// residue.
    #[must_use]
    pub fn split(&self) -> MirrorSplit {
        let diffused = self.diffuse(&self.dist);
        let irreversible: Vec<f64> = diffused
            .iter()
            .zip(self.dist.iter())
            .map(|(d, p)| (d - p).max(0.0))
            .collect();
        let reversible: Vec<f64> = self
            .dist
            .iter()
            .zip(irreversible.iter())
            .map(|(p, irr)| p - irr)
            .collect();
        MirrorSplit::DistributionParts {
            reversible,
            irreversible,
        }
    }

    /// One breath step: mix shift and diffusion, relax toward uniform at
    /// the kick-response gain, blend at the adaptive rate, renormalize.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the update produces non-finite
    /// mass, `InvalidState` if the mass collapses.
    pub fn breath_update(&mut self, params: &BreathParams) -> MirrorResult<()> {
        let n = self.dist.len();
        let shifted = roll(&self.dist, self.shift);
        let diffused = self.diffuse(&self.dist);

        let gain = params.gain.clamp(0.0, 1.0);
        let rate = params.rate.clamp(0.0, 1.0);
        let uniform = 1.0 / n as f64;

        for i in 0..n {
            let mixed = 0.5 * (shifted[i] + diffused[i]);
            let relaxed = (1.0 - gain) * mixed + gain * uniform;
            self.dist[i] = (1.0 - rate) * self.dist[i] + rate * relaxed;
        }

        self.renormalize()?;
        self.check_finite("breath_update")
    }

    /// Add probability mass at one state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the kick leaves negative mass (not
    /// repairable by renormalization) or collapses the distribution, and
    /// for kick kinds that do not target this domain.
    pub fn perturb(&mut self, kick: &Kick, rng: &mut MirrorRng) -> MirrorResult<()> {
        match kick {
            Kick::ProbabilityMass { amount, position } => {
                let n = self.dist.len();
                let pos = match position {
                    Some(p) if *p < n => *p,
                    Some(p) => {
                        return Err(MirrorError::invalid_state(
                            DomainId::Thermodynamic,
                            format!("kick position {p} out of range for {n} states"),
                        ));
                    }
                    None => rng.gen_index(n),
                };
                self.dist[pos] += amount;
                if self.dist.iter().any(|p| *p < 0.0) {
                    return Err(MirrorError::invalid_state(
                        DomainId::Thermodynamic,
                        "negative probability mass cannot be repaired by renormalization",
                    ));
                }
                self.renormalize()?;
                self.check_finite("perturb")
            }
            other => Err(MirrorError::invalid_state(
                DomainId::Thermodynamic,
                format!("kick {other:?} does not target the thermodynamic domain"),
            )),
        }
    }

    /// Invariant pair: expected energy (aggregated) and Shannon entropy.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if either value is non-finite.
    pub fn invariant(&self) -> MirrorResult<Invariant> {
        let invariant = Invariant::pair(self.energy(), self.entropy());
        if invariant.is_finite() {
            Ok(invariant)
        } else {
            Err(MirrorError::numeric(DomainId::Thermodynamic, "invariant"))
        }
    }

    fn diffuse(&self, dist: &[f64]) -> Vec<f64> {
        let n = dist.len();
        let mut out = vec![0.0; n];
        for (i, &p) in dist.iter().enumerate() {
            if p == 0.0 {
                continue;
            }
            for j in 0..n {
                out[j] += p * self.kernel[i * n + j];
            }
        }
        out
    }

    fn renormalize(&mut self) -> MirrorResult<()> {
        let total: f64 = self.dist.iter().sum();
        if total <= f64::EPSILON || !total.is_finite() {
            return Err(MirrorError::invalid_state(
                DomainId::Thermodynamic,
                "distribution mass collapsed and cannot be repaired",
            ));
        }
        for p in &mut self.dist {
            *p /= total;
        }
        Ok(())
    }

    fn check_finite(&self, location: &str) -> MirrorResult<()> {
        if self.dist.iter().all(|p| p.is_finite()) {
            Ok(())
        } else {
            Err(MirrorError::numeric(DomainId::Thermodynamic, location))
        }
    }
}

/// Row-normalized Gaussian kernel.
fn gaussian_kernel(n: usize, sigma: f64) -> Vec<f64> {
    let mut kernel = vec![0.0; n * n];
    let denom = 2.0 * sigma * sigma;
    for i in 0..n {
        let mut row_sum = 0.0;
        for j in 0..n {
            let d = i as f64 - j as f64;
            let w = (-d * d / denom).exp();
            kernel[i * n + j] = w;
            row_sum += w;
        }
        for j in 0..n {
            kernel[i * n + j] /= row_sum;
        }
    }
    kernel
}

/// Periodic shift (positive moves mass toward higher indices).
fn roll(dist: &[f64], shift: i64) -> Vec<f64> {
    let n = dist.len() as i64;
    let mut out = vec![0.0; dist.len()];
    for (i, &p) in dist.iter().enumerate() {
        let target = (i as i64 + shift).rem_euclid(n) as usize;
        out[target] = p;
    }
    out
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
        assert!(ThermoState::new(vec![0.5, 0.5], 1.0, 1).is_err());
        assert!(ThermoState::new(vec![0.5, -0.1, 0.6], 1.0, 1).is_err());
        assert!(ThermoState::new(vec![0.0, 0.0, 0.0], 1.0, 1).is_err());
        assert!(ThermoState::new(vec![0.2, 0.3, 0.5], 0.0, 1).is_err());
        assert!(ThermoState::new(vec![0.2, 0.3, 0.5], 1.0, 1).is_ok());
    }

    #[test]
    fn test_normalized_on_construction() {
        let state = ThermoState::new(vec![2.0, 3.0, 5.0], 1.0, 1).unwrap();
        let total: f64 = state.distribution().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_peaked_energy_is_half() {
        let state = ThermoState::peaked(51, 1.0, 1).unwrap();
        assert!((state.energy() - 0.5).abs() < 1e-12);
        assert!(state.entropy() < 1e-6, "delta peak has near-zero entropy");
    }

    #[test]
    fn test_roll_wraps_periodically() {
        let rolled = roll(&[1.0, 0.0, 0.0, 0.0], 1);
        assert_eq!(rolled, vec![0.0, 1.0, 0.0, 0.0]);
        let wrapped = roll(&[0.0, 0.0, 0.0, 1.0], 1);
        assert_eq!(wrapped, vec![1.0, 0.0, 0.0, 0.0]);
        let back = roll(&[0.0, 1.0, 0.0, 0.0], -1);
        assert_eq!(back, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_split_round_trip() {
        let state = ThermoState::new(vec![0.1, 0.5, 0.2, 0.1, 0.1], 1.0, 1).unwrap();
        let Recombined::Distribution(back) = state.split().combine() else {
            panic!("thermo split must recombine to a distribution");
        };
        for (orig, rec) in state.distribution().iter().zip(back.iter()) {
            assert!((orig - rec).abs() < 1e-12);
        }
    }

    #[test]
    fn test_breath_conserves_mass() {
        let mut state = ThermoState::peaked(50, 1.0, 1).unwrap();
        for _ in 0..100 {
            state.breath_update(&params(1.0, 0.1)).unwrap();
        }
        let total: f64 = state.distribution().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(state.distribution().iter().all(|p| *p >= 0.0));
    }

    #[test]
    fn test_entropy_non_decreasing_on_average() {
        // The truncated kernel is only approximately doubly stochastic at
        // the boundary, so individual steps may wiggle; the trend must not.
        let mut state = ThermoState::peaked(50, 1.0, 1).unwrap();
        let initial = state.entropy();
        let mut previous = initial;
        let mut diff_sum = 0.0;
        for _ in 0..200 {
            state.breath_update(&params(1.0, 0.1)).unwrap();
            let current = state.entropy();
            assert!(
                current >= previous - 5e-3,
                "entropy dropped sharply: {previous} -> {current}"
            );
            diff_sum += current - previous;
            previous = current;
        }
        assert!(diff_sum / 200.0 >= 0.0, "entropy decreased on average");
        assert!(state.entropy() > initial + 1.0, "peak must have spread");
    }

    #[test]
    fn test_gain_holds_energy_near_baseline() {
        let mut state = ThermoState::peaked(50, 1.0, 1).unwrap();
        let baseline = state.energy();
        for _ in 0..200 {
            state.breath_update(&params(1.0, 0.15)).unwrap();
            let dev = (state.energy() - baseline).abs() / (1.0 + baseline.abs());
            assert!(dev < 0.15, "energy deviation {dev} too large");
        }
    }

    #[test]
    fn test_kick_shifts_energy_then_breath_recovers() {
        let mut rng = MirrorRng::new(42);
        let mut state = ThermoState::peaked(50, 1.0, 1).unwrap();
        let baseline = state.energy();

        state
            .perturb(
                &Kick::ProbabilityMass {
                    amount: 0.5,
                    position: Some(0),
                },
                &mut rng,
            )
            .unwrap();
        let kicked_dev = (state.energy() - baseline).abs() / (1.0 + baseline.abs());
        assert!(kicked_dev > 0.05, "kick must move the energy: {kicked_dev}");

        for _ in 0..60 {
            state.breath_update(&params(1.0, 0.15)).unwrap();
        }
        let dev = (state.energy() - baseline).abs() / (1.0 + baseline.abs());
        assert!(dev < 0.05, "energy deviation {dev} after recovery");
    }

    #[test]
    fn test_negative_mass_is_invalid() {
        let mut rng = MirrorRng::new(42);
        let mut state = ThermoState::new(vec![0.2, 0.3, 0.5], 1.0, 1).unwrap();
        let err = state
            .perturb(
                &Kick::ProbabilityMass {
                    amount: -2.0,
                    position: Some(2),
                },
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(err, MirrorError::InvalidState { .. }));
    }

    #[test]
    fn test_kick_position_out_of_range() {
        let mut rng = MirrorRng::new(42);
        let mut state = ThermoState::new(vec![0.2, 0.3, 0.5], 1.0, 1).unwrap();
        let err = state
            .perturb(
                &Kick::ProbabilityMass {
                    amount: 0.1,
                    position: Some(9),
                },
                &mut rng,
            )
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_perturb_rejects_foreign_kick() {
        let mut rng = MirrorRng::new(42);
        let mut state = ThermoState::new(vec![0.2, 0.3, 0.5], 1.0, 1).unwrap();
        let err = state
            .perturb(&Kick::AmplitudeJolt { dq: 1.0, dp: 0.0 }, &mut rng)
            .unwrap_err();
        assert!(err.is_domain_local());
    }
}
