//! Capability optimizer: randomized search over engine parameters.
//!
//! The Mirror Engine is treated as a black-box scored function. Each
//! trial samples a candidate parameter set (uniform or log-uniform per
//! field), runs the engine to completion against the shared initial
//! conditions and schedule, and scores the harmonic mean of the run's
//! final reach and stability. Trials are embarrassingly parallel: every
//! trial derives its own RNG stream from the master seed, so rankings are
//! identical whatever the thread count or trial order.
//!
//! Ties break toward lower perturbation-recovery time (steps from the
//! last scheduled kick until stability first returns above 0.95; never is
//! worst), then by trial index so the ordering is total. A trial whose
//! run fails scores 0 and never outranks a completed trial.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::engine::rng::MirrorRng;
use crate::engine::{MirrorEngine, RunOutcome, RunReport};
use crate::error::{MirrorError, MirrorResult};

/// Stability level that counts as "recovered" for the tie-break.
const RECOVERY_THRESHOLD: f64 = 0.95;

/// Sampling bound for one tunable field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    /// Lower bound (inclusive).
    pub lo: f64,
    /// Upper bound (inclusive).
    pub hi: f64,
    /// Sample log-uniformly instead of uniformly.
    #[serde(default)]
    pub log: bool,
}

impl Bound {
    /// A uniform bound.
    #[must_use]
    pub const fn uniform(lo: f64, hi: f64) -> Self {
        Self { lo, hi, log: false }
    }

    /// A log-uniform bound (positive endpoints).
    #[must_use]
    pub const fn log_uniform(lo: f64, hi: f64) -> Self {
        Self { lo, hi, log: true }
    }

    /// Draw one sample.
    fn sample(&self, rng: &mut MirrorRng) -> f64 {
        if self.log {
            rng.gen_log_range_f64(self.lo, self.hi)
        } else {
            rng.gen_range_f64(self.lo, self.hi)
        }
    }

    fn validate(&self, name: &str) -> MirrorResult<()> {
        if !self.lo.is_finite() || !self.hi.is_finite() || self.lo > self.hi {
            return Err(MirrorError::config(format!(
                "bound for {name} must satisfy lo <= hi with finite endpoints"
            )));
        }
        if self.log && self.lo <= 0.0 {
            return Err(MirrorError::config(format!(
                "log-uniform bound for {name} needs positive endpoints"
            )));
        }
        Ok(())
    }
}

/// Bounds for every tunable engine parameter.
///
/// Rates and bands are sampled as multiplicative scales on each domain's
/// configured values; gain, damping, and restore are absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Scale on each domain's base breath rate.
    pub rate_scale: Bound,
    /// Kick-response gain, shared by all domains.
    pub gain: Bound,
    /// Controller damping factor.
    pub damping: Bound,
    /// Controller restore factor.
    pub restore: Bound,
    /// Scale on each domain's tolerance bands.
    pub band_scale: Bound,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            rate_scale: Bound::log_uniform(0.25, 2.0),
            gain: Bound::uniform(0.02, 0.5),
            damping: Bound::uniform(0.2, 0.9),
            restore: Bound::uniform(0.1, 1.0),
            band_scale: Bound::log_uniform(0.5, 2.0),
        }
    }
}

impl SearchSpace {
    fn validate(&self) -> MirrorResult<()> {
        self.rate_scale.validate("rate_scale")?;
        self.gain.validate("gain")?;
        self.damping.validate("damping")?;
        self.restore.validate("restore")?;
        self.band_scale.validate("band_scale")?;
        Ok(())
    }

    fn sample(&self, rng: &mut MirrorRng) -> CandidateParams {
        CandidateParams {
            rate_scale: self.rate_scale.sample(rng),
            gain: self.gain.sample(rng),
            damping: self.damping.sample(rng),
            restore: self.restore.sample(rng),
            band_scale: self.band_scale.sample(rng),
        }
    }
}

/// One sampled candidate parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateParams {
    /// Scale applied to each domain's base breath rate.
    pub rate_scale: f64,
    /// Kick-response gain for every domain.
    pub gain: f64,
    /// Controller damping factor.
    pub damping: f64,
    /// Controller restore factor.
    pub restore: f64,
    /// Scale applied to each domain's tolerance bands.
    pub band_scale: f64,
}

impl CandidateParams {
    /// Apply this candidate to a base configuration, producing the trial
    /// configuration.
    #[must_use]
    pub fn apply(&self, base: &EngineConfig, seed: u64) -> EngineConfig {
        let mut config = base.clone();
        config.seed = seed;
        for spec in &mut config.domains {
            spec.gain = self.gain;
            let mut tuning = spec.tuning();
            tuning.base_rate *= self.rate_scale;
            tuning.min_rate *= self.rate_scale;
            tuning.damping = self.damping;
            tuning.restore = self.restore;
            tuning.outer_band *= self.band_scale;
            tuning.inner_band *= self.band_scale;
            spec.tuning = Some(tuning);
        }
        config
    }
}

/// One ranked trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// The sampled parameters.
    pub params: CandidateParams,
    /// Harmonic mean of the run's final reach and stability (0 for a
    /// failed trial).
    pub score: f64,
    /// Steps from the last scheduled kick until stability first returned
    /// above the recovery threshold; `None` if it never did.
    pub recovery_steps: Option<usize>,
    /// Trial index (final tie-break).
    pub trial: usize,
    /// Failure cause when the trial's run did not complete.
    pub failure: Option<String>,
}

/// Optimizer configuration: search space, trial count, top-K, seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Per-field sampling bounds.
    #[serde(default)]
    pub space: SearchSpace,
    /// Number of independent trials.
    pub trials: usize,
    /// How many candidates to return.
    pub top_k: usize,
    /// Master seed; every trial derives stream `seed ⊕ trial`.
    pub seed: u64,
}

/// Stateless randomized search over engine parameters.
#[derive(Debug, Clone)]
pub struct CapabilityOptimizer {
    config: OptimizerConfig,
}

impl CapabilityOptimizer {
    /// Create an optimizer after validating its configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` for empty trial counts, a zero top-K, or
    /// malformed bounds.
    pub fn new(config: OptimizerConfig) -> MirrorResult<Self> {
        if config.trials == 0 {
            return Err(MirrorError::config("trial count must be at least 1"));
        }
        if config.top_k == 0 {
            return Err(MirrorError::config("top-K must be at least 1"));
        }
        config.space.validate()?;
        Ok(Self { config })
    }

    /// The optimizer configuration.
    #[must_use]
    pub const fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the search against a base configuration and return the top-K
    /// candidates, best first.
    ///
    /// The base configuration supplies the initial conditions, schedule,
    /// and horizon shared by all trials.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the base configuration itself is invalid.
    /// Individual trial failures are contained: they score 0 and stay in
    /// the ranking with their cause attached.
    pub fn search(&self, base: &EngineConfig) -> MirrorResult<Vec<RankedCandidate>> {
        base.validate_semantic()?;

        let trials: Vec<usize> = (0..self.config.trials).collect();

        #[cfg(feature = "parallel")]
        let mut ranked: Vec<RankedCandidate> = trials
            .par_iter()
            .map(|&trial| self.run_trial(base, trial))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let mut ranked: Vec<RankedCandidate> = trials
            .iter()
            .map(|&trial| self.run_trial(base, trial))
            .collect();

        ranked.sort_by(compare_candidates);
        ranked.truncate(self.config.top_k);
        Ok(ranked)
    }

    fn run_trial(&self, base: &EngineConfig, trial: usize) -> RankedCandidate {
        let mut rng = MirrorRng::stream(self.config.seed, trial as u64);
        let params = self.config.space.sample(&mut rng);
        let trial_seed = rng.gen_u64();
        let config = params.apply(base, trial_seed);

        let report = match MirrorEngine::new(config) {
            Ok(engine) => engine.run(),
            Err(e) => {
                // A candidate can sample itself into an invalid corner of
                // a caller-specified space; that trial scores 0.
                return RankedCandidate {
                    params,
                    score: 0.0,
                    recovery_steps: None,
                    trial,
                    failure: Some(e.to_string()),
                };
            }
        };

        match report.outcome {
            RunOutcome::Completed => RankedCandidate {
                params,
                score: score_report(&report),
                recovery_steps: recovery_steps(&report, base),
                trial,
                failure: None,
            },
            RunOutcome::Failed { cause } => RankedCandidate {
                params,
                score: 0.0,
                recovery_steps: None,
                trial,
                failure: Some(MirrorError::TrialFailed { trial, cause }.to_string()),
            },
            // run() cannot abort; treat it like a failure if it ever does.
            RunOutcome::Aborted { at_step } => RankedCandidate {
                params,
                score: 0.0,
                recovery_steps: None,
                trial,
                failure: Some(format!("trial aborted at step {at_step}")),
            },
        }
    }
}

/// Harmonic mean of the final reach and stability.
fn score_report(report: &RunReport) -> f64 {
    let reach = report.history.final_reach().unwrap_or(0.0);
    let stability = report.history.final_stability().unwrap_or(0.0);
    harmonic_mean(reach, stability)
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a <= 0.0 || b <= 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

/// Steps until stability first returned above the threshold after the
/// last scheduled kick.
fn recovery_steps(report: &RunReport, base: &EngineConfig) -> Option<usize> {
    let Some(last_kick) = base.schedule.last_step() else {
        return Some(0);
    };
    report
        .history
        .records()
        .iter()
        .find(|r| r.step >= last_kick && r.stability >= RECOVERY_THRESHOLD)
        .map(|r| r.step - last_kick)
}

/// Completed trials first, then score descending, then faster recovery,
/// then trial index.
fn compare_candidates(a: &RankedCandidate, b: &RankedCandidate) -> std::cmp::Ordering {
    let failed_a = a.failure.is_some();
    let failed_b = b.failure.is_some();
    failed_a
        .cmp(&failed_b)
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| match (a.recovery_steps, b.recovery_steps) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
        .then_with(|| a.trial.cmp(&b.trial))
}
