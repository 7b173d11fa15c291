//! Engine configuration with YAML schema and validation.
//!
//! Mistake-proofing happens in three layers:
//! - type-safe configuration structs,
//! - schema validation via serde + validator,
//! - a semantic pass for constraints the schema cannot express (weight
//!   normalization, band ordering, schedule bounds, initial conditions on
//!   the domain manifold).
//!
//! Every configuration problem is a `Config` error raised before the
//! first tick; nothing here can fail mid-run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::domains::{
    DomainId, DomainState, GraphState, MertensState, OscillatorState, QubitState, ThermoState,
};
use crate::engine::controller::ControllerTuning;
use crate::engine::schedule::PerturbationSchedule;
use crate::error::{MirrorError, MirrorResult};

use num_complex::Complex64;

/// Top-level engine configuration.
///
/// Immutable within one run; the engine takes it at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Master seed for the run's RNG stream.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of ticks to run.
    #[validate(range(min = 1))]
    pub steps: usize,

    /// Aggregation horizon: the window (in ticks, capped to elapsed
    /// ticks) over which reach counts in-tolerance steps.
    #[validate(range(min = 1))]
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    /// Enabled domains.
    #[validate(nested)]
    pub domains: Vec<DomainSpec>,

    /// Externally supplied perturbation schedule.
    #[serde(default)]
    pub schedule: PerturbationSchedule,
}

const fn default_seed() -> u64 {
    42
}

const fn default_horizon() -> usize {
    usize::MAX
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsing fails, or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> MirrorResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> MirrorResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate_semantic()?;
        Ok(config)
    }

    /// Create a builder for programmatic construction.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// The enabled domains, in tick order.
    #[must_use]
    pub fn enabled_domains(&self) -> Vec<DomainId> {
        self.domains.iter().map(|d| d.init.domain_id()).collect()
    }

    /// Validate all constraints, schema and semantic.
    ///
    /// # Errors
    ///
    /// Returns `Config` (or a wrapped `Validation`) describing the first
    /// violated constraint.
    pub fn validate_semantic(&self) -> MirrorResult<()> {
        self.validate()?;

        if self.domains.is_empty() {
            return Err(MirrorError::config("at least one domain must be enabled"));
        }

        let enabled = self.enabled_domains();
        for (i, id) in enabled.iter().enumerate() {
            if enabled[..i].contains(id) {
                return Err(MirrorError::config(format!(
                    "domain {id} is configured more than once"
                )));
            }
        }

        let weight_sum: f64 = self.domains.iter().map(|d| d.weight).sum();
        if !weight_sum.is_finite() || weight_sum <= 0.0 {
            return Err(MirrorError::config(format!(
                "domain weights must sum to a positive value, got {weight_sum}"
            )));
        }

        for spec in &self.domains {
            if !spec.gain.is_finite() {
                return Err(MirrorError::config("kick-response gain must be finite"));
            }
            spec.tuning().validate_semantic()?;
            // Initial conditions must already sit on the domain manifold.
            spec.init.build()?;
        }

        self.schedule.validate(self.steps, &enabled)?;

        Ok(())
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    seed: Option<u64>,
    steps: Option<usize>,
    horizon: Option<usize>,
    domains: Vec<DomainSpec>,
    schedule: Option<PerturbationSchedule>,
}

impl EngineConfigBuilder {
    /// Set the master seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of ticks.
    #[must_use]
    pub const fn steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Set the aggregation horizon.
    #[must_use]
    pub const fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = Some(horizon);
        self
    }

    /// Enable a domain.
    #[must_use]
    pub fn domain(mut self, spec: DomainSpec) -> Self {
        self.domains.push(spec);
        self
    }

    /// Set the perturbation schedule.
    #[must_use]
    pub fn schedule(mut self, schedule: PerturbationSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Build the configuration. Validation happens when the engine is
    /// constructed (or via `validate_semantic`).
    #[must_use]
    pub fn build(self) -> EngineConfig {
        EngineConfig {
            seed: self.seed.unwrap_or(default_seed()),
            steps: self.steps.unwrap_or(100),
            horizon: self.horizon.unwrap_or(default_horizon()),
            domains: self.domains,
            schedule: self.schedule.unwrap_or_default(),
        }
    }
}

/// One enabled domain: weight, kick-response gain, controller tuning and
/// initial condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DomainSpec {
    /// Aggregation weight (normalized over live domains at run time).
    #[validate(range(min = 0.0))]
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Kick-response gain driving the domain's invariant-restoring
    /// relaxation.
    #[validate(range(min = 0.0))]
    #[serde(default = "default_gain")]
    pub gain: f64,

    /// Controller tuning; the per-domain default applies when absent.
    #[serde(default)]
    pub tuning: Option<ControllerTuning>,

    /// Initial condition (also selects the domain).
    pub init: DomainInit,
}

const fn default_weight() -> f64 {
    1.0
}

const fn default_gain() -> f64 {
    0.15
}

impl DomainSpec {
    /// A domain spec with default weight, gain, and tuning.
    #[must_use]
    pub fn new(init: DomainInit) -> Self {
        Self {
            weight: default_weight(),
            gain: default_gain(),
            tuning: None,
            init,
        }
    }

    /// Override the aggregation weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Override the kick-response gain.
    #[must_use]
    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Override the controller tuning.
    #[must_use]
    pub fn with_tuning(mut self, tuning: ControllerTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// The resolved controller tuning.
    #[must_use]
    pub fn tuning(&self) -> ControllerTuning {
        self.tuning
            .clone()
            .unwrap_or_else(|| ControllerTuning::for_domain(self.init.domain_id()))
    }
}

/// Per-domain initial condition.
///
/// Each variant carries the state description the domain validates at run
/// start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "domain")]
pub enum DomainInit {
    /// Oscillator amplitudes.
    Oscillator {
        /// Initial position.
        q: f64,
        /// Initial momentum.
        p: f64,
        /// Angular frequency.
        omega: f64,
    },
    /// Qubit amplitudes as (re, im) pairs; 2 for a single qubit, 4 for a
    /// two-qubit composite.
    Qubit {
        /// Complex amplitudes.
        amplitudes: Vec<[f64; 2]>,
        /// Hamiltonian frequency.
        omega: f64,
    },
    /// Initial partial-sum seed.
    NumberTheoretic {
        /// Seed argument n₀.
        start: u64,
    },
    /// Adjacency matrix.
    Graph {
        /// Row-per-node adjacency weights.
        adjacency: Vec<Vec<f64>>,
    },
    /// Initial distribution.
    Thermodynamic {
        /// Probability masses (normalized on construction).
        distribution: Vec<f64>,
        /// Gaussian kernel width.
        sigma: f64,
        /// Periodic shift of the reversible update.
        shift: i64,
    },
}

impl DomainInit {
    /// The domain this initial condition belongs to.
    #[must_use]
    pub const fn domain_id(&self) -> DomainId {
        match self {
            Self::Oscillator { .. } => DomainId::Oscillator,
            Self::Qubit { .. } => DomainId::Qubit,
            Self::NumberTheoretic { .. } => DomainId::NumberTheoretic,
            Self::Graph { .. } => DomainId::Graph,
            Self::Thermodynamic { .. } => DomainId::Thermodynamic,
        }
    }

    /// Build the domain state, validating the initial condition.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the description violates the domain's
    /// constraints.
    pub fn build(&self) -> MirrorResult<DomainState> {
        match self {
            Self::Oscillator { q, p, omega } => {
                Ok(DomainState::Oscillator(OscillatorState::new(*q, *p, *omega)?))
            }
            Self::Qubit { amplitudes, omega } => {
                let amps = amplitudes
                    .iter()
                    .map(|[re, im]| Complex64::new(*re, *im))
                    .collect();
                Ok(DomainState::Qubit(QubitState::new(amps, *omega)?))
            }
            Self::NumberTheoretic { start } => {
                Ok(DomainState::NumberTheoretic(MertensState::new(*start)?))
            }
            Self::Graph { adjacency } => {
                Ok(DomainState::Graph(GraphState::new(adjacency.clone())?))
            }
            Self::Thermodynamic {
                distribution,
                sigma,
                shift,
            } => Ok(DomainState::Thermodynamic(ThermoState::new(
                distribution.clone(),
                *sigma,
                *shift,
            )?)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::engine::schedule::{Kick, ScheduledKick};

    fn oscillator_init() -> DomainInit {
        DomainInit::Oscillator {
            q: 1.0,
            p: 0.0,
            omega: 1.0,
        }
    }

    fn minimal_config() -> EngineConfig {
        EngineConfig::builder()
            .seed(42)
            .steps(100)
            .domain(DomainSpec::new(oscillator_init()))
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let config = minimal_config();
        assert_eq!(config.seed, 42);
        assert_eq!(config.steps, 100);
        assert_eq!(config.horizon, usize::MAX);
        assert!(config.schedule.is_empty());
        assert!(config.validate_semantic().is_ok());
    }

    #[test]
    fn test_rejects_empty_domains() {
        let config = EngineConfig::builder().steps(10).build();
        let err = config.validate_semantic().unwrap_err();
        assert!(err.to_string().contains("at least one domain"));
    }

    #[test]
    fn test_rejects_duplicate_domains() {
        let config = EngineConfig::builder()
            .steps(10)
            .domain(DomainSpec::new(oscillator_init()))
            .domain(DomainSpec::new(oscillator_init()))
            .build();
        let err = config.validate_semantic().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_zero_weight_sum() {
        let config = EngineConfig::builder()
            .steps(10)
            .domain(DomainSpec::new(oscillator_init()).with_weight(0.0))
            .build();
        let err = config.validate_semantic().unwrap_err();
        assert!(err.to_string().contains("sum to a positive value"));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let config = EngineConfig::builder()
            .steps(10)
            .domain(DomainSpec::new(oscillator_init()).with_weight(-1.0))
            .build();
        assert!(config.validate_semantic().is_err());
    }

    #[test]
    fn test_rejects_invalid_initial_condition() {
        let config = EngineConfig::builder()
            .steps(10)
            .domain(DomainSpec::new(DomainInit::Oscillator {
                q: 0.0,
                p: 0.0,
                omega: 1.0,
            }))
            .build();
        let err = config.validate_semantic().unwrap_err();
        assert!(err.to_string().contains("energy"));
    }

    #[test]
    fn test_rejects_out_of_range_schedule() {
        let schedule = PerturbationSchedule::new(vec![ScheduledKick {
            step: 100,
            domain: DomainId::Oscillator,
            kick: Kick::AmplitudeJolt { dq: 0.0, dp: 1.0 },
        }]);
        let config = EngineConfig::builder()
            .steps(100)
            .domain(DomainSpec::new(oscillator_init()))
            .schedule(schedule)
            .build();
        let err = config.validate_semantic().unwrap_err();
        assert!(err.to_string().contains("outside the run horizon"));
    }

    #[test]
    fn test_tuning_defaults_per_domain() {
        let spec = DomainSpec::new(DomainInit::NumberTheoretic { start: 100 });
        let tuning = spec.tuning();
        assert!((tuning.base_rate - 1.0).abs() < f64::EPSILON);
        assert!((tuning.outer_band - 0.1).abs() < f64::EPSILON);

        let spec = DomainSpec::new(oscillator_init());
        assert!((spec.tuning().base_rate - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = EngineConfig::builder()
            .seed(7)
            .steps(50)
            .horizon(50)
            .domain(DomainSpec::new(oscillator_init()).with_weight(2.0))
            .domain(DomainSpec::new(DomainInit::NumberTheoretic { start: 500 }))
            .build();

        let yaml = serde_yaml::to_string(&config).unwrap();
        let back = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_yaml_literal() {
        let yaml = r"
steps: 20
domains:
  - init:
      domain: oscillator
      q: 1.0
      p: 0.0
      omega: 6.28
  - weight: 0.5
    init:
      domain: thermodynamic
      distribution: [0.0, 1.0, 0.0, 0.0, 0.0]
      sigma: 1.0
      shift: 1
schedule:
  - step: 10
    domain: oscillator
    kick:
      kind: amplitude-jolt
      dq: 0.0
      dp: 1.0
";
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.steps, 20);
        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.schedule.len(), 1);
        assert_eq!(config.seed, 42, "seed falls back to the default");
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let yaml = r"
steps: 20
frobnicate: true
domains: []
";
        assert!(EngineConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_domain_init_ids() {
        assert_eq!(oscillator_init().domain_id(), DomainId::Oscillator);
        assert_eq!(
            DomainInit::Graph {
                adjacency: vec![vec![0.0, 1.0], vec![1.0, 0.0]]
            }
            .domain_id(),
            DomainId::Graph
        );
    }

    #[test]
    fn test_qubit_init_builds_composite() {
        let init = DomainInit::Qubit {
            amplitudes: vec![
                [std::f64::consts::FRAC_1_SQRT_2, 0.0],
                [0.0, 0.0],
                [0.0, 0.0],
                [std::f64::consts::FRAC_1_SQRT_2, 0.0],
            ],
            omega: 1.0,
        };
        let DomainState::Qubit(state) = init.build().unwrap() else {
            panic!("expected a qubit state");
        };
        assert!(state.is_composite());
        assert!((state.concurrence().unwrap() - 1.0).abs() < 1e-12);
    }
}
