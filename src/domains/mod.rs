//! Mirror domain simulators.
//!
//! Five mathematically distinct toy systems share one capability set:
//! split a state into two complementary parts, advance it with an
//! invariant-preserving breath update, apply one-shot kicks, and report a
//! conserved (or near-conserved) quantity. The domain set is fixed and
//! small, so the simulators are a closed set of tagged variants behind
//! `DomainState` rather than an open trait hierarchy.

pub mod graph;
pub mod number_theory;
pub mod oscillator;
pub mod qubit;
pub mod thermo;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub use graph::GraphState;
pub use number_theory::MertensState;
pub use oscillator::OscillatorState;
pub use qubit::QubitState;
pub use thermo::ThermoState;

use crate::engine::rng::MirrorRng;
use crate::engine::schedule::Kick;
use crate::error::MirrorResult;

/// Identifier for one of the five mirror domains.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum DomainId {
    /// Harmonic oscillator (leap-frog).
    Oscillator,
    /// Single or two-qubit unitary evolution.
    Qubit,
    /// Möbius/Mertens partial sums.
    NumberTheoretic,
    /// Directed graph under two-hop renormalization.
    Graph,
    /// Discrete probability distribution under shift + diffusion.
    Thermodynamic,
}

impl DomainId {
    /// All domains, in tick order (step-major history is domain-minor in
    /// this order).
    pub const ALL: [Self; 5] = [
        Self::Oscillator,
        Self::Qubit,
        Self::NumberTheoretic,
        Self::Graph,
        Self::Thermodynamic,
    ];

    /// Stable lowercase name, used in error messages and exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oscillator => "oscillator",
            Self::Qubit => "qubit",
            Self::NumberTheoretic => "number-theoretic",
            Self::Graph => "graph",
            Self::Thermodynamic => "thermodynamic",
        }
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters fed into one breath update.
///
/// `rate` is the adaptive step size (interpreted per domain: timestep for
/// the oscillator and qubit, blend fraction for the graph and
/// distribution). `gain` is the kick-response gain driving each domain's
/// invariant-restoring relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreathParams {
    /// Adaptive step size for this tick.
    pub rate: f64,
    /// Kick-response gain for this tick.
    pub gain: f64,
}

/// A conserved (or near-conserved) quantity reported by a domain.
///
/// `primary` is what the engine aggregates; `secondary` carries the second
/// element of pair invariants (the thermodynamic domain's entropy).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    /// Aggregated scalar.
    pub primary: f64,
    /// Optional companion value, reported but not aggregated.
    pub secondary: Option<f64>,
}

impl Invariant {
    /// A scalar invariant.
    #[must_use]
    pub const fn scalar(primary: f64) -> Self {
        Self {
            primary,
            secondary: None,
        }
    }

    /// A pair invariant.
    #[must_use]
    pub const fn pair(primary: f64, secondary: f64) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    /// Whether every component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.primary.is_finite() && self.secondary.map_or(true, f64::is_finite)
    }
}

/// The two complementary parts produced by a domain's mirror split.
///
/// Splits are derived views: recomputed on each call, never mutated in
/// place. `combine` reproduces the quantity the split was taken from.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorSplit {
    /// Positive/negative frequency components of the oscillator.
    FrequencyComponents {
        /// Positive-frequency component.
        positive: Complex64,
        /// Negative-frequency component.
        negative: Complex64,
        /// Oscillator frequency, needed to reconstruct momentum.
        omega: f64,
    },
    /// Global-phase-free logical part and extracted phase of a qubit state.
    LogicalPhase {
        /// Phase-removed amplitudes.
        logical: Vec<Complex64>,
        /// Global phase factor (unit modulus).
        phase: Complex64,
    },
    /// Cumulative counts of μ = +1 and μ = −1 terms.
    SignedCounts {
        /// Cumulative count of μ = +1 terms.
        positive: Vec<f64>,
        /// Cumulative count of μ = −1 terms.
        negative: Vec<f64>,
    },
    /// Symmetric and antisymmetric parts of the adjacency matrix.
    MatrixParts {
        /// Symmetric (undirected) part, row-major.
        symmetric: Vec<f64>,
        /// Antisymmetric (orientation) part, row-major.
        antisymmetric: Vec<f64>,
        /// Matrix dimension.
        nodes: usize,
    },
    /// Reversible and irreversible parts of the distribution.
    DistributionParts {
        /// Reversible component.
        reversible: Vec<f64>,
        /// Irreversible (diffusive residue) component.
        irreversible: Vec<f64>,
    },
}

/// The quantity reconstructed by recombining a mirror split.
#[derive(Debug, Clone, PartialEq)]
pub enum Recombined {
    /// Oscillator phase-space point.
    PhaseSpace {
        /// Position.
        q: f64,
        /// Momentum.
        p: f64,
    },
    /// Qubit amplitudes.
    Amplitudes(Vec<Complex64>),
    /// Mertens partial-sum sequence.
    Sequence(Vec<f64>),
    /// Adjacency matrix, row-major.
    Matrix(Vec<f64>),
    /// Probability distribution.
    Distribution(Vec<f64>),
}

impl MirrorSplit {
    /// Recombine the two parts.
    ///
    /// For every domain, `combine(split(state))` reproduces the state's
    /// defining quantity within numerical tolerance.
    #[must_use]
    pub fn combine(&self) -> Recombined {
        match self {
            Self::FrequencyComponents {
                positive,
                negative,
                omega,
            } => {
                let sum = positive + negative;
                let diff = positive - negative;
                Recombined::PhaseSpace {
                    q: sum.re,
                    p: omega * diff.im,
                }
            }
            Self::LogicalPhase { logical, phase } => {
                Recombined::Amplitudes(logical.iter().map(|a| a * phase).collect())
            }
            Self::SignedCounts { positive, negative } => Recombined::Sequence(
                positive
                    .iter()
                    .zip(negative.iter())
                    .map(|(p, n)| p - n)
                    .collect(),
            ),
            Self::MatrixParts {
                symmetric,
                antisymmetric,
                ..
            } => Recombined::Matrix(
                symmetric
                    .iter()
                    .zip(antisymmetric.iter())
                    .map(|(s, a)| s + a)
                    .collect(),
            ),
            Self::DistributionParts {
                reversible,
                irreversible,
            } => Recombined::Distribution(
                reversible
                    .iter()
                    .zip(irreversible.iter())
                    .map(|(r, i)| r + i)
                    .collect(),
            ),
        }
    }
}

/// One domain simulator, tagged by variant.
///
/// Owns its state exclusively; states are never shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainState {
    /// Harmonic oscillator.
    Oscillator(OscillatorState),
    /// Qubit register.
    Qubit(QubitState),
    /// Mertens partial sums.
    NumberTheoretic(MertensState),
    /// Directed graph.
    Graph(GraphState),
    /// Discrete distribution.
    Thermodynamic(ThermoState),
}

impl DomainState {
    /// The domain this state belongs to.
    #[must_use]
    pub const fn id(&self) -> DomainId {
        match self {
            Self::Oscillator(_) => DomainId::Oscillator,
            Self::Qubit(_) => DomainId::Qubit,
            Self::NumberTheoretic(_) => DomainId::NumberTheoretic,
            Self::Graph(_) => DomainId::Graph,
            Self::Thermodynamic(_) => DomainId::Thermodynamic,
        }
    }

    /// Split the state into its two complementary mirror parts.
    #[must_use]
    pub fn split(&self) -> MirrorSplit {
        match self {
            Self::Oscillator(s) => s.split(),
            Self::Qubit(s) => s.split(),
            Self::NumberTheoretic(s) => s.split(),
            Self::Graph(s) => s.split(),
            Self::Thermodynamic(s) => s.split(),
        }
    }

    /// Advance the state by one breath step.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the update produces a non-finite
    /// value.
    pub fn breath_update(&mut self, params: &BreathParams) -> MirrorResult<()> {
        match self {
            Self::Oscillator(s) => s.breath_update(params),
            Self::Qubit(s) => s.breath_update(params),
            Self::NumberTheoretic(s) => s.breath_update(params),
            Self::Graph(s) => s.breath_update(params),
            Self::Thermodynamic(s) => s.breath_update(params),
        }
    }

    /// Apply a one-shot kick and re-validate the state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the kick drives the state off its valid
    /// manifold and renormalization cannot repair it, or if the kick kind
    /// does not target this domain.
    pub fn perturb(&mut self, kick: &Kick, rng: &mut MirrorRng) -> MirrorResult<()> {
        match self {
            Self::Oscillator(s) => s.perturb(kick),
            Self::Qubit(s) => s.perturb(kick),
            Self::NumberTheoretic(s) => s.perturb(kick),
            Self::Graph(s) => s.perturb(kick, rng),
            Self::Thermodynamic(s) => s.perturb(kick, rng),
        }
    }

    /// Compute the domain's invariant from the current state.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the invariant is non-finite.
    pub fn invariant(&self) -> MirrorResult<Invariant> {
        match self {
            Self::Oscillator(s) => s.invariant(),
            Self::Qubit(s) => s.invariant(),
            Self::NumberTheoretic(s) => s.invariant(),
            Self::Graph(s) => s.invariant(),
            Self::Thermodynamic(s) => s.invariant(),
        }
    }
}
