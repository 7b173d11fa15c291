//! Perturbation schedules.
//!
//! A schedule is an externally supplied, ordered list of delta-kicks:
//! (step, domain, kick descriptor). The engine applies each kick exactly
//! once, immediately after that step's breath update; it never generates
//! kicks on its own. Schedules are validated in full before a run starts,
//! so an out-of-range entry can never surface mid-run.

use serde::{Deserialize, Serialize};

use crate::domains::DomainId;
use crate::error::{MirrorError, MirrorResult};

/// One-shot perturbation descriptor.
///
/// Each kind targets a single domain family; the pairing is checked during
/// schedule validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Kick {
    /// Additive jolt to the oscillator's position and momentum.
    AmplitudeJolt {
        /// Position displacement.
        dq: f64,
        /// Momentum displacement.
        dp: f64,
    },
    /// Phase shift applied to the qubit's first amplitude.
    PhaseKick {
        /// Phase shift in radians.
        radians: f64,
    },
    /// Additive complex jolt to one qubit amplitude (renormalized after).
    StateJolt {
        /// Amplitude index.
        index: usize,
        /// Real part of the jolt.
        re: f64,
        /// Imaginary part of the jolt.
        im: f64,
    },
    /// Mass injected into the number-theoretic partial sum.
    MassInjection {
        /// Injected mass; decays under subsequent breath updates.
        amount: f64,
    },
    /// Toggle random directed edges of the graph (self-loops skipped).
    EdgeToggle {
        /// Number of toggle draws.
        count: usize,
    },
    /// Probability mass added at one state of the distribution.
    ProbabilityMass {
        /// Mass to add (the distribution is renormalized after).
        amount: f64,
        /// Target state; drawn from the run's RNG stream when absent.
        position: Option<usize>,
    },
}

impl Kick {
    /// Check whether this kick kind targets the given domain.
    #[must_use]
    pub const fn applies_to(&self, domain: DomainId) -> bool {
        matches!(
            (self, domain),
            (Self::AmplitudeJolt { .. }, DomainId::Oscillator)
                | (Self::PhaseKick { .. }, DomainId::Qubit)
                | (Self::StateJolt { .. }, DomainId::Qubit)
                | (Self::MassInjection { .. }, DomainId::NumberTheoretic)
                | (Self::EdgeToggle { .. }, DomainId::Graph)
                | (Self::ProbabilityMass { .. }, DomainId::Thermodynamic)
        )
    }
}

/// A kick bound to a step and a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledKick {
    /// Step index at which the kick fires.
    pub step: usize,
    /// Domain the kick targets.
    pub domain: DomainId,
    /// The kick descriptor.
    pub kick: Kick,
}

/// Ordered list of scheduled kicks.
///
/// Entries are kept sorted step-major, domain-minor, matching the order in
/// which the engine applies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PerturbationSchedule {
    entries: Vec<ScheduledKick>,
}

impl PerturbationSchedule {
    /// Create a schedule from a list of kicks (sorted internally).
    #[must_use]
    pub fn new(mut entries: Vec<ScheduledKick>) -> Self {
        entries.sort_by_key(|e| (e.step, e.domain));
        Self { entries }
    }

    /// An empty schedule.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of scheduled kicks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schedule has no kicks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in application order.
    #[must_use]
    pub fn entries(&self) -> &[ScheduledKick] {
        &self.entries
    }

    /// The step of the last scheduled kick, if any.
    ///
    /// Computed as a maximum, so it holds even for schedules deserialized
    /// in file order.
    #[must_use]
    pub fn last_step(&self) -> Option<usize> {
        self.entries.iter().map(|e| e.step).max()
    }

    /// Kicks firing at (step, domain), in order.
    pub fn kicks_at(&self, step: usize, domain: DomainId) -> impl Iterator<Item = &Kick> {
        self.entries
            .iter()
            .filter(move |e| e.step == step && e.domain == domain)
            .map(|e| &e.kick)
    }

    /// Validate the schedule against a run horizon and the enabled domains.
    ///
    /// # Errors
    ///
    /// Returns `Config` if an entry's step is outside `[0, steps)`, targets
    /// a domain that is not enabled, or pairs a kick kind with the wrong
    /// domain.
    pub fn validate(&self, steps: usize, enabled: &[DomainId]) -> MirrorResult<()> {
        for entry in &self.entries {
            if entry.step >= steps {
                return Err(MirrorError::config(format!(
                    "scheduled kick at step {} is outside the run horizon [0, {steps})",
                    entry.step
                )));
            }
            if !enabled.contains(&entry.domain) {
                return Err(MirrorError::config(format!(
                    "scheduled kick targets disabled domain {}",
                    entry.domain
                )));
            }
            if !entry.kick.applies_to(entry.domain) {
                return Err(MirrorError::config(format!(
                    "kick {:?} does not apply to the {} domain",
                    entry.kick, entry.domain
                )));
            }
        }
        Ok(())
    }
}
