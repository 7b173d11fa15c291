//! Mirror Engine: the per-domain tick loop.
//!
//! One run is a state machine `Initialized → Running → {Completed,
//! Failed}`. Every tick advances each live domain with its adaptive
//! breath rate, applies scheduled kicks, recomputes invariants, feeds the
//! per-domain controllers, and aggregates reach/stability into the
//! append-only history.
//!
//! Failure containment: a domain that produces a non-finite or invalid
//! state is marked failed and excluded from aggregation; its siblings are
//! untouched. Only an invalid configuration aborts a run before it
//! starts. A run whose domains all fail ends `Failed` with the partial
//! history and the last failure's cause.
//!
//! Domain updates within a tick are mutually independent; aggregation
//! only reads values after every domain has finished the tick, so the
//! sequential loop already provides the required barrier. Runs are
//! abortable between ticks (`run_while`), and the history is
//! checkpoint-safe at tick boundaries.

pub mod controller;
pub mod history;
pub mod rng;
pub mod schedule;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub use controller::{BreathController, ControllerTuning};
pub use history::{HistoryRecord, RunHistory};
pub use rng::MirrorRng;
pub use schedule::{Kick, PerturbationSchedule, ScheduledKick};

use crate::config::EngineConfig;
use crate::domains::{BreathParams, DomainId, DomainState};
use crate::error::{MirrorError, MirrorResult};

/// Lifecycle of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Constructed and validated, no tick executed yet.
    Initialized,
    /// At least one tick executed, horizon not reached.
    Running,
    /// Reached the final step with at least one live domain.
    Completed,
    /// Every domain failed before the final step.
    Failed,
}

/// Terminal outcome carried by a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The run reached its final step.
    Completed,
    /// All domains failed; `cause` is the last domain's failure.
    Failed {
        /// Failure cause of the last domain to fail.
        cause: String,
    },
    /// The run was cancelled between ticks.
    Aborted {
        /// First tick that did not execute.
        at_step: usize,
    },
}

/// One domain's failure, recorded when it is marked failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainFailure {
    /// The failed domain.
    pub domain: DomainId,
    /// Tick at which it failed.
    pub step: usize,
    /// Rendered failure cause.
    pub cause: String,
}

/// Everything a finished (or aborted) run hands back to the caller.
///
/// The history is returned in full even when domains failed partway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Append-only history, step-major, domain-minor.
    pub history: RunHistory,
    /// Domain failures, in the order they occurred.
    pub failures: Vec<DomainFailure>,
    /// Ticks fully executed.
    pub steps_completed: usize,
}

impl RunReport {
    /// Whether the run completed its full horizon.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed)
    }
}

struct DomainSlot {
    id: DomainId,
    state: DomainState,
    gain: f64,
    weight: f64,
    baseline: f64,
    alive: bool,
}

/// The engine driving one run.
pub struct MirrorEngine {
    steps: usize,
    horizon: usize,
    schedule: PerturbationSchedule,
    slots: Vec<DomainSlot>,
    controllers: Vec<BreathController>,
    rng: MirrorRng,
    history: RunHistory,
    failures: Vec<DomainFailure>,
    window: VecDeque<bool>,
    window_hits: usize,
    current_step: usize,
    status: RunStatus,
}

impl MirrorEngine {
    /// Validate the configuration and instantiate one state per enabled
    /// domain.
    ///
    /// # Errors
    ///
    /// Returns `Config` if parameters, initial conditions, or the
    /// schedule are invalid. Nothing ticks before validation passes.
    pub fn new(config: EngineConfig) -> MirrorResult<Self> {
        config.validate_semantic()?;

        let weight_sum: f64 = config.domains.iter().map(|d| d.weight).sum();
        let mut slots = Vec::with_capacity(config.domains.len());
        let mut controllers = Vec::with_capacity(config.domains.len());

        for spec in &config.domains {
            let state = spec.init.build()?;
            let baseline = state
                .invariant()
                .map_err(|e| MirrorError::config(format!("step-0 invariant: {e}")))?
                .primary;
            slots.push(DomainSlot {
                id: state.id(),
                state,
                gain: spec.gain,
                weight: spec.weight / weight_sum,
                baseline,
                alive: true,
            });
            controllers.push(BreathController::new(spec.tuning()));
        }

        Ok(Self {
            steps: config.steps,
            horizon: config.horizon,
            schedule: config.schedule,
            slots,
            controllers,
            rng: MirrorRng::new(config.seed),
            history: RunHistory::new(),
            failures: Vec::new(),
            window: VecDeque::new(),
            window_hits: 0,
            current_step: 0,
            status: RunStatus::Initialized,
        })
    }

    /// Current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Index of the next tick to execute.
    #[must_use]
    pub const fn current_step(&self) -> usize {
        self.current_step
    }

    /// The history accumulated so far.
    #[must_use]
    pub const fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Domain failures so far.
    #[must_use]
    pub fn failures(&self) -> &[DomainFailure] {
        &self.failures
    }

    /// Domains still live.
    #[must_use]
    pub fn live_domains(&self) -> Vec<DomainId> {
        self.slots
            .iter()
            .filter(|s| s.alive)
            .map(|s| s.id)
            .collect()
    }

    /// Execute one tick.
    ///
    /// # Errors
    ///
    /// Returns `Config` when called on a finished run. Domain failures
    /// are contained and never surface here.
    pub fn step(&mut self) -> MirrorResult<()> {
        if matches!(self.status, RunStatus::Completed | RunStatus::Failed) {
            return Err(MirrorError::config("run already finished"));
        }
        self.status = RunStatus::Running;

        let t = self.current_step;
        let n = self.slots.len();
        let mut deviations: Vec<Option<f64>> = vec![None; n];
        let mut invariants = vec![0.0; n];
        let mut perturbed = vec![false; n];

        // Update + perturb + invariant, one domain at a time. Slots are
        // mutually independent; the aggregation below never reads a value
        // from an unfinished tick.
        for i in 0..n {
            if !self.slots[i].alive {
                continue;
            }
            let params = BreathParams {
                rate: self.controllers[i].rate(),
                gain: self.slots[i].gain,
            };
            if let Err(e) = self.slots[i].state.breath_update(&params) {
                self.fail_domain(i, t, &e);
                continue;
            }

            let kicks: Vec<Kick> = self
                .schedule
                .kicks_at(t, self.slots[i].id)
                .cloned()
                .collect();
            for kick in kicks {
                match self.slots[i].state.perturb(&kick, &mut self.rng) {
                    Ok(()) => perturbed[i] = true,
                    Err(e) => {
                        self.fail_domain(i, t, &e);
                        break;
                    }
                }
            }
            if !self.slots[i].alive {
                continue;
            }

            match self.slots[i].state.invariant() {
                Ok(inv) if inv.is_finite() => {
                    let baseline = self.slots[i].baseline;
                    invariants[i] = inv.primary;
                    deviations[i] =
                        Some((inv.primary - baseline).abs() / (1.0 + baseline.abs()));
                }
                Ok(_) => {
                    let e = MirrorError::numeric(self.slots[i].id, "invariant");
                    self.fail_domain(i, t, &e);
                }
                Err(e) => self.fail_domain(i, t, &e),
            }
        }

        // Adaptive breath control: negative feedback per live domain.
        for (controller, deviation) in self.controllers.iter_mut().zip(deviations.iter()) {
            if let Some(dev) = deviation {
                controller.observe(*dev);
            }
        }

        let live_weight: f64 = self
            .slots
            .iter()
            .zip(deviations.iter())
            .filter(|(_, d)| d.is_some())
            .map(|(s, _)| s.weight)
            .sum();
        if live_weight <= 0.0 {
            self.status = RunStatus::Failed;
            return Ok(());
        }

        // Stability: 1 − weighted mean relative deviation of live
        // domains, weights renormalized over the live set.
        let weighted_dev: f64 = self
            .slots
            .iter()
            .zip(deviations.iter())
            .filter_map(|(s, d)| d.map(|dev| (s.weight / live_weight) * dev.min(1.0)))
            .sum();
        let stability = (1.0 - weighted_dev).clamp(0.0, 1.0);

        // Reach: fraction of the aggregation window with at least one
        // live domain inside its tolerance band.
        let within = self
            .controllers
            .iter()
            .zip(deviations.iter())
            .any(|(c, d)| d.map_or(false, |dev| c.within_tolerance(dev)));
        self.window.push_back(within);
        if within {
            self.window_hits += 1;
        }
        if self.window.len() > self.horizon && self.window.pop_front() == Some(true) {
            self.window_hits -= 1;
        }
        let reach = self.window_hits as f64 / self.window.len() as f64;

        for i in 0..n {
            if deviations[i].is_some() {
                self.history.append(HistoryRecord {
                    step: t,
                    domain: self.slots[i].id,
                    invariant: invariants[i],
                    perturbed: perturbed[i],
                    reach,
                    stability,
                });
            }
        }

        self.current_step += 1;
        if self.current_step == self.steps {
            self.status = RunStatus::Completed;
        }
        Ok(())
    }

    /// Run ticks while the predicate holds; cancellation is checked at
    /// tick boundaries only, so the history stays consistent.
    ///
    /// # Errors
    ///
    /// Returns `Config` when called on a finished run.
    pub fn run_while<F>(&mut self, mut keep_going: F) -> MirrorResult<()>
    where
        F: FnMut(&Self) -> bool,
    {
        while matches!(self.status, RunStatus::Initialized | RunStatus::Running)
            && keep_going(self)
        {
            self.step()?;
        }
        Ok(())
    }

    /// Run to a terminal state and hand back the report.
    #[must_use]
    pub fn run(mut self) -> RunReport {
        while matches!(self.status, RunStatus::Initialized | RunStatus::Running) {
            if self.step().is_err() {
                break;
            }
        }
        self.into_report()
    }

    /// Convert the engine into its report, whatever the current status.
    #[must_use]
    pub fn into_report(self) -> RunReport {
        let outcome = match self.status {
            RunStatus::Completed => RunOutcome::Completed,
            RunStatus::Failed => RunOutcome::Failed {
                cause: self
                    .failures
                    .last()
                    .map_or_else(|| "all domains failed".to_string(), |f| f.cause.clone()),
            },
            RunStatus::Initialized | RunStatus::Running => RunOutcome::Aborted {
                at_step: self.current_step,
            },
        };
        RunReport {
            outcome,
            history: self.history,
            failures: self.failures,
            steps_completed: self.current_step,
        }
    }

    fn fail_domain(&mut self, index: usize, step: usize, error: &MirrorError) {
        self.slots[index].alive = false;
        self.failures.push(DomainFailure {
            domain: self.slots[index].id,
            step,
            cause: error.to_string(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{DomainInit, DomainSpec, EngineConfig};

    fn oscillator_config(steps: usize) -> EngineConfig {
        EngineConfig::builder()
            .seed(42)
            .steps(steps)
            .domain(DomainSpec::new(DomainInit::Oscillator {
                q: 1.0,
                p: 0.0,
                omega: 1.0,
            }))
            .build()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig::builder().steps(10).build();
        assert!(MirrorEngine::new(config).is_err());
    }

    #[test]
    fn test_unperturbed_run_completes() {
        let engine = MirrorEngine::new(oscillator_config(200)).unwrap();
        let report = engine.run();

        assert!(report.is_completed());
        assert_eq!(report.steps_completed, 200);
        assert_eq!(report.history.len(), 200);
        assert!(report.failures.is_empty());
        assert!(report.history.final_stability().unwrap() > 0.99);
        assert!((report.history.final_reach().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_status_transitions() {
        let mut engine = MirrorEngine::new(oscillator_config(3)).unwrap();
        assert_eq!(engine.status(), RunStatus::Initialized);
        engine.step().unwrap();
        assert_eq!(engine.status(), RunStatus::Running);
        engine.step().unwrap();
        engine.step().unwrap();
        assert_eq!(engine.status(), RunStatus::Completed);
        assert!(engine.step().is_err(), "stepping a finished run is misuse");
    }

    #[test]
    fn test_kick_dips_and_recovers_stability() {
        let schedule = PerturbationSchedule::new(vec![ScheduledKick {
            step: 50,
            domain: DomainId::Oscillator,
            kick: Kick::AmplitudeJolt { dq: 0.0, dp: 3.0 },
        }]);
        let config = EngineConfig::builder()
            .seed(42)
            .steps(120)
            .domain(
                DomainSpec::new(DomainInit::Oscillator {
                    q: 1.0,
                    p: 0.0,
                    omega: 1.0,
                })
                .with_gain(0.2),
            )
            .schedule(schedule)
            .build();

        let report = MirrorEngine::new(config).unwrap().run();
        assert!(report.is_completed());

        let kicked = &report.history.records()[50];
        assert_eq!(kicked.step, 50);
        assert!(kicked.perturbed);
        assert!(kicked.stability < 0.95, "stability at kick: {}", kicked.stability);

        let final_stability = report.history.final_stability().unwrap();
        assert!(final_stability >= 0.95, "final stability: {final_stability}");
    }

    #[test]
    fn test_all_domains_failed_ends_run() {
        let schedule = PerturbationSchedule::new(vec![ScheduledKick {
            step: 5,
            domain: DomainId::Thermodynamic,
            kick: Kick::ProbabilityMass {
                amount: -2.0,
                position: Some(0),
            },
        }]);
        let config = EngineConfig::builder()
            .seed(42)
            .steps(20)
            .domain(DomainSpec::new(DomainInit::Thermodynamic {
                distribution: vec![0.0, 0.0, 1.0, 0.0, 0.0],
                sigma: 1.0,
                shift: 1,
            }))
            .schedule(schedule)
            .build();

        let report = MirrorEngine::new(config).unwrap().run();
        let RunOutcome::Failed { cause } = &report.outcome else {
            panic!("expected a failed run, got {:?}", report.outcome);
        };
        assert!(cause.contains("negative probability mass"), "cause: {cause}");
        // Ticks 0..=4 recorded; the failing tick produced no record.
        assert_eq!(report.history.len(), 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].domain, DomainId::Thermodynamic);
        assert_eq!(report.failures[0].step, 5);
    }

    #[test]
    fn test_partial_failure_is_contained() {
        let schedule = PerturbationSchedule::new(vec![ScheduledKick {
            step: 5,
            domain: DomainId::Thermodynamic,
            kick: Kick::ProbabilityMass {
                amount: -2.0,
                position: Some(0),
            },
        }]);
        let base = |schedule: PerturbationSchedule| {
            EngineConfig::builder()
                .seed(42)
                .steps(12)
                .domain(DomainSpec::new(DomainInit::Oscillator {
                    q: 1.0,
                    p: 0.0,
                    omega: 1.0,
                }))
                .domain(DomainSpec::new(DomainInit::Thermodynamic {
                    distribution: vec![0.0, 0.0, 1.0, 0.0, 0.0],
                    sigma: 1.0,
                    shift: 1,
                }))
                .schedule(schedule)
                .build()
        };

        let with_failure = MirrorEngine::new(base(schedule)).unwrap().run();
        let without_failure = MirrorEngine::new(base(PerturbationSchedule::empty()))
            .unwrap()
            .run();

        // The failed sibling drops out; the run still completes.
        assert!(with_failure.is_completed());
        assert_eq!(with_failure.failures.len(), 1);

        let osc_with: Vec<f64> = with_failure
            .history
            .for_domain(DomainId::Oscillator)
            .map(|r| r.invariant)
            .collect();
        let osc_without: Vec<f64> = without_failure
            .history
            .for_domain(DomainId::Oscillator)
            .map(|r| r.invariant)
            .collect();
        assert_eq!(osc_with.len(), 12);
        assert_eq!(osc_with, osc_without, "sibling records must be untouched");

        let thermo_records = with_failure
            .history
            .for_domain(DomainId::Thermodynamic)
            .count();
        assert_eq!(thermo_records, 5, "failed domain stops emitting records");
    }

    #[test]
    fn test_run_while_aborts_at_tick_boundary() {
        let mut engine = MirrorEngine::new(oscillator_config(100)).unwrap();
        engine.run_while(|e| e.current_step() < 10).unwrap();
        assert_eq!(engine.current_step(), 10);
        assert_eq!(engine.history().len(), 10);

        let report = engine.into_report();
        assert_eq!(report.outcome, RunOutcome::Aborted { at_step: 10 });
        assert_eq!(report.history.len(), 10);
    }

    #[test]
    fn test_aborted_engine_can_resume_via_step() {
        let mut engine = MirrorEngine::new(oscillator_config(20)).unwrap();
        engine.run_while(|e| e.current_step() < 5).unwrap();
        engine.run_while(|_| true).unwrap();
        let report = engine.into_report();
        assert!(report.is_completed());
        assert_eq!(report.history.len(), 20);
    }

    #[test]
    fn test_live_domains_shrink_on_failure() {
        let schedule = PerturbationSchedule::new(vec![ScheduledKick {
            step: 2,
            domain: DomainId::Thermodynamic,
            kick: Kick::ProbabilityMass {
                amount: -2.0,
                position: Some(0),
            },
        }]);
        let config = EngineConfig::builder()
            .seed(1)
            .steps(10)
            .domain(DomainSpec::new(DomainInit::Oscillator {
                q: 1.0,
                p: 0.0,
                omega: 1.0,
            }))
            .domain(DomainSpec::new(DomainInit::Thermodynamic {
                distribution: vec![0.2, 0.2, 0.2, 0.2, 0.2],
                sigma: 1.0,
                shift: 1,
            }))
            .schedule(schedule)
            .build();

        let mut engine = MirrorEngine::new(config).unwrap();
        assert_eq!(engine.live_domains().len(), 2);
        engine.run_while(|e| e.current_step() < 5).unwrap();
        assert_eq!(engine.live_domains(), vec![DomainId::Oscillator]);
    }

    #[test]
    fn test_reach_window_caps_history() {
        let config = EngineConfig::builder()
            .seed(42)
            .steps(50)
            .horizon(10)
            .domain(DomainSpec::new(DomainInit::Oscillator {
                q: 1.0,
                p: 0.0,
                omega: 1.0,
            }))
            .build();
        let report = MirrorEngine::new(config).unwrap().run();
        assert!(report.is_completed());
        // A healthy oscillator stays in tolerance; the windowed fraction
        // saturates at 1.
        assert!((report.history.final_reach().unwrap() - 1.0).abs() < 1e-12);
    }
}
