//! # mirrorsim
//!
//! Mirror-domain simulation engine with adaptive breath control.
//!
//! Five mathematically distinct domain simulators (harmonic oscillator,
//! qubit, number-theoretic, directed-graph, discrete-thermodynamic) run
//! under one contract: split a state into two complementary parts,
//! advance it with an invariant-preserving breath update, optionally
//! inject a kick, report a conserved quantity. The engine drives the
//! per-domain tick loop, aggregates invariant deviations into reach and
//! stability scores, and records an append-only history. A capability
//! optimizer searches the engine's tunable parameters by seeded
//! randomized trials.
//!
//! ## Example
//!
//! ```rust
//! use mirrorsim::prelude::*;
//!
//! let config = EngineConfig::builder()
//!     .seed(42)
//!     .steps(100)
//!     .domain(DomainSpec::new(DomainInit::Oscillator {
//!         q: 1.0,
//!         p: 0.0,
//!         omega: 1.0,
//!     }))
//!     .build();
//!
//! let report = MirrorEngine::new(config)?.run();
//! assert!(report.is_completed());
//! assert_eq!(report.history.len(), 100);
//! # Ok::<(), mirrorsim::MirrorError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,  // Numerical code choices are intentional
    clippy::imprecise_flops,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,  // Many functions can't be const in stable Rust
    clippy::needless_range_loop,   // Sometimes range loops are clearer
)]

pub mod config;
pub mod domains;
pub mod engine;
pub mod error;
pub mod optimizer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{DomainInit, DomainSpec, EngineConfig, EngineConfigBuilder};
    pub use crate::domains::{DomainId, DomainState, Invariant, MirrorSplit};
    pub use crate::engine::rng::MirrorRng;
    pub use crate::engine::schedule::{Kick, PerturbationSchedule, ScheduledKick};
    pub use crate::engine::{MirrorEngine, RunOutcome, RunReport, RunStatus};
    pub use crate::error::{MirrorError, MirrorResult};
    pub use crate::optimizer::{Bound, CapabilityOptimizer, OptimizerConfig, SearchSpace};
}

/// Re-export for public API
pub use error::{MirrorError, MirrorResult};
