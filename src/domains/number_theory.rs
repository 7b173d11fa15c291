//! Number-theoretic mirror domain.
//!
//! The state is the running Mertens partial-sum sequence
//! `M(n) = Σ_{m≤n} μ(m)`, extended by one term per breath step. The mirror
//! split separates the cumulative counts of μ = +1 and μ = −1 terms; the
//! invariant is the boundedness of the partial sum relative to its
//! argument, `(M(n) + injected)/n`.
//!
//! A mass-injection kick adds to a separate register that decays by
//! `(1 − gain)` on every subsequent breath step, so a kicked run settles
//! back to the bare Mertens signal.

use serde::{Deserialize, Serialize};

use super::{BreathParams, DomainId, Invariant, MirrorSplit};
use crate::engine::schedule::Kick;
use crate::error::{MirrorError, MirrorResult};

/// Largest accepted seed argument; trial division beyond this is wasted
/// work for a toy domain.
const MAX_START: u64 = 1_000_000;

/// Möbius function μ(n) by trial division.
#[must_use]
pub fn mobius(n: u64) -> i64 {
    if n == 1 {
        return 1;
    }
    let mut m = n;
    let mut factors: u32 = 0;
    let mut i: u64 = 2;
    while i * i <= m {
        if m % i == 0 {
            m /= i;
            if m % i == 0 {
                // Squared prime factor.
                return 0;
            }
            factors += 1;
        }
        i += 1;
    }
    if m > 1 {
        factors += 1;
    }
    if factors % 2 == 1 {
        -1
    } else {
        1
    }
}

/// Mertens partial-sum state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MertensState {
    /// Seed argument n₀.
    start: u64,
    /// Current argument n.
    n: u64,
    /// Running total M(n).
    total: i64,
    /// Partial sums M(start..=n).
    sums: Vec<i64>,
    /// μ signs for arguments (start, n], aligned behind `sums`.
    signs: Vec<i8>,
    /// Counts of μ = +1 / μ = −1 terms over 1..=start.
    positive_at_start: u64,
    /// See `positive_at_start`.
    negative_at_start: u64,
    /// Injected mass; decays under breath updates.
    injected: f64,
}

impl MertensState {
    /// Create the state seeded at argument `start`.
    ///
    /// Computes M(start) by trial division up front.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `start` is zero or implausibly large.
    pub fn new(start: u64) -> MirrorResult<Self> {
        if start == 0 {
            return Err(MirrorError::config("partial-sum seed must be at least 1"));
        }
        if start > MAX_START {
            return Err(MirrorError::config(format!(
                "partial-sum seed {start} exceeds the supported maximum {MAX_START}"
            )));
        }
        let mut total: i64 = 0;
        let mut positive: u64 = 0;
        let mut negative: u64 = 0;
        for m in 1..=start {
            match mobius(m) {
                1 => {
                    total += 1;
                    positive += 1;
                }
                -1 => {
                    total -= 1;
                    negative += 1;
                }
                _ => {}
            }
        }
        Ok(Self {
            start,
            n: start,
            total,
            sums: vec![total],
            signs: Vec::new(),
            positive_at_start: positive,
            negative_at_start: negative,
            injected: 0.0,
        })
    }

    /// Current argument n.
    #[must_use]
    pub const fn argument(&self) -> u64 {
        self.n
    }

    /// Current Mertens value M(n).
    #[must_use]
    pub const fn mertens(&self) -> i64 {
        self.total
    }

    /// The recorded partial sums M(start..=n).
    #[must_use]
    pub fn partial_sums(&self) -> &[i64] {
        &self.sums
    }

    /// Remaining injected mass.
    #[must_use]
    pub const fn injected(&self) -> f64 {
        self.injected
    }

    /// Split into cumulative μ = +1 and μ = −1 counts over the recorded
    /// range; their difference reproduces the partial-sum sequence.
    #[must_use]
    pub fn split(&self) -> MirrorSplit {
        let mut positive = Vec::with_capacity(self.sums.len());
        let mut negative = Vec::with_capacity(self.sums.len());
        let mut pos = self.positive_at_start;
        let mut neg = self.negative_at_start;
        positive.push(pos as f64);
        negative.push(neg as f64);
        for &sign in &self.signs {
            match sign {
                1 => pos += 1,
                -1 => neg += 1,
                _ => {}
            }
            positive.push(pos as f64);
            negative.push(neg as f64);
        }
        MirrorSplit::SignedCounts { positive, negative }
    }

    /// Extend the partial sum by one term; injected mass decays.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the injected register is
    /// non-finite.
    pub fn breath_update(&mut self, params: &BreathParams) -> MirrorResult<()> {
        self.n += 1;
        let mu = mobius(self.n);
        self.total += mu;
        self.sums.push(self.total);
        self.signs.push(mu as i8);

        let decay = (1.0 - params.gain).clamp(0.0, 1.0);
        self.injected *= decay;

        if self.injected.is_finite() {
            Ok(())
        } else {
            Err(MirrorError::numeric(
                DomainId::NumberTheoretic,
                "injected mass",
            ))
        }
    }

    /// Inject mass into the partial sum.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for kick kinds that do not target this
    /// domain, `NumericInstability` for a non-finite injection.
    pub fn perturb(&mut self, kick: &Kick) -> MirrorResult<()> {
        match kick {
            Kick::MassInjection { amount } => {
                self.injected += amount;
                if self.injected.is_finite() {
                    Ok(())
                } else {
                    Err(MirrorError::numeric(
                        DomainId::NumberTheoretic,
                        "injected mass",
                    ))
                }
            }
            other => Err(MirrorError::invalid_state(
                DomainId::NumberTheoretic,
                format!("kick {other:?} does not target the number-theoretic domain"),
            )),
        }
    }

    /// Boundedness invariant `(M(n) + injected)/n`.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the value is non-finite.
    pub fn invariant(&self) -> MirrorResult<Invariant> {
        let invariant = Invariant::scalar((self.total as f64 + self.injected) / self.n as f64);
        if invariant.is_finite() {
            Ok(invariant)
        } else {
            Err(MirrorError::numeric(DomainId::NumberTheoretic, "invariant"))
        }
    }
}
