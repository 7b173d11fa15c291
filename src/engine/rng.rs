//! Deterministic random number generation.
//!
//! PCG (Permuted Congruential Generator) with partitioned seed streams.
//! Given the same master seed, all sequences are bitwise-identical across
//! runs, platforms, and thread counts: every optimizer trial and every
//! randomized kick draws from a stream derived from the master seed, so
//! execution order never changes results.

use rand::prelude::*;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

/// Deterministic, reproducible random number generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorRng {
    /// Master seed for reproducibility.
    master_seed: u64,
    /// Current stream index for partitioning.
    stream: u64,
    /// Internal PCG state.
    rng: Pcg64,
}

impl MirrorRng {
    /// Create a new RNG with the given master seed.
    #[must_use]
    pub fn new(master_seed: u64) -> Self {
        let rng = Pcg64::seed_from_u64(master_seed);
        Self {
            master_seed,
            stream: 0,
            rng,
        }
    }

    /// Get the master seed.
    #[must_use]
    pub const fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Create an independent stream for the given index.
    ///
    /// Streams are derived only from the master seed and the index, so a
    /// trial's stream is the same no matter which thread runs it or in
    /// what order trials are scheduled.
    #[must_use]
    pub fn stream(master_seed: u64, index: u64) -> Self {
        let seed = master_seed.wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        Self {
            master_seed,
            stream: index,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Create partitioned RNGs for parallel execution.
    ///
    /// Each partition gets an independent stream derived from the master
    /// seed, ensuring reproducibility regardless of execution order.
    #[must_use]
    pub fn partition(&mut self, n: usize) -> Vec<Self> {
        let partitions: Vec<Self> = (0..n as u64)
            .map(|i| Self::stream(self.master_seed, self.stream + i))
            .collect();
        self.stream += n as u64;
        partitions
    }

    /// Generate a random f64 in [0, 1).
    pub fn gen_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// Generate a random f64 in the given range.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn gen_range_f64(&mut self, min: f64, max: f64) -> f64 {
        assert!(min <= max, "Invalid range: min > max");
        min + (max - min) * self.gen_f64()
    }

    /// Generate a log-uniform f64 in the given positive range.
    ///
    /// # Panics
    ///
    /// Panics if the bounds are not positive or `min > max`.
    pub fn gen_log_range_f64(&mut self, min: f64, max: f64) -> f64 {
        assert!(min > 0.0 && max > 0.0, "log-uniform bounds must be positive");
        assert!(min <= max, "Invalid range: min > max");
        (self.gen_range_f64(min.ln(), max.ln())).exp()
    }

    /// Generate a random index in [0, n).
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn gen_index(&mut self, n: usize) -> usize {
        assert!(n > 0, "gen_index requires n > 0");
        self.rng.gen_range(0..n)
    }

    /// Generate a random u64.
    pub fn gen_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Generate a standard normal sample using Box-Muller transform.
    pub fn gen_standard_normal(&mut self) -> f64 {
        let u1 = self.gen_f64();
        let u2 = self.gen_f64();

        // Avoid log(0)
        let u1 = if u1 < f64::EPSILON { f64::EPSILON } else { u1 };

        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}
