//! Directed-graph mirror domain.
//!
//! The state is a dense weighted adjacency matrix with no self-loops. The
//! breath update squares the matrix (two-hop connectivity) and renormalizes
//! every row to the out-degree distribution captured at construction, then
//! blends the result with the previous matrix at the adaptive rate. Row
//! sums are preserved by the renormalization and by convexity of the
//! blend, so the degree-variance invariant is preserved by construction
//! and snaps back one step after a kick.

use serde::{Deserialize, Serialize};

use super::{BreathParams, DomainId, Invariant, MirrorSplit};
use crate::engine::rng::MirrorRng;
use crate::engine::schedule::Kick;
use crate::error::{MirrorError, MirrorResult};

/// Dense directed-graph state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    /// Matrix dimension.
    nodes: usize,
    /// Row-major adjacency weights.
    adjacency: Vec<f64>,
    /// Out-degree distribution captured at construction.
    target_degrees: Vec<f64>,
}

impl GraphState {
    /// Create a graph from an adjacency matrix.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the matrix is not square, smaller than 2×2,
    /// contains negative or non-finite weights, or has self-loops.
    pub fn new(adjacency: Vec<Vec<f64>>) -> MirrorResult<Self> {
        let nodes = adjacency.len();
        if nodes < 2 {
            return Err(MirrorError::config("adjacency matrix needs at least 2 nodes"));
        }
        let mut flat = Vec::with_capacity(nodes * nodes);
        for (i, row) in adjacency.iter().enumerate() {
            if row.len() != nodes {
                return Err(MirrorError::config(format!(
                    "adjacency matrix is not square: row {i} has {} entries, expected {nodes}",
                    row.len()
                )));
            }
            for (j, &w) in row.iter().enumerate() {
                if !w.is_finite() || w < 0.0 {
                    return Err(MirrorError::config(format!(
                        "adjacency[{i}][{j}] must be finite and non-negative, got {w}"
                    )));
                }
                if i == j && w != 0.0 {
                    return Err(MirrorError::config(format!(
                        "self-loop at node {i} is not allowed"
                    )));
                }
                flat.push(w);
            }
        }
        let target_degrees = row_sums(&flat, nodes);
        Ok(Self {
            nodes,
            adjacency: flat,
            target_degrees,
        })
    }

    /// Generate a random directed graph with the given edge density.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `nodes < 2` or the density is outside [0, 1].
    pub fn random(nodes: usize, density: f64, rng: &mut MirrorRng) -> MirrorResult<Self> {
        if !(0.0..=1.0).contains(&density) {
            return Err(MirrorError::config(format!(
                "edge density must be in [0, 1], got {density}"
            )));
        }
        if nodes < 2 {
            return Err(MirrorError::config("adjacency matrix needs at least 2 nodes"));
        }
        let matrix: Vec<Vec<f64>> = (0..nodes)
            .map(|i| {
                (0..nodes)
                    .map(|j| {
                        if i != j && rng.gen_f64() < density {
                            1.0
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect();
        Self::new(matrix)
    }

    /// Matrix dimension.
    #[must_use]
    pub const fn nodes(&self) -> usize {
        self.nodes
    }

    /// Row-major adjacency weights.
    #[must_use]
    pub fn adjacency(&self) -> &[f64] {
        &self.adjacency
    }

    /// Current out-degree distribution (row sums).
    #[must_use]
    pub fn out_degrees(&self) -> Vec<f64> {
        row_sums(&self.adjacency, self.nodes)
    }

    /// The out-degree distribution captured at construction.
    #[must_use]
    pub fn target_degrees(&self) -> &[f64] {
        &self.target_degrees
    }

    /// Population variance of the out-degree distribution.
    #[must_use]
    pub fn degree_variance(&self) -> f64 {
        variance(&self.out_degrees())
    }

    /// Split into symmetric and antisymmetric matrix parts.
    #[must_use]
    pub fn split(&self) -> MirrorSplit {
        let n = self.nodes;
        let mut symmetric = vec![0.0; n * n];
        let mut antisymmetric = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let a = self.adjacency[i * n + j];
                let at = self.adjacency[j * n + i];
                symmetric[i * n + j] = 0.5 * (a + at);
                antisymmetric[i * n + j] = 0.5 * (a - at);
            }
        }
        MirrorSplit::MatrixParts {
            symmetric,
            antisymmetric,
            nodes: n,
        }
    }

    /// Two-hop update: square, renormalize rows to the target out-degrees,
    /// blend at the adaptive rate.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the update produces a non-finite
    /// weight.
    pub fn breath_update(&mut self, params: &BreathParams) -> MirrorResult<()> {
        let n = self.nodes;
        let mut squared = matmul(&self.adjacency, &self.adjacency, n);

        // Renormalize each row to its target out-degree; rows that lost all
        // connectivity stay empty rather than dividing by zero.
        for i in 0..n {
            let sum: f64 = squared[i * n..(i + 1) * n].iter().sum();
            if sum > f64::EPSILON {
                let scale = self.target_degrees[i] / sum;
                for w in &mut squared[i * n..(i + 1) * n] {
                    *w *= scale;
                }
            }
        }

        let rate = params.rate.clamp(0.0, 1.0);
        for (current, next) in self.adjacency.iter_mut().zip(squared.iter()) {
            *current = (1.0 - rate) * *current + rate * next;
        }

        self.check_finite("breath_update")
    }

    /// Toggle random directed edges.
    ///
    /// Each draw picks an ordered node pair; diagonal draws are skipped
    /// (consuming the draw). A toggled weight snaps to 0 if it was at
    /// least ½ and to 1 otherwise.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for kick kinds that do not target the graph.
    pub fn perturb(&mut self, kick: &Kick, rng: &mut MirrorRng) -> MirrorResult<()> {
        match kick {
            Kick::EdgeToggle { count } => {
                let n = self.nodes;
                for _ in 0..*count {
                    let i = rng.gen_index(n);
                    let j = rng.gen_index(n);
                    if i == j {
                        continue;
                    }
                    let w = &mut self.adjacency[i * n + j];
                    *w = if *w >= 0.5 { 0.0 } else { 1.0 };
                }
                self.check_finite("perturb")
            }
            other => Err(MirrorError::invalid_state(
                DomainId::Graph,
                format!("kick {other:?} does not target the graph domain"),
            )),
        }
    }

    /// Degree-distribution variance invariant.
    ///
    /// # Errors
    ///
    /// Returns `NumericInstability` if the variance is non-finite.
    pub fn invariant(&self) -> MirrorResult<Invariant> {
        let invariant = Invariant::scalar(self.degree_variance());
        if invariant.is_finite() {
            Ok(invariant)
        } else {
            Err(MirrorError::numeric(DomainId::Graph, "degree variance"))
        }
    }

    fn check_finite(&self, location: &str) -> MirrorResult<()> {
        if self.adjacency.iter().all(|w| w.is_finite()) {
            Ok(())
        } else {
            Err(MirrorError::numeric(DomainId::Graph, location))
        }
    }
}

fn row_sums(matrix: &[f64], n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| matrix[i * n..(i + 1) * n].iter().sum())
        .collect()
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn matmul(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for k in 0..n {
            let aik = a[i * n + k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..n {
                out[i * n + j] += aik * b[k * n + j];
            }
        }
    }
    out
}
