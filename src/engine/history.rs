//! Append-only run history.
//!
//! One record per live domain per tick, ordered step-major, domain-minor.
//! Only the engine writes; everything else gets read-only views. Two
//! export shapes are provided: the flat row-per-record sequence and a
//! nested-by-domain grouping, both plain serializable structures.

use serde::{Deserialize, Serialize};

use crate::domains::DomainId;

/// One history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Tick index.
    pub step: usize,
    /// Domain the record belongs to.
    pub domain: DomainId,
    /// The domain's invariant (primary component) at this tick.
    pub invariant: f64,
    /// Whether a scheduled kick was applied at this tick.
    pub perturbed: bool,
    /// Run-level reach after this tick.
    pub reach: f64,
    /// Run-level stability after this tick.
    pub stability: f64,
}

/// Append-only sequence of history records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHistory {
    records: Vec<HistoryRecord>,
}

impl RunHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record. Engine-internal: records arrive already ordered.
    pub(crate) fn append(&mut self, record: HistoryRecord) {
        self.records.push(record);
    }

    /// All records, step-major, domain-minor.
    #[must_use]
    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one domain, in step order.
    pub fn for_domain(&self, domain: DomainId) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter().filter(move |r| r.domain == domain)
    }

    /// Run-level stability at a given step, if recorded.
    #[must_use]
    pub fn stability_at(&self, step: usize) -> Option<f64> {
        self.records
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.stability)
    }

    /// Stability of the last recorded tick.
    #[must_use]
    pub fn final_stability(&self) -> Option<f64> {
        self.records.last().map(|r| r.stability)
    }

    /// Reach of the last recorded tick.
    #[must_use]
    pub fn final_reach(&self) -> Option<f64> {
        self.records.last().map(|r| r.reach)
    }

    /// Nested-by-domain export view.
    #[must_use]
    pub fn by_domain(&self) -> Vec<DomainSeries> {
        let mut series: Vec<DomainSeries> = Vec::new();
        for record in &self.records {
            let entry = DomainPoint {
                step: record.step,
                invariant: record.invariant,
                perturbed: record.perturbed,
            };
            match series.iter_mut().find(|s| s.domain == record.domain) {
                Some(s) => s.points.push(entry),
                None => series.push(DomainSeries {
                    domain: record.domain,
                    points: vec![entry],
                }),
            }
        }
        series
    }
}

/// One domain's time series in the nested export view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSeries {
    /// The domain.
    pub domain: DomainId,
    /// Per-tick points, in step order.
    pub points: Vec<DomainPoint>,
}

/// One point of a domain's time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPoint {
    /// Tick index.
    pub step: usize,
    /// Invariant value.
    pub invariant: f64,
    /// Whether a kick was applied.
    pub perturbed: bool,
}
