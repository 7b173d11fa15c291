//! Error types for mirrorsim.
//!
//! All fallible operations return `Result<T, MirrorError>` instead of
//! panicking. The variants follow the containment policy: configuration
//! problems are fatal before a run starts, everything detected mid-run is
//! local to the domain that produced it.

use thiserror::Error;

use crate::domains::DomainId;

/// Result type alias for mirrorsim operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Unified error type for all mirrorsim operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Invalid configuration: bad initial state, bad schedule, bad bounds.
    ///
    /// Always detected before or at run start, never mid-run.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// A domain's state left its valid manifold and could not be repaired
    /// by renormalization.
    #[error("invalid state in {domain} domain: {message}")]
    InvalidState {
        /// Domain whose state became invalid.
        domain: DomainId,
        /// What went wrong.
        message: String,
    },

    /// Non-finite value produced by an update.
    #[error("numeric instability in {domain} domain at {location}")]
    NumericInstability {
        /// Domain that produced the non-finite value.
        domain: DomainId,
        /// Location of the non-finite value (e.g., "invariant.primary").
        location: String,
    },

    /// An optimizer trial's engine run reached `Failed`.
    ///
    /// Recorded for the ranking (the trial scores 0); the search continues.
    #[error("optimizer trial {trial} failed: {cause}")]
    TrialFailed {
        /// Index of the failed trial.
        trial: usize,
        /// Terminal cause reported by the engine run.
        cause: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Schema validation error.
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid-state error for a domain.
    #[must_use]
    pub fn invalid_state(domain: DomainId, message: impl Into<String>) -> Self {
        Self::InvalidState {
            domain,
            message: message.into(),
        }
    }

    /// Create a numeric-instability error for a domain.
    #[must_use]
    pub fn numeric(domain: DomainId, location: impl Into<String>) -> Self {
        Self::NumericInstability {
            domain,
            location: location.into(),
        }
    }

    /// Check if this error is contained at a domain boundary.
    ///
    /// Domain-local errors mark one domain `Failed` and never abort
    /// sibling domains or an optimizer's outer search.
    #[must_use]
    pub const fn is_domain_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::NumericInstability { .. }
        )
    }

    /// The domain a local failure belongs to, if any.
    #[must_use]
    pub const fn domain(&self) -> Option<DomainId> {
        match self {
            Self::InvalidState { domain, .. } | Self::NumericInstability { domain, .. } => {
                Some(*domain)
            }
            _ => None,
        }
    }
}
