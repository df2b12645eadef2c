// error.rs — Error types for evaluation.
//
// Messages name inputs, outputs, units, and counts. They never carry
// observation or feature values: failures are logged and may be handed to
// callers that sit outside the disclosure boundary.

use std::path::PathBuf;

use thiserror::Error;
use vp_policy::PolicyError;

/// Why one input or one output could not be produced.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// A point window found nothing at or before its instant.
    #[error("input '{input}': no observation at or before {at}")]
    NoObservation { input: String, at: String },

    /// The window selected nothing (or too little) to aggregate.
    #[error("input '{input}': insufficient data: {reason}")]
    InsufficientData { input: String, reason: String },

    /// More observations than `limits.max_observations_per_input`.
    #[error("input '{input}': {count} observations exceed the limit of {limit}")]
    TooManyObservations {
        input: String,
        count: usize,
        limit: usize,
    },

    /// Declared type or unit disagrees with what was observed or derived.
    #[error("{subject}: type mismatch: {reason}")]
    TypeMismatch { subject: String, reason: String },

    /// A score fell outside every band of a BAND rule.
    #[error("output '{output}': score falls outside every band")]
    UnbandedScore { output: String },

    /// An observation or intermediate result was NaN or infinite.
    #[error("{subject}: non-finite number")]
    NonFiniteNumber { subject: String },

    /// The data-access collaborator failed to deliver observations.
    #[error("input '{input}': source failed: {message}")]
    SourceFailed { input: String, message: String },

    /// An output could not be derived because something it reads failed.
    #[error("output '{output}': depends on '{dependency}', which failed: {source}")]
    DependencyFailed {
        output: String,
        dependency: String,
        source: Box<EvalError>,
    },

    /// Not derived because an earlier output failed and `fail_fast` is on.
    #[error("output '{output}': not evaluated after an earlier failure")]
    Aborted { output: String },
}

impl EvalError {
    /// The innermost error, following `DependencyFailed` chains.
    pub fn root_cause(&self) -> &EvalError {
        match self {
            EvalError::DependencyFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors that stop an evaluation (or the engine setup) as a whole.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The policy is invalid, exceeds engine limits, or cannot be hashed.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The engine configuration file exists but could not be used.
    #[error("invalid engine config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Failed to read an observation or config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An observation document could not be parsed.
    #[error("failed to parse observations: {0}")]
    Observations(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_chain_reports_root_cause() {
        let root = EvalError::NoObservation {
            input: "score_in".to_string(),
            at: "2024-01-01T00:00:00Z".to_string(),
        };
        let wrapped = EvalError::DependencyFailed {
            output: "tier".to_string(),
            dependency: "score".to_string(),
            source: Box::new(root.clone()),
        };
        assert_eq!(wrapped.root_cause(), &root);
        assert!(wrapped.to_string().contains("depends on 'score'"));
    }

    #[test]
    fn unbanded_score_does_not_print_the_score() {
        let err = EvalError::UnbandedScore {
            output: "tier".to_string(),
        };
        assert_eq!(err.to_string(), "output 'tier': score falls outside every band");
    }
}
