// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;
use vp_canon::CanonError;

/// Errors that can occur while loading, validating, or hashing a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy is statically malformed: duplicate ids, dangling or cyclic
    /// references, bad band coverage, incompatible types. Every problem
    /// found is listed, not just the first.
    #[error("invalid policy: {}", .issues.join("; "))]
    InvalidPolicy { issues: Vec<String> },

    /// The document could not be parsed into a policy at all.
    #[error("failed to parse policy document ({format}): {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// Failed to read a policy file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy cannot be canonicalized (e.g. a NaN band bound), so it
    /// cannot be hash-bound and cannot be evaluated.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonError),

    /// A public spec does not match the private policy it claims to describe.
    #[error("integrity mismatch in {field}: {reason}")]
    IntegrityMismatch { field: String, reason: String },
}
