// error.rs — Error types for canonicalization and hashing.
//
// Uses `thiserror` to derive the standard Rust `Error` trait automatically.
// Every variant here is fatal to a policy evaluation: a document that cannot
// be canonicalized cannot be hash-bound.

use thiserror::Error;

/// Errors that can occur while producing canonical bytes or policy hashes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CanonError {
    /// A number in the value tree is NaN or infinite. RFC 8785 has no
    /// encoding for these, so they are rejected rather than coerced.
    #[error("non-finite number at {path}: {value}")]
    NonFiniteNumber { path: String, value: f64 },

    /// A value could not be turned into a JSON tree at all (e.g. a map with
    /// non-string keys).
    #[error("value is not representable as JSON: {0}")]
    Unrepresentable(String),

    /// A policy hash string does not have the `sha256:<64 lowercase hex>` shape.
    #[error("malformed policy hash '{value}': {reason}")]
    MalformedHash { value: String, reason: String },
}
