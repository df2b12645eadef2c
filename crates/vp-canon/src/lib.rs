//! # vp-canon
//!
//! Canonical bytes and hashes for verifiable policies.
//!
//! A policy is bound to its proofs by a `policyHash`: the SHA-256 digest of
//! the policy's RFC 8785 canonical JSON form. Any two implementations that
//! canonicalize the same document must produce the same bytes, or every
//! proof issued against the policy stops verifying.
//!
//! ## Quick Example
//!
//! ```rust
//! use vp_canon::{canonicalize, hash};
//!
//! let doc: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
//! let bytes = canonicalize(&doc).unwrap();
//! assert_eq!(bytes, br#"{"a":1,"b":2}"#);
//! assert!(hash(&bytes).to_string().starts_with("sha256:"));
//! ```

pub mod canonical;
pub mod error;
pub mod hasher;

pub use canonical::{
    canonicalize, ensure_finite, format_number, to_canonical_bytes, MAX_SAFE_INTEGER,
};
pub use error::CanonError;
pub use hasher::{hash, hash_bytes, PolicyHash, SHA256_PREFIX};
