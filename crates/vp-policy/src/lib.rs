//! # vp-policy
//!
//! The verifiable policy data model: what a policy declares, how it is
//! checked before use, and how it is bound to its hash.
//!
//! A [`PolicySpec`] is the private document (inputs included). Sealing it
//! computes the policy hash over the RFC 8785 canonical form and runs static
//! validation, producing a [`SealedPolicy`] the engine can evaluate. The
//! [`PublicPolicySpec`] is the projection a verifier sees.
//!
//! ## Quick Example
//!
//! ```rust
//! use vp_policy::{PolicySpec, PublicPolicySpec, SealedPolicy};
//!
//! let spec = PolicySpec::from_json_str(r#"{
//!     "id": "kyc-level",
//!     "version": "1.0.0",
//!     "metadata": {"title": "KYC level", "namespace": "org.example.kyc"},
//!     "subject": {"type": "user"},
//!     "inputs": [],
//!     "outputs": [{"name": "level", "type": "enum", "derive": {"kind": "CONST", "value": "basic"}}],
//!     "validity": {"ttl": "30d"},
//!     "disclosure": {"exposeClaims": ["level"]}
//! }"#).unwrap();
//!
//! let sealed = SealedPolicy::seal(spec.clone()).unwrap();
//! let public = PublicPolicySpec::from_private(&spec, None).unwrap();
//! assert_eq!(public.policy_hash(), sealed.policy_hash());
//! ```

pub mod error;
pub mod graph;
pub mod input;
pub mod integrity;
pub mod output;
pub mod spec;
pub mod time;
pub mod validate;

pub use error::PolicyError;
pub use graph::{NodeRef, PolicyGraph};
pub use input::{
    AggregationSpec, DataSourceRef, InputSpec, SourceKind, TimeWindowSpec, Unit, ValueType,
};
pub use integrity::{
    canonical_policy_bytes, hash_policy, verify_public, Canonicalization, CodeRef, Integrity,
    PublicPolicySpec, SealedPolicy,
};
pub use output::{
    Band, BandFrom, BandRule, ClaimType, ConstValue, DeriveRule, OutputClaimSpec, RuleKind,
};
pub use spec::{
    DisclosureSpec, PolicyMetadata, PolicySpec, Reference, SemVer, SubjectSpec, ValiditySpec,
};
pub use time::{Duration, Timestamp};
pub use validate::validate;
pub use vp_canon::PolicyHash;
