//! # vp-engine
//!
//! Evaluates sealed verifiable policies: observations in, disclosed claims
//! out.
//!
//! - [`resolver`] reduces each input's observations over its time window to
//!   one scalar feature.
//! - [`evaluator`] derives typed claims from features (`PASS_FAIL`, `SCORE`,
//!   `BAND`, `CONST`).
//! - [`disclosure`] keeps only what the policy allows a verifier to see.
//! - [`validity`] stamps `issuedAt`, `expiresAt`, and replay metadata.
//!
//! [`PolicyEngine`] runs the whole pipeline. It is synchronous, reads no
//! clock, and does no I/O: observations are handed in (or fetched through an
//! [`ObservationSource`] the caller provides) and the evaluation instant is
//! an argument, so every run is replayable.
//!
//! ## Quick Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use vp_engine::{ObservationSet, PolicyEngine};
//! use vp_policy::PolicySpec;
//!
//! let spec = PolicySpec::from_json_str(r#"{
//!     "id": "uptime", "version": "1.0.0",
//!     "metadata": {"title": "Uptime SLA", "namespace": "org.example.ops"},
//!     "subject": {"type": "device"},
//!     "inputs": [{
//!         "id": "up", "source": {"kind": "manual", "ref": "probe"}, "signal": "up",
//!         "valueType": "boolean",
//!         "window": {"mode": "relative", "lookback": "1h"},
//!         "aggregation": {"op": "latest"}
//!     }],
//!     "outputs": [{"name": "online", "type": "boolean", "derive": {"kind": "PASS_FAIL", "input": "up"}}],
//!     "validity": {"ttl": "15m"},
//!     "disclosure": {"exposeClaims": ["online"]}
//! }"#).unwrap();
//!
//! let engine = PolicyEngine::default();
//! let sealed = engine.prepare(spec).unwrap();
//! let observations = ObservationSet::from_json_str(
//!     r#"{"up": [{"timestamp": "2024-03-01T11:30:00Z", "value": true}]}"#,
//! ).unwrap();
//! let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
//!
//! let evaluation = engine.evaluate(&sealed, &observations, now).unwrap();
//! assert!(evaluation.is_complete());
//! assert_eq!(evaluation.claim_set.claims.len(), 1);
//! ```

pub mod config;
pub mod disclosure;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod observation;
pub mod resolver;
pub mod source;
pub mod validity;

pub use config::{EngineConfig, EvaluationConfig, LimitsConfig};
pub use disclosure::{filter, DisclosedClaim, DisclosedClaimSet, Disclosure, InputEcho, RuleResult};
pub use engine::{Evaluation, Failure, FailureSubject, PolicyEngine};
pub use error::{EngineError, EvalError};
pub use evaluator::{derive, Claim, Results};
pub use observation::{Observation, ObservationSet, Scalar};
pub use resolver::{resolve, Feature, ResolvedWindow};
pub use source::{MemorySource, ObservationSource, SourceError};
pub use validity::ValidityStamp;
