// engine.rs — Policy evaluation engine.
//
// Every evaluation runs the same pipeline:
//
// 1. Seal: hash the policy and validate it (fatal on failure)
// 2. Resolve every input some output reads
// 3. Derive outputs in dependency order
// 4. Filter through the disclosure boundary
// 5. Stamp validity bounds
//
// Per-input and per-output failures do not abort siblings. They are
// collected next to the claim set, so partial success is always visible.
// The evaluation instant is a parameter; nothing here reads the clock.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};
use vp_policy::{InputSpec, PolicyError, PolicySpec, SealedPolicy};

use crate::config::EngineConfig;
use crate::disclosure::{filter, DisclosedClaimSet};
use crate::error::{EngineError, EvalError};
use crate::evaluator::{derive, Results};
use crate::observation::{Observation, ObservationSet};
use crate::resolver::{resolve, ResolvedWindow};
use crate::source::ObservationSource;
use crate::validity::ValidityStamp;

/// What failed: an input (by id) or an output (by name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureSubject {
    Input(String),
    Output(String),
}

impl fmt::Display for FailureSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureSubject::Input(id) => write!(f, "input '{}'", id),
            FailureSubject::Output(name) => write!(f, "output '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub subject: FailureSubject,
    #[serde(serialize_with = "serialize_display")]
    pub error: EvalError,
}

fn serialize_display<S: Serializer>(error: &EvalError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Result of one evaluation: the disclosed claim set plus every failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub claim_set: DisclosedClaimSet,
    pub failures: Vec<Failure>,
}

impl Evaluation {
    /// True when every input and output succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn output_failure(&self, name: &str) -> Option<&EvalError> {
        self.failures.iter().find_map(|f| match &f.subject {
            FailureSubject::Output(n) if n == name => Some(&f.error),
            _ => None,
        })
    }

    pub fn input_failure(&self, id: &str) -> Option<&EvalError> {
        self.failures.iter().find_map(|f| match &f.subject {
            FailureSubject::Input(i) if i == id => Some(&f.error),
            _ => None,
        })
    }
}

/// The policy engine: seals policies and evaluates them against observations.
///
/// Holds only configuration. Every evaluation is independent, so one engine
/// can be shared across threads and policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: EngineConfig,
}

impl PolicyEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check engine limits, then hash and validate the policy.
    pub fn prepare(&self, spec: PolicySpec) -> Result<SealedPolicy, EngineError> {
        self.check_limits(&spec)?;
        let sealed = SealedPolicy::seal(spec)?;
        info!(
            policy_id = %sealed.spec().id,
            policy_hash = %sealed.policy_hash(),
            "policy prepared"
        );
        Ok(sealed)
    }

    /// Evaluate against materialized observations at instant `at`.
    pub fn evaluate(
        &self,
        policy: &SealedPolicy,
        observations: &ObservationSet,
        at: DateTime<Utc>,
    ) -> Result<Evaluation, EngineError> {
        self.run(policy, at, |input, _| {
            Ok(Cow::Borrowed(observations.get(&input.id)))
        })
    }

    /// Evaluate, fetching each input's observations through `source`.
    ///
    /// A fetch failure fails only that input (and what reads it).
    pub fn evaluate_with_source(
        &self,
        policy: &SealedPolicy,
        source: &dyn ObservationSource,
        at: DateTime<Utc>,
    ) -> Result<Evaluation, EngineError> {
        self.run(policy, at, |input, window| {
            source
                .fetch(&input.source, &input.signal, window)
                .map(Cow::Owned)
                .map_err(|e| EvalError::SourceFailed {
                    input: input.id.clone(),
                    message: e.to_string(),
                })
        })
    }

    fn check_limits(&self, spec: &PolicySpec) -> Result<(), PolicyError> {
        let limits = &self.config.limits;
        let mut issues = Vec::new();
        if spec.inputs.len() > limits.max_inputs {
            issues.push(format!(
                "{} inputs exceed the engine limit of {}",
                spec.inputs.len(),
                limits.max_inputs
            ));
        }
        if spec.outputs.len() > limits.max_outputs {
            issues.push(format!(
                "{} outputs exceed the engine limit of {}",
                spec.outputs.len(),
                limits.max_outputs
            ));
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::InvalidPolicy { issues })
        }
    }

    fn run<'a, F>(
        &self,
        policy: &SealedPolicy,
        at: DateTime<Utc>,
        mut observe: F,
    ) -> Result<Evaluation, EngineError>
    where
        F: FnMut(&InputSpec, &ResolvedWindow) -> Result<Cow<'a, [Observation]>, EvalError>,
    {
        // A sealed policy may come from elsewhere; limits still apply.
        self.check_limits(policy.spec())?;

        let spec = policy.spec();
        let graph = policy.graph();
        let mut results = Results::new(spec.inputs.len(), spec.outputs.len());
        let mut failures = Vec::new();

        for idx in graph.referenced_inputs() {
            let input = &spec.inputs[idx];
            let window = ResolvedWindow::resolve(&input.window, at);
            let feature = observe(input, &window).and_then(|observations| {
                resolve(
                    input,
                    &observations,
                    at,
                    self.config.limits.max_observations_per_input,
                )
            });
            if let Err(err) = &feature {
                warn!(input = %input.id, error = %err, "input failed");
                failures.push(Failure {
                    subject: FailureSubject::Input(input.id.clone()),
                    error: err.clone(),
                });
            }
            results.features[idx] = Some(feature);
        }

        let mut aborted = false;
        for &idx in graph.evaluation_order() {
            let output = &spec.outputs[idx];
            let claim = if aborted {
                Err(EvalError::Aborted {
                    output: output.name.clone(),
                })
            } else {
                derive(spec, graph, idx, &results)
            };
            match &claim {
                Ok(c) => debug!(output = %output.name, rule = %c.rule, "output derived"),
                Err(err) => {
                    warn!(output = %output.name, error = %err, "output failed");
                    failures.push(Failure {
                        subject: FailureSubject::Output(output.name.clone()),
                        error: err.clone(),
                    });
                    aborted |= self.config.evaluation.fail_fast;
                }
            }
            results.claims[idx] = Some(claim);
        }

        let disclosure = filter(spec, &results);
        let validity = ValidityStamp::stamp(&spec.validity, at);
        let claim_set = DisclosedClaimSet::new(policy.policy_hash().clone(), disclosure, validity);

        info!(
            policy_id = %spec.id,
            policy_hash = %claim_set.policy_hash,
            claims = claim_set.claims.len(),
            failures = failures.len(),
            "evaluation complete"
        );

        Ok(Evaluation {
            claim_set,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EvaluationConfig, LimitsConfig};
    use crate::observation::Scalar;
    use crate::source::{MemorySource, SourceError};
    use serde_json::json;
    use vp_policy::DataSourceRef;

    fn policy() -> PolicySpec {
        serde_json::from_value(json!({
            "id": "credit-tier",
            "version": "1.0.0",
            "metadata": {"title": "Credit tier", "namespace": "org.example.lending"},
            "subject": {"type": "user"},
            "inputs": [
                {
                    "id": "score_in",
                    "source": {"kind": "http", "ref": "https://bureau.example/score"},
                    "signal": "credit_score",
                    "valueType": "number",
                    "window": {"mode": "relative", "lookback": "30d"},
                    "aggregation": {"op": "latest"}
                },
                {
                    "id": "kyc",
                    "source": {"kind": "manual", "ref": "kyc-desk"},
                    "signal": "verified",
                    "valueType": "boolean",
                    "window": {"mode": "relative", "lookback": "365d"},
                    "aggregation": {"op": "latest"}
                },
                {
                    "id": "unused",
                    "source": {"kind": "manual", "ref": "nowhere"},
                    "signal": "nothing",
                    "valueType": "number",
                    "window": {"mode": "relative", "lookback": "1d"},
                    "aggregation": {"op": "avg"}
                }
            ],
            "outputs": [
                {"name": "kyc_passed", "type": "boolean", "derive": {"kind": "PASS_FAIL", "input": "kyc"}},
                {"name": "score", "type": "number", "derive": {"kind": "SCORE", "input": "score_in"}},
                {"name": "tier", "type": "enum", "derive": {
                    "kind": "BAND", "from": "SCORE", "score": "score",
                    "bands": [
                        {"label": "A", "minInclusive": 80, "maxExclusive": 101},
                        {"label": "B", "minInclusive": 60, "maxExclusive": 80}
                    ]
                }}
            ],
            "validity": {"ttl": "1d", "reusable": true},
            "disclosure": {"exposeClaims": ["tier", "kyc_passed"]}
        }))
        .unwrap()
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn observations() -> ObservationSet {
        ObservationSet::from_json_str(
            r#"{
                "score_in": [
                    {"timestamp": "2024-03-01T00:00:00Z", "value": 72},
                    {"timestamp": "2024-03-02T00:00:00Z", "value": 81}
                ],
                "kyc": [{"timestamp": "2024-03-05T00:00:00Z", "value": true}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn full_pipeline_produces_disclosed_claims() {
        let engine = PolicyEngine::default();
        let sealed = engine.prepare(policy()).unwrap();
        let eval = engine.evaluate(&sealed, &observations(), at()).unwrap();

        assert!(eval.is_complete(), "failures: {:?}", eval.failures);
        let names: Vec<&str> = eval.claim_set.claims.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["kyc_passed", "tier"]);
        assert_eq!(
            eval.claim_set.claim("tier").unwrap().value,
            Scalar::String("A".to_string())
        );
        assert!(eval.claim_set.claim("score").is_none());
        assert_eq!(&eval.claim_set.policy_hash, sealed.policy_hash());
        assert!(eval.claim_set.validity.reusable);
    }

    #[test]
    fn partial_success_is_reported() {
        let engine = PolicyEngine::default();
        let sealed = engine.prepare(policy()).unwrap();
        let observations = ObservationSet::new().with(
            "kyc",
            vec![Observation::new(
                vp_policy::Timestamp::parse("2024-03-05T00:00:00Z").unwrap(),
                Scalar::Bool(true),
            )],
        );
        let eval = engine.evaluate(&sealed, &observations, at()).unwrap();

        assert!(!eval.is_complete());
        assert!(matches!(
            eval.input_failure("score_in"),
            Some(EvalError::InsufficientData { .. })
        ));
        assert!(matches!(
            eval.output_failure("tier"),
            Some(EvalError::DependencyFailed { .. })
        ));
        // Unreferenced inputs are not resolved, so they cannot fail.
        assert!(eval.input_failure("unused").is_none());
        let names: Vec<&str> = eval.claim_set.claims.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["kyc_passed"]);
    }

    #[test]
    fn fail_fast_aborts_remaining_outputs() {
        let engine = PolicyEngine::new(EngineConfig {
            limits: LimitsConfig::default(),
            evaluation: EvaluationConfig { fail_fast: true },
        });
        let sealed = engine.prepare(policy()).unwrap();
        let eval = engine.evaluate(&sealed, &ObservationSet::new(), at()).unwrap();
        // kyc_passed is first in evaluation order and fails; the rest abort.
        assert!(matches!(
            eval.output_failure("kyc_passed"),
            Some(EvalError::DependencyFailed { .. })
        ));
        assert!(matches!(
            eval.output_failure("score"),
            Some(EvalError::Aborted { .. })
        ));
        assert!(matches!(
            eval.output_failure("tier"),
            Some(EvalError::Aborted { .. })
        ));
        assert!(eval.claim_set.claims.is_empty());
    }

    #[test]
    fn limits_reject_oversized_policies() {
        let engine = PolicyEngine::new(EngineConfig {
            limits: LimitsConfig {
                max_inputs: 2,
                ..LimitsConfig::default()
            },
            evaluation: EvaluationConfig::default(),
        });
        assert!(matches!(
            engine.prepare(policy()),
            Err(EngineError::Policy(PolicyError::InvalidPolicy { .. }))
        ));
    }

    struct FailingSource;

    impl ObservationSource for FailingSource {
        fn fetch(
            &self,
            source: &DataSourceRef,
            _signal: &str,
            _window: &ResolvedWindow,
        ) -> Result<Vec<Observation>, SourceError> {
            Err(SourceError::Timeout(source.reference.clone()))
        }
    }

    #[test]
    fn source_failures_become_per_input_errors() {
        let engine = PolicyEngine::default();
        let sealed = engine.prepare(policy()).unwrap();
        let eval = engine.evaluate_with_source(&sealed, &FailingSource, at()).unwrap();
        assert!(matches!(
            eval.input_failure("score_in"),
            Some(EvalError::SourceFailed { .. })
        ));
        assert!(eval.claim_set.claims.is_empty());

        let mut memory = MemorySource::new();
        memory.insert("https://bureau.example/score", "credit_score", observations().get("score_in").to_vec());
        memory.insert("kyc-desk", "verified", observations().get("kyc").to_vec());
        let eval = engine.evaluate_with_source(&sealed, &memory, at()).unwrap();
        assert!(eval.is_complete());
    }

    #[test]
    fn evaluation_is_reproducible() {
        let engine = PolicyEngine::default();
        let sealed = engine.prepare(policy()).unwrap();
        let a = engine.evaluate(&sealed, &observations(), at()).unwrap();
        let b = engine.evaluate(&sealed, &observations(), at()).unwrap();
        assert_eq!(
            a.claim_set.canonical_bytes().unwrap(),
            b.claim_set.canonical_bytes().unwrap()
        );
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["claimSet"]["issuedAt"], "2024-03-10T00:00:00.000Z");
        assert_eq!(json["failures"], json!([]));
    }
}
