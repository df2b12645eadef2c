// end_to_end.rs — Policy on disk → sealed → evaluated → disclosed.
//
// Walks the full flow a prover would run:
//
//   1. Load a YAML policy and its JSON twin from disk, check they hash alike
//   2. Project the public spec and verify it against the private one
//   3. Evaluate against an observation file
//   4. Inspect the disclosed claim set
//
// VERIFY:
//   - latest of [72, 81] is 81, which lands in band "A"
//   - p50 over [10, 20, 30, 40] is 20
//   - the SCORE behind the BAND is never disclosed unless allowed
//   - a BAND over a SCORE that reads a missing input is rejected up front
//   - identical inputs give byte-identical claim sets

use std::fs;

use chrono::{DateTime, Utc};
use serde_json::json;
use tempfile::tempdir;

use vp_engine::{EngineConfig, EvalError, ObservationSet, PolicyEngine, Scalar};
use vp_policy::{hash_policy, verify_public, PolicyError, PolicySpec, PublicPolicySpec};

const POLICY_YAML: &str = r#"
id: credit-tier
version: 1.2.0
metadata:
  title: Credit tier
  namespace: org.example.lending
  tags: [credit]
subject:
  type: user
  idFormat: did
inputs:
  - id: score_in
    source:
      kind: http
      ref: https://bureau.example/v1/score
    signal: credit_score
    valueType: number
    window:
      mode: relative
      lookback: 30d
    aggregation:
      op: latest
  - id: latency
    source:
      kind: warehouse
      ref: ops.latency
    signal: response_ms
    valueType: number
    window:
      mode: range
      start: "2024-03-01T00:00:00Z"
      end: "2024-03-10T00:00:00Z"
    aggregation:
      op: p50
outputs:
  - name: score
    type: number
    derive:
      kind: SCORE
      input: score_in
  - name: tier
    type: enum
    derive:
      kind: BAND
      from: SCORE
      score: score
      bands:
        - label: A
          minInclusive: 80
          maxExclusive: 101
        - label: B
          minInclusive: 60
          maxExclusive: 80
        - label: C
          minInclusive: 0
          maxExclusive: 60
  - name: median_latency
    type: number
    derive:
      kind: SCORE
      input: latency
validity:
  ttl: 7d
  maxAge: 30d
  reusable: false
disclosure:
  exposeClaims: [tier, median_latency]
"#;

const OBSERVATIONS: &str = r#"{
    "score_in": [
        {"timestamp": "2024-03-01T00:00:00Z", "value": 72},
        {"timestamp": "2024-03-02T00:00:00Z", "value": 81}
    ],
    "latency": [
        {"timestamp": "2024-03-03T00:00:00Z", "value": 40},
        {"timestamp": "2024-03-04T00:00:00Z", "value": 10},
        {"timestamp": "2024-03-05T00:00:00Z", "value": 30},
        {"timestamp": "2024-03-06T00:00:00Z", "value": 20}
    ]
}"#;

fn at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-10T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn yaml_policy_evaluates_to_disclosed_claims() {
    let dir = tempdir().unwrap();
    let yaml_path = dir.path().join("policy.yaml");
    let json_path = dir.path().join("policy.json");
    let obs_path = dir.path().join("observations.json");
    fs::write(&yaml_path, POLICY_YAML).unwrap();
    fs::write(&obs_path, OBSERVATIONS).unwrap();

    let spec = PolicySpec::load(&yaml_path).unwrap();
    fs::write(&json_path, serde_json::to_string_pretty(&spec).unwrap()).unwrap();
    let twin = PolicySpec::load(&json_path).unwrap();
    assert_eq!(hash_policy(&spec).unwrap(), hash_policy(&twin).unwrap());

    let public = PublicPolicySpec::from_private(&spec, None).unwrap();
    verify_public(&public, &twin).unwrap();

    let engine = PolicyEngine::new(EngineConfig::default());
    let sealed = engine.prepare(spec).unwrap();
    let observations = ObservationSet::load(&obs_path).unwrap();
    let eval = engine.evaluate(&sealed, &observations, at()).unwrap();

    assert!(eval.is_complete(), "failures: {:?}", eval.failures);
    let set = &eval.claim_set;
    assert_eq!(&set.policy_hash, public.policy_hash());
    assert_eq!(set.claim("tier").unwrap().value, Scalar::String("A".to_string()));
    assert_eq!(set.claim("median_latency").unwrap().value, Scalar::Number(20.0));
    assert!(set.claim("score").is_none());
    assert!(set.rule_results.is_none());
    assert!(set.inputs.is_none());
    assert!(!set.validity.reusable);
    assert_eq!(
        set.validity.not_before.unwrap().to_rfc3339(),
        "2024-02-09T12:00:00+00:00"
    );

    let again = engine.evaluate(&sealed, &observations, at()).unwrap();
    assert_eq!(
        set.canonical_bytes().unwrap(),
        again.claim_set.canonical_bytes().unwrap()
    );
}

#[test]
fn score_is_disclosed_only_when_rule_results_are_exposed() {
    let mut spec = PolicySpec::from_yaml_str(POLICY_YAML).unwrap();
    let observations = ObservationSet::from_json_str(OBSERVATIONS).unwrap();
    let engine = PolicyEngine::default();

    let hidden = engine
        .evaluate(&engine.prepare(spec.clone()).unwrap(), &observations, at())
        .unwrap();
    let text = String::from_utf8(hidden.claim_set.canonical_bytes().unwrap()).unwrap();
    assert!(!text.contains(r#""score""#));
    assert!(!text.contains("ruleResults"));

    spec.disclosure.expose_rule_results = Some(true);
    spec.disclosure.expose_inputs = Some(true);
    let shown = engine
        .evaluate(&engine.prepare(spec).unwrap(), &observations, at())
        .unwrap();
    let rules = shown.claim_set.rule_results.as_ref().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].output, "score");
    assert_eq!(rules[0].value, Scalar::Number(81.0));
    let inputs = shown.claim_set.inputs.as_ref().unwrap();
    let ids: Vec<&str> = inputs.iter().map(|i| i.input.as_str()).collect();
    assert_eq!(ids, vec!["score_in", "latency"]);
    // Still only the exposed claims themselves.
    assert!(shown.claim_set.claim("score").is_none());
    // Different disclosure, different policy.
    assert_ne!(shown.claim_set.policy_hash, hidden.claim_set.policy_hash);
}

#[test]
fn band_over_score_with_missing_input_is_rejected() {
    let spec: PolicySpec = serde_json::from_value(json!({
        "id": "broken",
        "version": "1.0.0",
        "metadata": {"title": "Broken", "namespace": "org.example"},
        "subject": {"type": "user"},
        "inputs": [],
        "outputs": [
            {"name": "A", "type": "number", "derive": {"kind": "SCORE", "input": "nope"}},
            {"name": "B", "type": "enum", "derive": {
                "kind": "BAND", "from": "SCORE", "score": "A",
                "bands": [{"label": "x", "minInclusive": 0, "maxExclusive": 1}]
            }}
        ],
        "validity": {"ttl": "1d"},
        "disclosure": {"exposeClaims": ["B"]}
    }))
    .unwrap();

    match PolicyEngine::default().prepare(spec) {
        Err(vp_engine::EngineError::Policy(PolicyError::InvalidPolicy { issues })) => {
            assert!(issues.iter().any(|i| i.contains("output 'A'")));
            assert!(issues.iter().any(|i| i.contains("output 'B'")));
        }
        other => panic!("expected InvalidPolicy, got {:?}", other),
    }
}

#[test]
fn stale_observations_fail_without_default_band() {
    let spec = PolicySpec::from_yaml_str(POLICY_YAML).unwrap();
    let engine = PolicyEngine::default();
    let sealed = engine.prepare(spec).unwrap();
    let observations = ObservationSet::from_json_str(OBSERVATIONS).unwrap();

    // 30-day lookback from June misses every March score.
    let june = DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    let eval = engine.evaluate(&sealed, &observations, june).unwrap();

    assert!(matches!(
        eval.input_failure("score_in"),
        Some(EvalError::InsufficientData { .. })
    ));
    let tier = eval.output_failure("tier").unwrap();
    assert!(matches!(tier.root_cause(), EvalError::InsufficientData { .. }));
    assert!(eval.claim_set.claim("tier").is_none());
    // The fixed range window is unaffected.
    assert_eq!(
        eval.claim_set.claim("median_latency").unwrap().value,
        Scalar::Number(20.0)
    );
}
