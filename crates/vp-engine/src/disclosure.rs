// disclosure.rs — The disclosure boundary.
//
// Everything a verifier sees leaves the engine through `filter`. It starts
// from nothing and adds only what the DisclosureSpec allows:
//
// - claims named in `exposeClaims` (and only those that were derived)
// - with `exposeRuleResults`, the upstream rule results those claims were
//   derived from
// - with `exposeInputs`, the resolved features those claims read
//
// Absent flags mean false. Provenance on `Claim` is consulted here and
// nowhere else.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vp_canon::{CanonError, PolicyHash};
use vp_policy::{ClaimType, PolicySpec, RuleKind, Unit};

use crate::evaluator::{Claim, Results};
use crate::observation::Scalar;
use crate::validity::ValidityStamp;

/// A claim as published: no provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisclosedClaim {
    pub name: String,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    pub value: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl From<&Claim> for DisclosedClaim {
    fn from(claim: &Claim) -> Self {
        Self {
            name: claim.name.clone(),
            claim_type: claim.claim_type,
            value: claim.value.clone(),
            unit: claim.unit,
        }
    }
}

/// An intermediate rule result an exposed claim was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleResult {
    pub output: String,
    pub rule: RuleKind,
    pub value: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

/// A resolved feature an exposed claim read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputEcho {
    pub input: String,
    pub value: Scalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

/// What the disclosure filter lets through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Disclosure {
    pub claims: Vec<DisclosedClaim>,
    pub rule_results: Option<Vec<RuleResult>>,
    pub inputs: Option<Vec<InputEcho>>,
}

/// Restrict derived claims to what `spec.disclosure` permits.
///
/// Claims come out in policy output order. Failed outputs are simply absent;
/// they are reported through the evaluation's failure list instead.
pub fn filter(spec: &PolicySpec, results: &Results) -> Disclosure {
    let policy = &spec.disclosure;
    let exposed: Vec<&Claim> = spec
        .outputs
        .iter()
        .enumerate()
        .filter(|(_, output)| policy.exposes_claim(&output.name))
        .filter_map(|(idx, _)| match results.claims.get(idx) {
            Some(Some(Ok(claim))) => Some(claim),
            _ => None,
        })
        .collect();

    let rule_results = policy.exposes_rule_results().then(|| {
        let mut upstream = BTreeSet::new();
        for claim in &exposed {
            let mut next = claim.derived_from_output;
            // Chains are acyclic; bound the walk by the output count anyway.
            for _ in 0..results.claims.len() {
                match next {
                    Some(idx) if upstream.insert(idx) => {
                        next = match results.claims.get(idx) {
                            Some(Some(Ok(c))) => c.derived_from_output,
                            _ => None,
                        };
                    }
                    _ => break,
                }
            }
        }
        upstream
            .into_iter()
            .filter_map(|idx| match results.claims.get(idx) {
                Some(Some(Ok(c))) => Some(RuleResult {
                    output: c.name.clone(),
                    rule: c.rule,
                    value: c.value.clone(),
                    unit: c.unit,
                }),
                _ => None,
            })
            .collect()
    });

    let inputs = policy.exposes_inputs().then(|| {
        let read: BTreeSet<usize> = exposed
            .iter()
            .flat_map(|c| c.derived_from_inputs.iter().copied())
            .collect();
        read.into_iter()
            .filter_map(|idx| match results.features.get(idx) {
                Some(Some(Ok(feature))) => Some(InputEcho {
                    input: spec.inputs[idx].id.clone(),
                    value: feature.value.clone(),
                    unit: feature.unit,
                }),
                _ => None,
            })
            .collect()
    });

    Disclosure {
        claims: exposed.into_iter().map(DisclosedClaim::from).collect(),
        rule_results,
        inputs,
    }
}

/// The public message of one evaluation, handed to the proof generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosedClaimSet {
    pub policy_hash: PolicyHash,
    pub claims: Vec<DisclosedClaim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_results: Option<Vec<RuleResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<InputEcho>>,
    #[serde(flatten)]
    pub validity: ValidityStamp,
}

impl DisclosedClaimSet {
    pub fn new(policy_hash: PolicyHash, disclosure: Disclosure, validity: ValidityStamp) -> Self {
        Self {
            policy_hash,
            claims: disclosure.claims,
            rule_results: disclosure.rule_results,
            inputs: disclosure.inputs,
            validity,
        }
    }

    pub fn claim(&self, name: &str) -> Option<&DisclosedClaim> {
        self.claims.iter().find(|c| c.name == name)
    }

    /// RFC 8785 bytes: identical inputs give identical bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CanonError> {
        vp_canon::to_canonical_bytes(self)
    }
}
