// evaluator.rs — Derivation: resolved features → typed claims.
//
// Each output is derived on its own from the feature or upstream claim its
// rule reads. A failed dependency is wrapped, never replaced by a default:
// a BAND over a failed SCORE fails with `DependencyFailed`.

use std::collections::BTreeSet;

use vp_policy::{
    ClaimType, DeriveRule, NodeRef, OutputClaimSpec, PolicyGraph, PolicySpec, RuleKind, Unit,
};

use crate::error::EvalError;
use crate::observation::{Scalar, TypeOf};
use crate::resolver::Feature;

/// A derived claim with its provenance.
///
/// Provenance is used only by the disclosure filter and is never serialized;
/// see [`DisclosedClaim`](crate::disclosure::DisclosedClaim) for what leaves
/// the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub name: String,
    pub claim_type: ClaimType,
    pub value: Scalar,
    pub unit: Option<Unit>,
    pub rule: RuleKind,
    /// Index of the upstream output whose result this claim was derived
    /// from (the SCORE behind a BAND).
    pub derived_from_output: Option<usize>,
    /// Indices of every input this claim ultimately reads.
    pub derived_from_inputs: BTreeSet<usize>,
}

/// Per-node results of one evaluation, indexed like the policy's inputs and
/// outputs. `None` means not (yet) evaluated.
#[derive(Debug, Clone, Default)]
pub struct Results {
    pub features: Vec<Option<Result<Feature, EvalError>>>,
    pub claims: Vec<Option<Result<Claim, EvalError>>>,
}

impl Results {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self {
            features: vec![None; inputs],
            claims: vec![None; outputs],
        }
    }
}

/// Derive output `idx`. Every output it reads must already be in `results`
/// (guaranteed when outputs are visited in `graph.evaluation_order()`).
pub fn derive(
    spec: &PolicySpec,
    graph: &PolicyGraph,
    idx: usize,
    results: &Results,
) -> Result<Claim, EvalError> {
    let output = &spec.outputs[idx];
    let source = graph.source_of(idx);

    let (value, derived_from_output) = match &output.derive {
        DeriveRule::Const { value } => (Scalar::from(value), None),
        DeriveRule::PassFail { .. } => {
            let feature = read_feature(spec, output, source, results)?;
            match feature.value {
                Scalar::Bool(_) => (feature.value.clone(), None),
                ref other => return Err(mismatch(output, "PASS_FAIL needs a boolean", other)),
            }
        }
        DeriveRule::Score { .. } => {
            let feature = read_feature(spec, output, source, results)?;
            let score = match feature.value {
                Scalar::Number(n) => n,
                ref other => return Err(mismatch(output, "SCORE needs a number", other)),
            };
            check_unit(output, feature.unit, score)?;
            (Scalar::Number(score), None)
        }
        DeriveRule::Band(rule) => {
            let (score, upstream) = match source {
                Some(NodeRef::Output(dep)) => {
                    let claim = read_claim(spec, output, dep, results)?;
                    match claim.value {
                        Scalar::Number(n) => (n, Some(dep)),
                        ref other => return Err(mismatch(output, "BAND needs a number", other)),
                    }
                }
                _ => {
                    let feature = read_feature(spec, output, source, results)?;
                    match feature.value {
                        Scalar::Number(n) => (n, None),
                        ref other => return Err(mismatch(output, "BAND needs a number", other)),
                    }
                }
            };
            if !score.is_finite() {
                return Err(EvalError::NonFiniteNumber {
                    subject: format!("output '{}'", output.name),
                });
            }
            let band = rule.select(score).ok_or_else(|| EvalError::UnbandedScore {
                output: output.name.clone(),
            })?;
            (Scalar::String(band.label.clone()), upstream)
        }
    };

    if !value.fits(output.claim_type) {
        return Err(mismatch(
            output,
            &format!("claim type {}", output.claim_type),
            &value,
        ));
    }
    if let Scalar::Number(n) = value {
        if !n.is_finite() {
            return Err(EvalError::NonFiniteNumber {
                subject: format!("output '{}'", output.name),
            });
        }
    }

    Ok(Claim {
        name: output.name.clone(),
        claim_type: output.claim_type,
        value,
        unit: output.unit,
        rule: output.derive.kind(),
        derived_from_output,
        derived_from_inputs: graph.inputs_of(idx),
    })
}

fn read_feature<'a>(
    spec: &PolicySpec,
    output: &OutputClaimSpec,
    source: Option<NodeRef>,
    results: &'a Results,
) -> Result<&'a Feature, EvalError> {
    let idx = match source {
        Some(NodeRef::Input(idx)) => idx,
        _ => {
            return Err(EvalError::TypeMismatch {
                subject: format!("output '{}'", output.name),
                reason: format!("{} rule has no input to read", output.derive.kind()),
            })
        }
    };
    let input_id = spec.inputs[idx].id.as_str();
    match results.features.get(idx).and_then(Option::as_ref) {
        Some(Ok(feature)) => Ok(feature),
        Some(Err(err)) => Err(EvalError::DependencyFailed {
            output: output.name.clone(),
            dependency: input_id.to_string(),
            source: Box::new(err.clone()),
        }),
        None => Err(EvalError::InsufficientData {
            input: input_id.to_string(),
            reason: "input was not resolved".to_string(),
        }),
    }
}

fn read_claim<'a>(
    spec: &PolicySpec,
    output: &OutputClaimSpec,
    dep: usize,
    results: &'a Results,
) -> Result<&'a Claim, EvalError> {
    let dep_name = spec.outputs[dep].name.as_str();
    match results.claims.get(dep).and_then(Option::as_ref) {
        Some(Ok(claim)) => Ok(claim),
        Some(Err(err)) => Err(EvalError::DependencyFailed {
            output: output.name.clone(),
            dependency: dep_name.to_string(),
            source: Box::new(err.clone()),
        }),
        None => Err(EvalError::DependencyFailed {
            output: output.name.clone(),
            dependency: dep_name.to_string(),
            source: Box::new(EvalError::InsufficientData {
                input: dep_name.to_string(),
                reason: "output was not evaluated".to_string(),
            }),
        }),
    }
}

/// A declared output unit must match the feature's unit, and range-bearing
/// units bound the score.
fn check_unit(output: &OutputClaimSpec, feature_unit: Option<Unit>, score: f64) -> Result<(), EvalError> {
    let subject = || format!("output '{}'", output.name);
    if let Some(declared) = output.unit {
        if feature_unit != Some(declared) {
            return Err(EvalError::TypeMismatch {
                subject: subject(),
                reason: format!(
                    "declares unit '{}' but the feature has {}",
                    declared,
                    feature_unit
                        .map(|u| format!("unit '{}'", u))
                        .unwrap_or_else(|| "no unit".to_string())
                ),
            });
        }
    }
    if let Some(unit) = output.unit.or(feature_unit) {
        if let Some((lo, hi)) = unit.bounds() {
            if !(lo..=hi).contains(&score) {
                return Err(EvalError::TypeMismatch {
                    subject: subject(),
                    reason: format!("score is outside [{}, {}] for unit '{}'", lo, hi, unit),
                });
            }
        }
    }
    Ok(())
}

fn mismatch(output: &OutputClaimSpec, expected: &str, got: &Scalar) -> EvalError {
    EvalError::TypeMismatch {
        subject: format!("output '{}'", output.name),
        reason: format!("{}, got {}", expected, TypeOf(got)),
    }
}
