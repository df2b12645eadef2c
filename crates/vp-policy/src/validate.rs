// validate.rs — Static policy validation.
//
// Everything that can be checked without observations is checked here,
// before any evaluation starts:
//
// 1. Identity: non-empty id, title, namespace
// 2. Uniqueness: input ids and output names
// 3. Inputs: aggregation vs. value type, window shape, rate period
// 4. Outputs: references resolve, claim types and units line up, bands
//    partition their range with no gaps or overlaps
// 5. Graph: no cycles; outputs depending on invalid outputs are invalid too
// 6. Disclosure: every exposed claim exists
//
// All issues are collected so an author sees every problem at once.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::PolicyError;
use crate::graph::{NodeRef, PolicyGraph};
use crate::input::{AggregationSpec, InputSpec, TimeWindowSpec, ValueType};
use crate::output::{Band, BandRule, ClaimType, ConstValue, DeriveRule, OutputClaimSpec};
use crate::spec::PolicySpec;

/// Validate a policy and build its dependency graph.
pub fn validate(spec: &PolicySpec) -> Result<PolicyGraph, PolicyError> {
    let mut issues = Vec::new();

    if spec.id.trim().is_empty() {
        issues.push("policy id must not be empty".to_string());
    }
    if spec.metadata.title.trim().is_empty() {
        issues.push("metadata.title must not be empty".to_string());
    }
    if spec.metadata.namespace.trim().is_empty() {
        issues.push("metadata.namespace must not be empty".to_string());
    }

    let input_index = index_unique(
        spec.inputs.iter().map(|i| i.id.as_str()),
        "input id",
        &mut issues,
    );
    let output_index = index_unique(
        spec.outputs.iter().map(|o| o.name.as_str()),
        "output name",
        &mut issues,
    );

    for input in &spec.inputs {
        check_input(input, &mut issues);
    }

    let mut broken = vec![false; spec.outputs.len()];
    let mut sources = Vec::with_capacity(spec.outputs.len());
    for (idx, output) in spec.outputs.iter().enumerate() {
        let mut problems = Vec::new();
        let source = resolve_source(spec, output, &input_index, &output_index, &mut problems);
        check_output(spec, output, source, &mut problems);
        if !problems.is_empty() {
            broken[idx] = true;
            issues.extend(
                problems
                    .into_iter()
                    .map(|p| format!("output '{}': {}", output.name, p)),
            );
        }
        sources.push(source);
    }

    let graph = match PolicyGraph::build(sources) {
        Ok(graph) => graph,
        Err(cyclic) => {
            let names: Vec<&str> = cyclic
                .iter()
                .map(|i| spec.outputs[*i].name.as_str())
                .collect();
            issues.push(format!(
                "cyclic references between outputs: {}",
                names.join(", ")
            ));
            return Err(PolicyError::InvalidPolicy { issues });
        }
    };

    // A BAND over a broken SCORE is broken too; walking in evaluation order
    // carries this down chains of any length.
    for &idx in graph.evaluation_order() {
        if let Some(NodeRef::Output(dep)) = graph.source_of(idx) {
            if broken[dep] && !broken[idx] {
                broken[idx] = true;
                issues.push(format!(
                    "output '{}': depends on invalid output '{}'",
                    spec.outputs[idx].name, spec.outputs[dep].name
                ));
            }
        }
    }

    for name in &spec.disclosure.expose_claims {
        if !output_index.contains_key(name) {
            issues.push(format!(
                "disclosure.exposeClaims names unknown output '{}'",
                name
            ));
        }
    }

    if issues.is_empty() {
        debug!(
            policy_id = %spec.id,
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "policy validated"
        );
        Ok(graph)
    } else {
        Err(PolicyError::InvalidPolicy { issues })
    }
}

/// Map names to their first position, reporting empties and duplicates.
fn index_unique<'a>(
    names: impl Iterator<Item = &'a str>,
    what: &str,
    issues: &mut Vec<String>,
) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (pos, name) in names.enumerate() {
        if name.trim().is_empty() {
            issues.push(format!("{} at position {} is empty", what, pos));
            continue;
        }
        match index.entry(name.to_string()) {
            Entry::Occupied(_) => issues.push(format!("duplicate {} '{}'", what, name)),
            Entry::Vacant(slot) => {
                slot.insert(pos);
            }
        }
    }
    index
}

fn check_input(input: &InputSpec, issues: &mut Vec<String>) {
    let mut push = |msg: String| issues.push(format!("input '{}': {}", input.id, msg));

    if input.signal.trim().is_empty() {
        push("signal must not be empty".to_string());
    }
    if input.aggregation.requires_numeric() && input.value_type != ValueType::Number {
        push(format!(
            "aggregation '{}' needs number observations, not {}",
            input.aggregation.name(),
            input.value_type
        ));
    }

    match &input.window {
        TimeWindowSpec::Point { .. } => {
            if matches!(input.aggregation, AggregationSpec::WindowedRate { .. }) {
                push("windowedRate needs a range or relative window, not a point".to_string());
            }
        }
        TimeWindowSpec::Range { start, end } => {
            if start.instant() >= end.instant() {
                push(format!("range start {} is not before end {}", start, end));
            }
        }
        TimeWindowSpec::Relative { lookback, .. } => {
            if lookback.is_zero() {
                push("relative lookback must be longer than zero".to_string());
            }
        }
    }

    if let AggregationSpec::WindowedRate { per } = &input.aggregation {
        if per.is_zero() {
            push("windowedRate period must be longer than zero".to_string());
        }
    }
}

/// Resolve what an output reads from. Records a problem for every
/// reference that does not resolve or points at the wrong kind of node.
fn resolve_source(
    spec: &PolicySpec,
    output: &OutputClaimSpec,
    input_index: &HashMap<String, usize>,
    output_index: &HashMap<String, usize>,
    problems: &mut Vec<String>,
) -> Option<NodeRef> {
    let input_ref = |id: &str, problems: &mut Vec<String>| match input_index.get(id) {
        Some(idx) => Some(NodeRef::Input(*idx)),
        None => {
            problems.push(format!("references unknown input '{}'", id));
            None
        }
    };

    match &output.derive {
        DeriveRule::PassFail { input } | DeriveRule::Score { input } => {
            input_ref(input.as_str(), problems)
        }
        DeriveRule::Const { .. } => None,
        DeriveRule::Band(rule) => match (&rule.score, &rule.input) {
            (Some(_), Some(_)) => {
                problems.push("BAND rule sets both 'score' and 'input'".to_string());
                None
            }
            (None, Some(input)) => input_ref(input.as_str(), problems),
            (Some(score), None) => match output_index.get(score) {
                Some(idx) => Some(NodeRef::Output(*idx)),
                None => {
                    problems.push(format!("BAND references unknown output '{}'", score));
                    None
                }
            },
            (None, None) => {
                let scores: Vec<usize> = spec
                    .outputs
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| matches!(o.derive, DeriveRule::Score { .. }))
                    .map(|(i, _)| i)
                    .collect();
                match scores.as_slice() {
                    [only] => Some(NodeRef::Output(*only)),
                    [] => {
                        problems.push("BAND has no SCORE output to read from".to_string());
                        None
                    }
                    _ => {
                        problems.push(
                            "BAND must name its 'score' when the policy has several SCORE outputs"
                                .to_string(),
                        );
                        None
                    }
                }
            }
        },
    }
}

fn check_output(
    spec: &PolicySpec,
    output: &OutputClaimSpec,
    source: Option<NodeRef>,
    problems: &mut Vec<String>,
) {
    let source_input = match source {
        Some(NodeRef::Input(idx)) => spec.inputs.get(idx),
        _ => None,
    };

    match &output.derive {
        DeriveRule::PassFail { .. } => {
            expect_claim_type(output, &[ClaimType::Boolean], problems);
            if let Some(input) = source_input {
                if input.feature_type() != ValueType::Boolean {
                    problems.push(format!(
                        "PASS_FAIL needs a boolean feature, input '{}' yields {}",
                        input.id,
                        input.feature_type()
                    ));
                }
            }
        }
        DeriveRule::Score { .. } => {
            expect_claim_type(output, &[ClaimType::Number], problems);
            if let Some(input) = source_input {
                if input.feature_type() != ValueType::Number {
                    problems.push(format!(
                        "SCORE needs a number feature, input '{}' yields {}",
                        input.id,
                        input.feature_type()
                    ));
                }
                if let Some(unit) = output.unit {
                    if input.feature_unit() != Some(unit) {
                        problems.push(format!(
                            "declares unit '{}' but input '{}' yields {}",
                            unit,
                            input.id,
                            input
                                .feature_unit()
                                .map(|u| format!("'{}'", u))
                                .unwrap_or_else(|| "no unit".to_string())
                        ));
                    }
                }
            }
        }
        DeriveRule::Band(rule) => {
            expect_claim_type(output, &[ClaimType::Enum, ClaimType::String], problems);
            match source {
                Some(NodeRef::Output(idx)) => {
                    if let Some(target) = spec.outputs.get(idx) {
                        if !matches!(target.derive, DeriveRule::Score { .. }) {
                            problems.push(format!(
                                "BAND must read a SCORE output, '{}' is {}",
                                target.name,
                                target.derive.kind()
                            ));
                        }
                    }
                }
                Some(NodeRef::Input(idx)) => {
                    if let Some(input) = spec.inputs.get(idx) {
                        if input.feature_type() != ValueType::Number {
                            problems.push(format!(
                                "BAND needs a number feature, input '{}' yields {}",
                                input.id,
                                input.feature_type()
                            ));
                        }
                    }
                }
                None => {}
            }
            check_bands(rule, problems);
        }
        DeriveRule::Const { value } => {
            if !value.fits(output.claim_type) {
                problems.push(format!(
                    "CONST literal does not fit claim type {}",
                    output.claim_type
                ));
            }
            if let ConstValue::Number(n) = value {
                if !n.is_finite() {
                    problems.push(format!("CONST literal {} is not finite", n));
                }
            }
        }
    }
}

fn expect_claim_type(output: &OutputClaimSpec, allowed: &[ClaimType], problems: &mut Vec<String>) {
    if !allowed.contains(&output.claim_type) {
        problems.push(format!(
            "{} rule cannot produce a {} claim",
            output.derive.kind(),
            output.claim_type
        ));
    }
}

/// Bands must be non-empty, finite, well-ordered, uniquely labeled, and
/// tile `[lowest min, highest max)` exactly.
fn check_bands(rule: &BandRule, problems: &mut Vec<String>) {
    if rule.bands.is_empty() {
        problems.push("BAND needs at least one band".to_string());
        return;
    }

    let mut labels = HashSet::new();
    let mut well_formed = true;
    for band in &rule.bands {
        if band.label.trim().is_empty() {
            problems.push("band label must not be empty".to_string());
        } else if !labels.insert(band.label.as_str()) {
            problems.push(format!("duplicate band label '{}'", band.label));
        }
        if !band.min_inclusive.is_finite() || !band.max_exclusive.is_finite() {
            problems.push(format!("band '{}' has a non-finite bound", band.label));
            well_formed = false;
        } else if band.min_inclusive >= band.max_exclusive {
            problems.push(format!(
                "band '{}' is empty: minInclusive {} is not below maxExclusive {}",
                band.label, band.min_inclusive, band.max_exclusive
            ));
            well_formed = false;
        }
    }
    if !well_formed {
        return;
    }

    let mut sorted: Vec<&Band> = rule.bands.iter().collect();
    sorted.sort_by(|a, b| a.min_inclusive.total_cmp(&b.min_inclusive));
    for pair in sorted.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        if upper.min_inclusive < lower.max_exclusive {
            problems.push(format!(
                "bands '{}' and '{}' overlap",
                lower.label, upper.label
            ));
        } else if upper.min_inclusive > lower.max_exclusive {
            problems.push(format!(
                "gap between bands '{}' and '{}': [{}, {}) is unbanded",
                lower.label, upper.label, lower.max_exclusive, upper.min_inclusive
            ));
        }
    }
}
