// output.rs — Declared output claims and their derivation rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::input::Unit;

/// A claim the policy can publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OutputClaimSpec {
    /// Unique within the policy; disclosure and BAND rules refer to it.
    pub name: String,
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    pub derive: DeriveRule,
}

/// Published type of a claim value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Boolean,
    Enum,
    Number,
    String,
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClaimType::Boolean => "boolean",
            ClaimType::Enum => "enum",
            ClaimType::Number => "number",
            ClaimType::String => "string",
        })
    }
}

/// How a claim value is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub enum DeriveRule {
    /// The boolean feature of one input.
    PassFail { input: String },
    /// The numeric feature of one input.
    Score { input: String },
    /// A label chosen by which band contains a score.
    Band(BandRule),
    /// A literal, independent of every input.
    Const { value: ConstValue },
}

impl DeriveRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            DeriveRule::PassFail { .. } => RuleKind::PassFail,
            DeriveRule::Score { .. } => RuleKind::Score,
            DeriveRule::Band(_) => RuleKind::Band,
            DeriveRule::Const { .. } => RuleKind::Const,
        }
    }
}

/// Payload-free discriminant of [`DeriveRule`], used in results and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    PassFail,
    Score,
    Band,
    Const,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleKind::PassFail => "PASS_FAIL",
            RuleKind::Score => "SCORE",
            RuleKind::Band => "BAND",
            RuleKind::Const => "CONST",
        })
    }
}

/// BAND rule body.
///
/// The score comes from, in order of precedence: the SCORE output named by
/// `score`, the numeric input named by `input`, or the policy's only SCORE
/// output when neither is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BandRule {
    pub from: BandFrom,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub bands: Vec<Band>,
}

impl BandRule {
    /// Find the band containing `score`. At most one can match in a
    /// validated policy.
    pub fn select(&self, score: f64) -> Option<&Band> {
        self.bands.iter().find(|band| band.contains(score))
    }
}

/// The only band source the schema defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandFrom {
    #[serde(rename = "SCORE")]
    Score,
}

/// A labeled half-open range `[minInclusive, maxExclusive)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Band {
    pub label: String,
    pub min_inclusive: f64,
    pub max_exclusive: f64,
}

impl Band {
    pub fn contains(&self, score: f64) -> bool {
        self.min_inclusive <= score && score < self.max_exclusive
    }
}

/// Literal for a CONST rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ConstValue {
    /// Whether a claim of `claim_type` can carry this literal.
    pub fn fits(&self, claim_type: ClaimType) -> bool {
        matches!(
            (self, claim_type),
            (ConstValue::Bool(_), ClaimType::Boolean)
                | (ConstValue::Number(_), ClaimType::Number)
                | (ConstValue::String(_), ClaimType::String)
                | (ConstValue::String(_), ClaimType::Enum)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn band_rule_parses_and_round_trips() {
        let doc = json!({
            "name": "tier",
            "type": "enum",
            "derive": {
                "kind": "BAND",
                "from": "SCORE",
                "score": "score",
                "bands": [
                    {"label": "A", "minInclusive": 80.0, "maxExclusive": 101.0},
                    {"label": "B", "minInclusive": 60.0, "maxExclusive": 80.0}
                ]
            }
        });
        let spec: OutputClaimSpec = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(spec.derive.kind(), RuleKind::Band);
        assert_eq!(serde_json::to_value(&spec).unwrap(), doc);
    }

    #[test]
    fn derive_kinds_use_screaming_snake_case() {
        let rule: DeriveRule =
            serde_json::from_value(json!({"kind": "PASS_FAIL", "input": "ok"})).unwrap();
        assert_eq!(
            rule,
            DeriveRule::PassFail {
                input: "ok".to_string()
            }
        );
        let rule: DeriveRule =
            serde_json::from_value(json!({"kind": "CONST", "value": "v1"})).unwrap();
        assert_eq!(
            rule,
            DeriveRule::Const {
                value: ConstValue::String("v1".to_string())
            }
        );
    }

    #[test]
    fn band_bounds_are_half_open() {
        let band = Band {
            label: "B".to_string(),
            min_inclusive: 60.0,
            max_exclusive: 80.0,
        };
        assert!(band.contains(60.0));
        assert!(band.contains(79.999));
        assert!(!band.contains(80.0));
        assert!(!band.contains(59.999));
    }

    #[test]
    fn const_literals_fit_matching_claim_types() {
        assert!(ConstValue::Bool(true).fits(ClaimType::Boolean));
        assert!(ConstValue::String("x".into()).fits(ClaimType::Enum));
        assert!(!ConstValue::Number(1.0).fits(ClaimType::String));
    }
}
