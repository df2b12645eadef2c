// input.rs — Declared inputs: where a signal comes from, which time window
// to look at, and how to reduce the window to one scalar feature.
//
// Every small closed set in the policy schema (value types, units,
// aggregation ops, window modes) is an enum, so the resolver dispatches with
// exhaustive `match` rather than string comparison.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::{Duration, Timestamp};

/// A declared input: one signal, one window, one aggregation → one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InputSpec {
    /// Unique within the policy; derivation rules refer to inputs by this id.
    pub id: String,
    /// Opaque pointer handed to the data-access collaborator.
    pub source: DataSourceRef,
    /// Signal name within the source (e.g. "credit_score", "co2_grams").
    pub signal: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    pub window: TimeWindowSpec,
    pub aggregation: AggregationSpec,
}

impl InputSpec {
    /// Type of the resolved feature. Only `latest` preserves the observed
    /// type; every other aggregation yields a number.
    pub fn feature_type(&self) -> ValueType {
        match self.aggregation {
            AggregationSpec::Latest => self.value_type,
            _ => ValueType::Number,
        }
    }

    /// Unit of the resolved feature.
    ///
    /// Value-preserving reductions keep the declared unit, counting
    /// reductions produce `count`, and rates have no unit in the schema.
    pub fn feature_unit(&self) -> Option<Unit> {
        match self.aggregation {
            AggregationSpec::Latest
            | AggregationSpec::Min
            | AggregationSpec::Max
            | AggregationSpec::Avg
            | AggregationSpec::Sum
            | AggregationSpec::P50
            | AggregationSpec::P90
            | AggregationSpec::P95
            | AggregationSpec::P99 => self.unit,
            AggregationSpec::Count | AggregationSpec::DistinctCount => Some(Unit::Count),
            AggregationSpec::WindowedRate { .. } => None,
        }
    }
}

/// Pointer to a data source. Never carries secrets, only locators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSourceRef {
    pub kind: SourceKind,
    /// Source-specific locator (URL, table name, contract address, ...).
    #[serde(rename = "ref")]
    pub reference: String,
    /// Opaque connector settings, carried verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

/// Known data source kinds, plus an escape hatch for anything else.
///
/// The engine never interprets the kind; it only passes it to the
/// collaborator that fetches observations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    Http,
    Warehouse,
    Oracle,
    Onchain,
    File,
    Manual,
    Other(String),
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::Http => "http",
            SourceKind::Warehouse => "warehouse",
            SourceKind::Oracle => "oracle",
            SourceKind::Onchain => "onchain",
            SourceKind::File => "file",
            SourceKind::Manual => "manual",
            SourceKind::Other(name) => name,
        }
    }
}

impl From<String> for SourceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "http" => SourceKind::Http,
            "warehouse" => SourceKind::Warehouse,
            "oracle" => SourceKind::Oracle,
            "onchain" => SourceKind::Onchain,
            "file" => SourceKind::File,
            "manual" => SourceKind::Manual,
            _ => SourceKind::Other(value),
        }
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar type of an input's observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Boolean,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
        })
    }
}

/// Measurement units. Closed set; the engine never converts between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Count,
    Ratio,
    Percent,
    Seconds,
    Meters,
    Kilometers,
    Miles,
    Celsius,
    Fahrenheit,
    Kwh,
    Usd,
}

impl Unit {
    /// Inclusive value range implied by the unit, if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Unit::Percent => Some((0.0, 100.0)),
            Unit::Ratio => Some((0.0, 1.0)),
            Unit::Count => Some((0.0, f64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Count => "count",
            Unit::Ratio => "ratio",
            Unit::Percent => "percent",
            Unit::Seconds => "seconds",
            Unit::Meters => "meters",
            Unit::Kilometers => "kilometers",
            Unit::Miles => "miles",
            Unit::Celsius => "celsius",
            Unit::Fahrenheit => "fahrenheit",
            Unit::Kwh => "kwh",
            Unit::Usd => "usd",
        })
    }
}

/// Which observations an input looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", deny_unknown_fields)]
pub enum TimeWindowSpec {
    /// The nearest observation at or before `at`.
    Point { at: Timestamp },
    /// All observations with `start <= t < end`.
    Range { start: Timestamp, end: Timestamp },
    /// `[now - lookback - endOffset, now - endOffset)` against the caller's
    /// evaluation instant.
    Relative {
        lookback: Duration,
        #[serde(
            rename = "endOffset",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        end_offset: Option<Duration>,
    },
}

/// How the selected observations reduce to one feature value.
///
/// Deserialized through `AggregationFields`, which rejects stray keys that
/// the tagged unit variants would otherwise ignore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", try_from = "AggregationFields")]
pub enum AggregationSpec {
    Latest,
    Min,
    Max,
    Avg,
    Sum,
    Count,
    P50,
    P90,
    P95,
    P99,
    DistinctCount,
    /// Qualifying observations per `per` of window time.
    WindowedRate { per: Duration },
}

/// Raw `aggregation` object. Every key must be known.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AggregationFields {
    op: String,
    #[serde(default)]
    per: Option<Duration>,
}

impl TryFrom<AggregationFields> for AggregationSpec {
    type Error = String;

    fn try_from(fields: AggregationFields) -> Result<Self, Self::Error> {
        let spec = match fields.op.as_str() {
            "windowedRate" => {
                let per = fields
                    .per
                    .ok_or_else(|| "aggregation 'windowedRate' requires 'per'".to_string())?;
                return Ok(AggregationSpec::WindowedRate { per });
            }
            "latest" => AggregationSpec::Latest,
            "min" => AggregationSpec::Min,
            "max" => AggregationSpec::Max,
            "avg" => AggregationSpec::Avg,
            "sum" => AggregationSpec::Sum,
            "count" => AggregationSpec::Count,
            "p50" => AggregationSpec::P50,
            "p90" => AggregationSpec::P90,
            "p95" => AggregationSpec::P95,
            "p99" => AggregationSpec::P99,
            "distinctCount" => AggregationSpec::DistinctCount,
            other => return Err(format!("unknown aggregation op '{}'", other)),
        };
        if fields.per.is_some() {
            return Err(format!("aggregation '{}' takes no 'per'", spec.name()));
        }
        Ok(spec)
    }
}

impl AggregationSpec {
    /// Percentile rank in whole percent, for the percentile ops.
    pub fn percentile(&self) -> Option<u32> {
        match self {
            AggregationSpec::P50 => Some(50),
            AggregationSpec::P90 => Some(90),
            AggregationSpec::P95 => Some(95),
            AggregationSpec::P99 => Some(99),
            _ => None,
        }
    }

    /// Whether the op only makes sense over numbers.
    pub fn requires_numeric(&self) -> bool {
        matches!(
            self,
            AggregationSpec::Min
                | AggregationSpec::Max
                | AggregationSpec::Avg
                | AggregationSpec::Sum
                | AggregationSpec::P50
                | AggregationSpec::P90
                | AggregationSpec::P95
                | AggregationSpec::P99
        )
    }

    /// Wire name of the op, for messages.
    pub fn name(&self) -> &'static str {
        match self {
            AggregationSpec::Latest => "latest",
            AggregationSpec::Min => "min",
            AggregationSpec::Max => "max",
            AggregationSpec::Avg => "avg",
            AggregationSpec::Sum => "sum",
            AggregationSpec::Count => "count",
            AggregationSpec::P50 => "p50",
            AggregationSpec::P90 => "p90",
            AggregationSpec::P95 => "p95",
            AggregationSpec::P99 => "p99",
            AggregationSpec::DistinctCount => "distinctCount",
            AggregationSpec::WindowedRate { .. } => "windowedRate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_spec_parses_camel_case_document() {
        let input: InputSpec = serde_json::from_value(json!({
            "id": "score_in",
            "source": {"kind": "http", "ref": "https://bureau.example/v1/score"},
            "signal": "credit_score",
            "valueType": "number",
            "window": {"mode": "relative", "lookback": "30d"},
            "aggregation": {"op": "latest"}
        }))
        .unwrap();
        assert_eq!(input.id, "score_in");
        assert_eq!(input.source.kind, SourceKind::Http);
        assert_eq!(input.aggregation, AggregationSpec::Latest);
        match &input.window {
            TimeWindowSpec::Relative {
                lookback,
                end_offset,
            } => {
                assert_eq!(lookback.as_str(), "30d");
                assert!(end_offset.is_none());
            }
            other => panic!("expected relative window, got {:?}", other),
        }
    }

    #[test]
    fn unknown_source_kind_is_preserved_verbatim() {
        let source: DataSourceRef = serde_json::from_value(json!({
            "kind": "ipfs",
            "ref": "bafy...",
            "config": {"gateway": "https://ipfs.io", "pin": true}
        }))
        .unwrap();
        assert_eq!(source.kind, SourceKind::Other("ipfs".to_string()));
        let back = serde_json::to_value(&source).unwrap();
        assert_eq!(back["kind"], "ipfs");
        assert_eq!(back["config"]["pin"], true);
    }

    #[test]
    fn aggregation_ops_use_wire_names() {
        let ops = [
            (json!({"op": "distinctCount"}), AggregationSpec::DistinctCount),
            (json!({"op": "p95"}), AggregationSpec::P95),
            (
                json!({"op": "windowedRate", "per": "1h"}),
                AggregationSpec::WindowedRate {
                    per: Duration::parse("1h").unwrap(),
                },
            ),
        ];
        for (doc, expected) in ops {
            let parsed: AggregationSpec = serde_json::from_value(doc.clone()).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(serde_json::to_value(&parsed).unwrap(), doc);
        }
    }

    #[test]
    fn aggregation_rejects_stray_and_missing_keys() {
        for doc in [
            json!({"op": "latest", "per": "1h"}),
            json!({"op": "p50", "window": "7d"}),
            json!({"op": "windowedRate"}),
            json!({"op": "median"}),
        ] {
            let parsed: Result<AggregationSpec, _> = serde_json::from_value(doc.clone());
            assert!(parsed.is_err(), "{} should be rejected", doc);
        }
    }

    #[test]
    fn unknown_unit_is_rejected() {
        let parsed: Result<Unit, _> = serde_json::from_value(json!("furlongs"));
        assert!(parsed.is_err());
        assert_eq!(Unit::Kwh.to_string(), "kwh");
    }

    #[test]
    fn feature_type_and_unit_follow_aggregation() {
        let mut input: InputSpec = serde_json::from_value(json!({
            "id": "trips",
            "source": {"kind": "warehouse", "ref": "fleet.trips"},
            "signal": "distance",
            "valueType": "number",
            "unit": "kilometers",
            "window": {"mode": "relative", "lookback": "7d"},
            "aggregation": {"op": "sum"}
        }))
        .unwrap();
        assert_eq!(input.feature_unit(), Some(Unit::Kilometers));

        input.aggregation = AggregationSpec::Count;
        assert_eq!(input.feature_unit(), Some(Unit::Count));

        input.value_type = ValueType::Boolean;
        input.aggregation = AggregationSpec::Latest;
        assert_eq!(input.feature_type(), ValueType::Boolean);
    }
}
