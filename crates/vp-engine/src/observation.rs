// observation.rs — Raw observations and the scalar values flowing through
// the engine.
//
// Observations arrive already materialized, keyed by input id. The engine
// never fetches them itself; see `source.rs` for the collaborator interface.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vp_policy::{ClaimType, ConstValue, Timestamp, Unit, ValueType};

use crate::error::EngineError;

/// A single typed value: an observation, a resolved feature, or a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::Bool(_) => ValueType::Boolean,
            Scalar::Number(_) => ValueType::Number,
            Scalar::String(_) => ValueType::String,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether a claim of `claim_type` can carry this value.
    pub fn fits(&self, claim_type: ClaimType) -> bool {
        matches!(
            (self, claim_type),
            (Scalar::Bool(_), ClaimType::Boolean)
                | (Scalar::Number(_), ClaimType::Number)
                | (Scalar::String(_), ClaimType::String)
                | (Scalar::String(_), ClaimType::Enum)
        )
    }
}

impl From<&ConstValue> for Scalar {
    fn from(value: &ConstValue) -> Self {
        match value {
            ConstValue::Bool(b) => Scalar::Bool(*b),
            ConstValue::Number(n) => Scalar::Number(*n),
            ConstValue::String(s) => Scalar::String(s.clone()),
        }
    }
}

/// Type-only rendering, for messages that must not leak values.
pub(crate) struct TypeOf<'a>(pub &'a Scalar);

impl fmt::Display for TypeOf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.value_type())
    }
}

/// One raw data point for an input's signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Observation {
    pub timestamp: Timestamp,
    pub value: Scalar,
    /// Unit reported by the source, if it reports one. Checked against the
    /// input's declared unit; never converted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl Observation {
    pub fn new(timestamp: Timestamp, value: Scalar) -> Self {
        Self {
            timestamp,
            value,
            unit: None,
        }
    }

    pub fn number(timestamp: &str, value: f64) -> Result<Self, String> {
        Ok(Self::new(Timestamp::parse(timestamp)?, Scalar::Number(value)))
    }
}

/// Observations for one evaluation, keyed by `InputSpec.id`. Sequence order
/// within an input is significant (it breaks `latest` ties).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservationSet {
    series: BTreeMap<String, Vec<Observation>>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, input: impl Into<String>, observations: Vec<Observation>) {
        self.series.insert(input.into(), observations);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, input: impl Into<String>, observations: Vec<Observation>) -> Self {
        self.insert(input, observations);
        self
    }

    /// Observations for an input; an input with no entry has none.
    pub fn get(&self, input: &str) -> &[Observation] {
        self.series.get(input).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn input_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::Observations(e.to_string()))
    }

    /// Load an observation file: `{ "<inputId>": [{timestamp, value, unit?}] }`.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
