// spec.rs — The private policy document.
//
// A PolicySpec is everything needed to evaluate a policy, including the
// inputs that never appear in the public spec. It is immutable once hashed:
// changing any field changes the policy hash.
//
// Optional fields stay `Option` all the way through (no defaults are written
// back), so serializing a parsed policy reproduces the authored document up
// to key order and number spelling, both of which canonicalization removes.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PolicyError;
use crate::input::InputSpec;
use crate::output::OutputClaimSpec;
use crate::time::Duration;

/// A complete (private) policy definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicySpec {
    pub id: String,
    pub version: SemVer,
    pub metadata: PolicyMetadata,
    pub subject: SubjectSpec,
    /// Ordered; order is part of the hash.
    pub inputs: Vec<InputSpec>,
    /// Ordered; order is part of the hash.
    pub outputs: Vec<OutputClaimSpec>,
    pub validity: ValiditySpec,
    pub disclosure: DisclosureSpec,
}

impl PolicySpec {
    /// Parse a policy from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(text).map_err(|e| PolicyError::Parse {
            format: "json",
            message: e.to_string(),
        })
    }

    /// Parse a policy from YAML text. Produces the same `PolicySpec` (and
    /// hence the same hash) as the equivalent JSON.
    pub fn from_yaml_str(text: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(text).map_err(|e| PolicyError::Parse {
            format: "yaml",
            message: e.to_string(),
        })
    }

    /// Load a policy file, choosing the format by extension
    /// (`.yaml`/`.yml` → YAML, anything else → JSON).
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }
}

/// `MAJOR.MINOR.PATCH`, non-negative integers without leading zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SemVer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(format!("version '{}' must be MAJOR.MINOR.PATCH", s));
        }
        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            let canonical = !part.is_empty()
                && part.chars().all(|c| c.is_ascii_digit())
                && (part.len() == 1 || !part.starts_with('0'));
            if !canonical {
                return Err(format!(
                    "version '{}' has a malformed component '{}'",
                    s, part
                ));
            }
            *slot = part
                .parse()
                .map_err(|_| format!("version '{}' component '{}' is too large", s, part))?;
        }
        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Publishable descriptive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<Reference>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    pub label: String,
    pub url: String,
}

/// What the claims are about.
///
/// `type` is open: "vehicle", "device", "portfolio", "shipment", and "user"
/// are the common values, anything else is kept as written. Same for
/// `idFormat` ("string", "uuid", "did", "vin", "tokenId", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubjectSpec {
    #[serde(rename = "type")]
    pub subject_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_format: Option<String>,
}

/// Freshness and replay expectations for produced claim sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValiditySpec {
    pub ttl: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reusable: Option<bool>,
}

impl ValiditySpec {
    /// Absent means single-use.
    pub fn is_reusable(&self) -> bool {
        self.reusable.unwrap_or(false)
    }
}

/// What a verifier is allowed to learn. Anything not listed stays hidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisclosureSpec {
    pub expose_claims: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_rule_results: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_inputs: Option<bool>,
}

impl DisclosureSpec {
    pub fn exposes_claim(&self, name: &str) -> bool {
        self.expose_claims.iter().any(|c| c == name)
    }

    pub fn exposes_rule_results(&self) -> bool {
        self.expose_rule_results.unwrap_or(false)
    }

    pub fn exposes_inputs(&self) -> bool {
        self.expose_inputs.unwrap_or(false)
    }
}
