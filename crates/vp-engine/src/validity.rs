// validity.rs — Freshness and replay metadata stamped onto claim sets.
//
// The engine only stamps these bounds. Rejecting stale observations or a
// second presentation of a single-use claim set is the verifier's job; the
// helpers below are what a verifier would check.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use vp_policy::{Duration, ValiditySpec};

/// Validity bounds of one issued claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityStamp {
    #[serde(with = "rfc3339_millis")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "rfc3339_millis")]
    pub expires_at: DateTime<Utc>,
    /// As authored in the policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
    /// `issuedAt - maxAge`: observations older than this must be refused.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rfc3339_millis_opt"
    )]
    pub not_before: Option<DateTime<Utc>>,
    pub reusable: bool,
}

impl ValidityStamp {
    /// `issuedAt = evaluation instant`, `expiresAt = issuedAt + ttl`.
    pub fn stamp(spec: &ValiditySpec, issued_at: DateTime<Utc>) -> Self {
        let issued_at = truncate_to_millis(issued_at);
        let expires_at = issued_at
            .checked_add_signed(spec.ttl.to_chrono())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let not_before = spec.max_age.as_ref().map(|age| {
            issued_at
                .checked_sub_signed(age.to_chrono())
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        Self {
            issued_at,
            expires_at,
            max_age: spec.max_age.clone(),
            not_before,
            reusable: spec.is_reusable(),
        }
    }

    /// Whether the claim set is within `[issuedAt, expiresAt)` at `t`.
    pub fn is_fresh_at(&self, t: DateTime<Utc>) -> bool {
        self.issued_at <= t && t < self.expires_at
    }

    /// Whether an observation taken at `t` is recent enough under `maxAge`.
    /// Always true when the policy sets no `maxAge`.
    pub fn admits_observation(&self, t: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |nb| t >= nb)
    }
}

/// Claim sets carry millisecond precision, so the stamp must too or the
/// serialized form would not round-trip.
fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

mod rfc3339_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

mod rfc3339_millis_opt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => super::rfc3339_millis::serialize(t, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
