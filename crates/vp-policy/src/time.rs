// time.rs — Duration literals and ISO-8601 instants.
//
// Both types keep the exact text they were parsed from and serialize it back
// unchanged. The policy hash is computed over the re-serialized document, so
// "1.5h" must not come back out as "90m" and "2024-01-01T00:00:00.000Z" must
// not come back out as "2024-01-01T00:00:00Z".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Upper bound on any duration: ten thousand 366-day years, in milliseconds.
/// Keeps every duration representable as a `chrono::Duration`.
const MAX_DURATION_MILLIS: u128 = 10_000 * 366 * 86_400_000;

/// A duration literal such as `"15m"`, `"1.5h"`, or `"7d"`.
///
/// Units: `ms`, `s`, `m`, `h`, `d` (86 400 s), `w` (7 d). No calendar
/// semantics: a day is always exactly 24 hours.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Duration {
    raw: String,
    millis: u64,
}

impl Duration {
    /// Parse a duration literal.
    pub fn parse(text: &str) -> Result<Self, String> {
        let (number, unit_millis) = split_unit(text)
            .ok_or_else(|| format!("duration '{}' must end in ms, s, m, h, d, or w", text))?;

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        let well_formed = !int_part.is_empty()
            && int_part.chars().all(|c| c.is_ascii_digit())
            && frac_part.chars().all(|c| c.is_ascii_digit())
            && !(number.contains('.') && frac_part.is_empty())
            && int_part.len() + frac_part.len() <= 18;
        if !well_formed {
            return Err(format!(
                "duration '{}' must be a non-negative decimal followed by a unit",
                text
            ));
        }

        // Exact integer arithmetic: value = (int.frac) × unit, must land on a
        // whole millisecond.
        let scale = 10u128.pow(frac_part.len() as u32);
        let digits: u128 = format!("{}{}", int_part, frac_part)
            .parse()
            .map_err(|_| format!("duration '{}' is out of range", text))?;
        let scaled = digits * unit_millis;
        if scaled % scale != 0 {
            return Err(format!(
                "duration '{}' is not a whole number of milliseconds",
                text
            ));
        }
        let millis = scaled / scale;
        if millis > MAX_DURATION_MILLIS {
            return Err(format!("duration '{}' is out of range", text));
        }

        Ok(Self {
            raw: text.to_string(),
            millis: millis as u64,
        })
    }

    /// Build a duration from a millisecond count; serializes as `"<n>ms"`.
    pub fn from_millis(millis: u64) -> Self {
        Self {
            raw: format!("{}ms", millis),
            millis,
        }
    }

    /// Length in milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    /// The literal as authored.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// Convert to a chrono duration for instant arithmetic.
    pub fn to_chrono(&self) -> chrono::Duration {
        // Bounded by MAX_DURATION_MILLIS, far inside i64.
        chrono::Duration::milliseconds(self.millis as i64)
    }
}

fn split_unit(text: &str) -> Option<(&str, u128)> {
    // "ms" must be checked before "m" and "s".
    const UNITS: &[(&str, u128)] = &[
        ("ms", 1),
        ("s", 1_000),
        ("m", 60_000),
        ("h", 3_600_000),
        ("d", 86_400_000),
        ("w", 604_800_000),
    ];
    UNITS
        .iter()
        .find_map(|(suffix, millis)| text.strip_suffix(suffix).map(|n| (n, *millis)))
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// An ISO-8601 / RFC 3339 instant, kept alongside its authored text.
#[derive(Debug, Clone)]
pub struct Timestamp {
    raw: String,
    instant: DateTime<Utc>,
}

impl Timestamp {
    /// Parse an RFC 3339 timestamp (`2024-03-01T12:00:00Z`, offsets allowed).
    pub fn parse(text: &str) -> Result<Self, String> {
        let instant = DateTime::parse_from_rfc3339(text)
            .map_err(|e| format!("timestamp '{}' is not RFC 3339: {}", text, e))?
            .with_timezone(&Utc);
        Ok(Self {
            raw: text.to_string(),
            instant,
        })
    }

    /// The parsed instant, normalized to UTC.
    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Equality follows the authored text: two spellings of the same instant are
/// different documents and hash differently.
impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Timestamp {}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(Duration::parse("250ms").unwrap().as_millis(), 250);
        assert_eq!(Duration::parse("30s").unwrap().as_millis(), 30_000);
        assert_eq!(Duration::parse("15m").unwrap().as_millis(), 900_000);
        assert_eq!(Duration::parse("2h").unwrap().as_millis(), 7_200_000);
        assert_eq!(Duration::parse("1d").unwrap().as_millis(), 86_400_000);
        assert_eq!(Duration::parse("1w").unwrap().as_millis(), 604_800_000);
    }

    #[test]
    fn fractional_values_must_land_on_whole_milliseconds() {
        assert_eq!(Duration::parse("1.5h").unwrap().as_millis(), 5_400_000);
        assert_eq!(Duration::parse("0.001s").unwrap().as_millis(), 1);
        assert!(Duration::parse("0.0001s").is_err());
        assert!(Duration::parse("1.5ms").is_err());
    }

    #[test]
    fn rejects_malformed_literals() {
        for bad in ["", "10", "h", "-5m", "1e3s", "1.s", ".5s", "5 m", "5y", "3.2.1s"] {
            assert!(Duration::parse(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn keeps_authored_text() {
        let d: Duration = serde_json::from_str("\"1.5h\"").unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"1.5h\"");
        assert_ne!(d, Duration::parse("90m").unwrap());
    }

    #[test]
    fn from_millis_round_trips_through_text() {
        let d = Duration::from_millis(1500);
        assert_eq!(d.as_str(), "1500ms");
        assert_eq!(Duration::parse(d.as_str()).unwrap(), d);
    }

    #[test]
    fn timestamp_keeps_authored_text_and_normalizes_instant() {
        let a = Timestamp::parse("2024-03-01T12:00:00+02:00").unwrap();
        let b = Timestamp::parse("2024-03-01T10:00:00Z").unwrap();
        assert_eq!(a.instant(), b.instant());
        assert_ne!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            "\"2024-03-01T12:00:00+02:00\""
        );
    }

    #[test]
    fn timestamp_rejects_non_rfc3339() {
        assert!(Timestamp::parse("yesterday").is_err());
        assert!(Timestamp::parse("2024-03-01").is_err());
    }
}
