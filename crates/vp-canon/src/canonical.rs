// canonical.rs — RFC 8785 (JSON Canonicalization Scheme) serializer.
//
// Produces the unique byte encoding of a JSON value tree:
//
// - object members sorted by the UTF-16 code units of their keys
// - numbers in ECMAScript `Number.prototype.toString` form
// - strings with only the escapes JSON requires
// - no whitespace between tokens
//
// Two structurally equal trees always produce identical bytes, whatever
// order their keys were inserted in. The policy hash is computed over this
// output, so any change here invalidates every hash ever issued.

use std::fmt;

use serde::ser::{self, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::CanonError;

/// Largest integer an IEEE-754 double represents exactly (2^53 - 1).
/// Integers inside this range are written digit-for-digit.
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Canonicalize a JSON value tree into RFC 8785 bytes.
///
/// `serde_json::Value` cannot hold NaN or infinities, so for a tree that
/// came from parsing this never fails. Typed values should go through
/// [`to_canonical_bytes`], which rejects non-finite floats before they can be
/// silently turned into `null`.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CanonError> {
    let mut out = Vec::with_capacity(256);
    let mut path = String::from("$");
    write_value(value, &mut path, &mut out)?;
    Ok(out)
}

/// Canonicalize any serializable value.
///
/// Walks the value once to reject NaN/Infinity (serde_json would otherwise
/// encode them as `null`), then converts to a `Value` tree and canonicalizes.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonError> {
    ensure_finite(value)?;
    let tree =
        serde_json::to_value(value).map_err(|e| CanonError::Unrepresentable(e.to_string()))?;
    canonicalize(&tree)
}

/// Format a finite double the way ECMAScript's `Number.prototype.toString` does.
///
/// Rust's `{:e}` formatting already yields the shortest round-trippable
/// digit string; this function only decides where the decimal point goes
/// and whether an exponent is needed.
pub fn format_number(value: f64) -> Result<String, CanonError> {
    if !value.is_finite() {
        return Err(CanonError::NonFiniteNumber {
            path: "$".to_string(),
            value,
        });
    }
    // Covers negative zero as well.
    if value == 0.0 {
        return Ok("0".to_string());
    }
    if value < 0.0 {
        return Ok(format!("-{}", format_number(-value)?));
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .ok_or_else(|| CanonError::Unrepresentable(scientific.clone()))?;
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| CanonError::Unrepresentable(scientific.clone()))?;
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    // value = 0.digits × 10^n, in the notation of ECMA-262 §6.1.6.1.20.
    let k = digits.len() as i32;
    let n = exponent + 1;

    let formatted = if k <= n && n <= 21 {
        format!("{}{}", digits, "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int_part, frac_part) = digits.split_at(n as usize);
        format!("{}.{}", int_part, frac_part)
    } else if -6 < n && n <= 0 {
        format!("0.{}{}", "0".repeat((-n) as usize), digits)
    } else {
        let e = n - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (lead, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", lead, sign, e.abs())
        } else {
            format!("{}.{}e{}{}", lead, rest, sign, e.abs())
        }
    };
    Ok(formatted)
}

fn write_value(value: &Value, path: &mut String, out: &mut Vec<u8>) -> Result<(), CanonError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, path, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                let mark = path.len();
                path.push_str(&format!("[{}]", i));
                write_value(item, path, out)?;
                path.truncate(mark);
            }
            out.push(b']');
        }
        Value::Object(map) => write_object(map, path, out)?,
    }
    Ok(())
}

fn write_object(
    map: &Map<String, Value>,
    path: &mut String,
    out: &mut Vec<u8>,
) -> Result<(), CanonError> {
    // serde_json's default map orders keys by UTF-8 bytes (code points),
    // which disagrees with UTF-16 order once astral characters appear.
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.encode_utf16().cmp(b.0.encode_utf16()));

    out.push(b'{');
    for (i, (key, member)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_string(key, out);
        out.push(b':');
        let mark = path.len();
        path.push('.');
        path.push_str(key);
        write_value(member, path, out)?;
        path.truncate(mark);
    }
    out.push(b'}');
    Ok(())
}

fn write_number(n: &Number, path: &str, out: &mut Vec<u8>) -> Result<(), CanonError> {
    if let Some(i) = n.as_i64() {
        if i.unsigned_abs() <= MAX_SAFE_INTEGER {
            out.extend_from_slice(i.to_string().as_bytes());
            return Ok(());
        }
    }
    if let Some(u) = n.as_u64() {
        if u <= MAX_SAFE_INTEGER {
            out.extend_from_slice(u.to_string().as_bytes());
            return Ok(());
        }
    }
    // Outside the safe range integers are read as doubles, same as any
    // other JCS implementation would.
    let f = n
        .as_f64()
        .ok_or_else(|| CanonError::Unrepresentable(format!("number {} at {}", n, path)))?;
    let formatted = format_number(f).map_err(|err| match err {
        CanonError::NonFiniteNumber { value, .. } => CanonError::NonFiniteNumber {
            path: path.to_string(),
            value,
        },
        other => other,
    })?;
    out.extend_from_slice(formatted.as_bytes());
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0C}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

// ---------------------------------------------------------------------------
// Non-finite float probe
// ---------------------------------------------------------------------------

/// Reject NaN and infinities anywhere inside a serializable value.
///
/// The error names the offending field path (`$.outputs[2].derive.bands[0].minInclusive`).
pub fn ensure_finite<T: Serialize + ?Sized>(value: &T) -> Result<(), CanonError> {
    value
        .serialize(FiniteProbe {
            path: "$".to_string(),
        })
        .map_err(|err| match err {
            ProbeError::NonFinite { path, value } => CanonError::NonFiniteNumber { path, value },
            ProbeError::Custom(msg) => CanonError::Unrepresentable(msg),
        })
}

#[derive(Debug)]
enum ProbeError {
    NonFinite { path: String, value: f64 },
    Custom(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::NonFinite { path, value } => write!(f, "non-finite {} at {}", value, path),
            ProbeError::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ProbeError {}

impl ser::Error for ProbeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ProbeError::Custom(msg.to_string())
    }
}

/// A serializer that produces nothing and only inspects floats.
struct FiniteProbe {
    path: String,
}

/// Shared state for every compound form: the parent path, a running index,
/// and the last map key seen.
struct ProbeCompound {
    path: String,
    index: usize,
    key: Option<String>,
}

impl ProbeCompound {
    fn next_indexed(&mut self) -> FiniteProbe {
        let path = format!("{}[{}]", self.path, self.index);
        self.index += 1;
        FiniteProbe { path }
    }

    fn named(&self, key: &str) -> FiniteProbe {
        FiniteProbe {
            path: format!("{}.{}", self.path, key),
        }
    }
}

impl ser::Serializer for FiniteProbe {
    type Ok = ();
    type Error = ProbeError;
    type SerializeSeq = ProbeCompound;
    type SerializeTuple = ProbeCompound;
    type SerializeTupleStruct = ProbeCompound;
    type SerializeTupleVariant = ProbeCompound;
    type SerializeMap = ProbeCompound;
    type SerializeStruct = ProbeCompound;
    type SerializeStructVariant = ProbeCompound;

    fn serialize_bool(self, _v: bool) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i8(self, _v: i8) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i16(self, _v: i16) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i32(self, _v: i32) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_i64(self, _v: i64) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u8(self, _v: u8) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u16(self, _v: u16) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u32(self, _v: u32) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_u64(self, _v: u64) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Result<(), ProbeError> {
        self.serialize_f64(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), ProbeError> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(ProbeError::NonFinite {
                path: self.path,
                value: v,
            })
        }
    }
    fn serialize_char(self, _v: char) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_str(self, _v: &str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_bytes(self, _v: &[u8]) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), ProbeError> {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        value.serialize(FiniteProbe {
            path: format!("{}.{}", self.path, variant),
        })
    }
    fn serialize_seq(self, _len: Option<usize>) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
    fn serialize_tuple(self, _len: usize) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<ProbeCompound, ProbeError> {
        Ok(self.compound())
    }
}

impl FiniteProbe {
    fn compound(self) -> ProbeCompound {
        ProbeCompound {
            path: self.path,
            index: 0,
            key: None,
        }
    }
}

impl ser::SerializeSeq for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self.next_indexed())
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl ser::SerializeTuple for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self.next_indexed())
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self.next_indexed())
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        value.serialize(self.next_indexed())
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl ser::SerializeMap for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), ProbeError> {
        self.key = match serde_json::to_value(key) {
            Ok(Value::String(name)) => Some(name),
            Ok(other) => Some(other.to_string()),
            Err(_) => None,
        };
        Ok(())
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), ProbeError> {
        // Keys that do not serialize on their own fall back to position.
        match self.key.take() {
            Some(key) => value.serialize(self.named(&key)),
            None => value.serialize(self.next_indexed()),
        }
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl ser::SerializeStruct for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        value.serialize(self.named(key))
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for ProbeCompound {
    type Ok = ();
    type Error = ProbeError;
    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), ProbeError> {
        value.serialize(self.named(key))
    }
    fn end(self) -> Result<(), ProbeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    fn canon(value: &Value) -> String {
        String::from_utf8(canonicalize(value).unwrap()).unwrap()
    }

    #[test]
    fn key_insertion_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"z":1,"a":{"y":true,"b":null},"m":[3,2,1]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"m":[3,2,1],"a":{"b":null,"y":true},"z":1}"#).unwrap();
        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
        assert_eq!(canon(&a), r#"{"a":{"b":null,"y":true},"m":[3,2,1],"z":1}"#);
    }

    #[test]
    fn array_order_is_preserved() {
        assert_ne!(canon(&json!([1, 2])), canon(&json!([2, 1])));
    }

    #[test]
    fn keys_sort_by_utf16_code_units() {
        // Key set from RFC 8785 §3.2.3. U+1F600 is a surrogate pair (D83D DE00)
        // and sorts before U+FB33, unlike code point order.
        let value: Value = serde_json::from_str(
            r#"{"€":"Euro Sign","\r":"Carriage Return","דּ":"Hebrew Letter Dalet With Dagesh","1":"One","😀":"Emoji: Grinning Face","\u0080":"Control","ö":"Latin Small Letter O With Diaeresis"}"#,
        )
        .unwrap();
        let out = canon(&value);
        let order: Vec<usize> = [
            "Carriage Return",
            "One",
            "Control",
            "Latin Small",
            "Euro Sign",
            "Emoji",
            "Hebrew",
        ]
        .iter()
        .map(|needle| out.find(needle).unwrap())
        .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted, "unexpected member order in {}", out);
    }

    #[test]
    fn rfc8785_number_samples() {
        let value: Value = serde_json::from_str(
            r#"[333333333.33333329, 1E30, 4.50, 2e-3, 0.000000000000000000000000001]"#,
        )
        .unwrap();
        assert_eq!(
            canon(&value),
            "[333333333.3333333,1e+30,4.5,0.002,1e-27]"
        );
    }

    #[test]
    fn number_formatting_edges() {
        assert_eq!(format_number(0.0).unwrap(), "0");
        assert_eq!(format_number(-0.0).unwrap(), "0");
        assert_eq!(format_number(80.0).unwrap(), "80");
        assert_eq!(format_number(-1.5).unwrap(), "-1.5");
        assert_eq!(format_number(1e21).unwrap(), "1e+21");
        assert_eq!(format_number(1e20).unwrap(), "100000000000000000000");
        assert_eq!(format_number(0.000001).unwrap(), "0.000001");
        assert_eq!(format_number(0.0000001).unwrap(), "1e-7");
        assert_eq!(format_number(1.25e-8).unwrap(), "1.25e-8");
        assert_eq!(format_number(123.456).unwrap(), "123.456");
    }

    #[test]
    fn integers_outside_safe_range_follow_double_rules() {
        assert_eq!(canon(&json!(9_007_199_254_740_991u64)), "9007199254740991");
        assert_eq!(canon(&json!(-42)), "-42");
        // 2^63 is not exact as written but is exact as a double.
        assert_eq!(canon(&json!(9_223_372_036_854_775_808u64)), "9223372036854776000");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(matches!(
            format_number(f64::NAN),
            Err(CanonError::NonFiniteNumber { .. })
        ));
        assert!(matches!(
            format_number(f64::INFINITY),
            Err(CanonError::NonFiniteNumber { .. })
        ));
    }

    #[test]
    fn typed_values_with_nan_fail_with_path() {
        #[derive(Serialize)]
        struct Band {
            label: &'static str,
            bounds: Vec<f64>,
        }
        let band = Band {
            label: "A",
            bounds: vec![1.0, f64::NAN],
        };
        match to_canonical_bytes(&band) {
            Err(CanonError::NonFiniteNumber { path, .. }) => assert_eq!(path, "$.bounds[1]"),
            other => panic!("expected NonFiniteNumber, got {:?}", other),
        }
    }

    #[test]
    fn map_and_flattened_members_report_their_key() {
        #[derive(Serialize)]
        struct Window {
            lower: f64,
        }
        #[derive(Serialize)]
        struct Stamp {
            label: &'static str,
            #[serde(flatten)]
            window: Window,
        }
        let stamp = Stamp {
            label: "A",
            window: Window { lower: f64::NAN },
        };
        match to_canonical_bytes(&stamp) {
            Err(CanonError::NonFiniteNumber { path, .. }) => assert_eq!(path, "$.lower"),
            other => panic!("expected NonFiniteNumber, got {:?}", other),
        }

        let scores = std::collections::BTreeMap::from([
            ("a".to_string(), vec![1.0]),
            ("b".to_string(), vec![2.0, f64::INFINITY]),
        ]);
        match to_canonical_bytes(&scores) {
            Err(CanonError::NonFiniteNumber { path, .. }) => assert_eq!(path, "$.b[1]"),
            other => panic!("expected NonFiniteNumber, got {:?}", other),
        }
    }

    #[test]
    fn string_escaping_is_minimal() {
        let value = json!("€$\u{000f}\nA'B\"\\\\\"/");
        assert_eq!(canon(&value), "\"€$\\u000f\\nA'B\\\"\\\\\\\\\\\"/\"");
        assert_eq!(canon(&json!("\u{2028}")), "\"\u{2028}\"");
    }

    #[test]
    fn canonical_output_reparses_to_the_same_value() {
        let original = json!({
            "id": "credit-band",
            "bands": [{"label": "A", "minInclusive": 80, "maxExclusive": 101.5}],
            "nested": {"ß": [true, false, null], "a b": "x\ty"}
        });
        let bytes = canonicalize(&original).unwrap();
        let reparsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn no_whitespace_between_tokens() {
        let out = canon(&json!({"a": [1, {"b": 2}], "c": "d e"}));
        assert_eq!(out, r#"{"a":[1,{"b":2}],"c":"d e"}"#);
    }
}
