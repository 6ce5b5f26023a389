//! Field values and tier codecs.
//!
//! A field value has three representations: the in-memory form callers see
//! (`FieldValue`), the shared-cache wire form (a UTF-8 string), and the
//! authoritative wire form (a native BSON value). Codecs are pure paired
//! functions between the in-memory form and one wire form; they run only at
//! tier boundaries, never inside the local cache.
//!
//! For every codec pair, `decode(encode(x)) == x` must hold for any value
//! the field may legitimately take.

use bson::Bson;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::identity::Identity;

/// Literal used for the in-memory null on the shared-cache wire, so an
/// absent key and a cached null stay distinguishable.
const NULL_WIRE: &str = "null";

/// Conversion failure raised by a tier codec
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The in-memory value has a kind the codec does not handle
    #[error("unexpected value kind: expected {expected}, got {got}")]
    Kind {
        /// Kind the codec expected
        expected: &'static str,
        /// Kind it was given
        got: String,
    },

    /// The wire form could not be decoded
    #[error("malformed wire value `{value}`: {message}")]
    Malformed {
        /// Offending wire value (truncated for display)
        value: String,
        /// Decode failure detail
        message: String,
    },
}

/// Result type for codec operations
pub type ConvertResult<T> = std::result::Result<T, ConvertError>;

fn malformed(value: &str, message: impl Into<String>) -> ConvertError {
    let mut value = value.to_string();
    if value.len() > 64 {
        value.truncate(64);
    }
    ConvertError::Malformed {
        value,
        message: message.into(),
    }
}

/// In-memory representation of a field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Explicit null (distinct from an absent field)
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// UTC timestamp with millisecond resolution
    DateTime(DateTime<Utc>),
    /// Reference to another row
    Id(Identity),
}

impl FieldValue {
    /// Human-readable kind name, used in codec errors
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Id(_) => "id",
        }
    }

    /// Borrow as a string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a boolean, if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer, if this is an integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a timestamp, if this is a datetime value
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Extract an identity, if this is a row reference
    pub fn as_id(&self) -> Option<Identity> {
        match self {
            FieldValue::Id(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        FieldValue::DateTime(dt)
    }
}

impl From<Identity> for FieldValue {
    fn from(id: Identity) -> Self {
        FieldValue::Id(id)
    }
}

/// Paired codec between the in-memory form and the shared-cache wire string
#[derive(Clone, Copy)]
pub struct SharedCodec {
    encode: fn(&FieldValue) -> ConvertResult<String>,
    decode: fn(&str) -> ConvertResult<FieldValue>,
}

impl SharedCodec {
    /// Encode an in-memory value to its shared-cache wire string
    pub fn encode(&self, value: &FieldValue) -> ConvertResult<String> {
        (self.encode)(value)
    }

    /// Decode a shared-cache wire string back to the in-memory form
    pub fn decode(&self, wire: &str) -> ConvertResult<FieldValue> {
        (self.decode)(wire)
    }

    /// Identity codec for string fields.
    ///
    /// The in-memory null is encoded as the literal `"null"`; a string field
    /// whose legal values include that literal must opt out of shared
    /// caching instead of using this codec.
    pub fn string() -> Self {
        Self {
            encode: |v| match v {
                FieldValue::Null => Ok(NULL_WIRE.to_string()),
                FieldValue::String(s) => Ok(s.clone()),
                other => Err(ConvertError::Kind {
                    expected: "string",
                    got: other.kind().to_string(),
                }),
            },
            decode: |w| {
                if w == NULL_WIRE {
                    Ok(FieldValue::Null)
                } else {
                    Ok(FieldValue::String(w.to_string()))
                }
            },
        }
    }

    /// Boolean codec: `"1"` / `"0"` on the wire
    pub fn boolean() -> Self {
        Self {
            encode: |v| match v {
                FieldValue::Null => Ok(NULL_WIRE.to_string()),
                FieldValue::Bool(true) => Ok("1".to_string()),
                FieldValue::Bool(false) => Ok("0".to_string()),
                other => Err(ConvertError::Kind {
                    expected: "bool",
                    got: other.kind().to_string(),
                }),
            },
            decode: |w| match w {
                NULL_WIRE => Ok(FieldValue::Null),
                "1" => Ok(FieldValue::Bool(true)),
                "0" => Ok(FieldValue::Bool(false)),
                other => Err(malformed(other, "expected \"1\" or \"0\"")),
            },
        }
    }

    /// Integer codec: decimal string on the wire
    pub fn integer() -> Self {
        Self {
            encode: |v| match v {
                FieldValue::Null => Ok(NULL_WIRE.to_string()),
                FieldValue::Int(i) => Ok(i.to_string()),
                other => Err(ConvertError::Kind {
                    expected: "int",
                    got: other.kind().to_string(),
                }),
            },
            decode: |w| {
                if w == NULL_WIRE {
                    return Ok(FieldValue::Null);
                }
                w.parse::<i64>()
                    .map(FieldValue::Int)
                    .map_err(|e| malformed(w, e.to_string()))
            },
        }
    }

    /// Timestamp codec: ISO-8601 with millisecond resolution on the wire
    pub fn datetime() -> Self {
        Self {
            encode: |v| match v {
                FieldValue::Null => Ok(NULL_WIRE.to_string()),
                FieldValue::DateTime(dt) => {
                    Ok(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
                }
                other => Err(ConvertError::Kind {
                    expected: "datetime",
                    got: other.kind().to_string(),
                }),
            },
            decode: |w| {
                if w == NULL_WIRE {
                    return Ok(FieldValue::Null);
                }
                DateTime::parse_from_rfc3339(w)
                    .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|e| malformed(w, e.to_string()))
            },
        }
    }

    /// Row-reference codec: 24-char hex identity on the wire
    pub fn identity_hex() -> Self {
        Self {
            encode: |v| match v {
                FieldValue::Null => Ok(NULL_WIRE.to_string()),
                FieldValue::Id(id) => Ok(id.to_hex()),
                other => Err(ConvertError::Kind {
                    expected: "id",
                    got: other.kind().to_string(),
                }),
            },
            decode: |w| {
                if w == NULL_WIRE {
                    return Ok(FieldValue::Null);
                }
                Identity::parse(w)
                    .map(FieldValue::Id)
                    .map_err(|e| malformed(w, e.to_string()))
            },
        }
    }
}

impl std::fmt::Debug for SharedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedCodec")
    }
}

/// Paired codec between the in-memory form and the authoritative wire (BSON)
#[derive(Clone, Copy)]
pub struct StoreCodec {
    encode: fn(&FieldValue) -> ConvertResult<Bson>,
    decode: fn(&Bson) -> ConvertResult<FieldValue>,
}

impl StoreCodec {
    /// Encode an in-memory value to its BSON form
    pub fn encode(&self, value: &FieldValue) -> ConvertResult<Bson> {
        (self.encode)(value)
    }

    /// Decode a BSON value back to the in-memory form
    pub fn decode(&self, wire: &Bson) -> ConvertResult<FieldValue> {
        (self.decode)(wire)
    }

    /// Natural BSON mapping: booleans and dates are stored natively,
    /// integers widen to 64 bits, identities stay ObjectIds.
    pub fn native() -> Self {
        Self {
            encode: |v| {
                Ok(match v {
                    FieldValue::Null => Bson::Null,
                    FieldValue::Bool(b) => Bson::Boolean(*b),
                    FieldValue::Int(i) => Bson::Int64(*i),
                    FieldValue::Double(d) => Bson::Double(*d),
                    FieldValue::String(s) => Bson::String(s.clone()),
                    FieldValue::DateTime(dt) => {
                        Bson::DateTime(bson::DateTime::from_chrono(*dt))
                    }
                    FieldValue::Id(id) => id.to_bson(),
                })
            },
            decode: |b| match b {
                Bson::Null => Ok(FieldValue::Null),
                Bson::Boolean(v) => Ok(FieldValue::Bool(*v)),
                Bson::Int32(v) => Ok(FieldValue::Int(i64::from(*v))),
                Bson::Int64(v) => Ok(FieldValue::Int(*v)),
                Bson::Double(v) => Ok(FieldValue::Double(*v)),
                Bson::String(v) => Ok(FieldValue::String(v.clone())),
                Bson::DateTime(v) => Ok(FieldValue::DateTime(v.to_chrono())),
                Bson::ObjectId(v) => Ok(FieldValue::Id(Identity::from(*v))),
                other => Err(ConvertError::Kind {
                    expected: "scalar BSON value",
                    got: format!("{:?}", other.element_type()),
                }),
            },
        }
    }
}

impl std::fmt::Debug for StoreCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreCodec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_boolean_wire_form() {
        let codec = SharedCodec::boolean();
        assert_eq!(codec.encode(&FieldValue::Bool(true)).unwrap(), "1");
        assert_eq!(codec.encode(&FieldValue::Bool(false)).unwrap(), "0");
        assert_eq!(codec.decode("1").unwrap(), FieldValue::Bool(true));
        assert!(codec.decode("yes").is_err());
    }

    #[test]
    fn test_datetime_iso8601_millis() {
        let codec = SharedCodec::datetime();
        let dt = Utc.with_ymd_and_hms(2024, 3, 7, 12, 30, 5).unwrap()
            + chrono::Duration::milliseconds(250);
        let wire = codec.encode(&FieldValue::DateTime(dt)).unwrap();
        assert_eq!(wire, "2024-03-07T12:30:05.250Z");
        assert_eq!(codec.decode(&wire).unwrap(), FieldValue::DateTime(dt));
    }

    #[test]
    fn test_null_is_distinct_on_the_wire() {
        for codec in [
            SharedCodec::string(),
            SharedCodec::boolean(),
            SharedCodec::integer(),
            SharedCodec::datetime(),
            SharedCodec::identity_hex(),
        ] {
            let wire = codec.encode(&FieldValue::Null).unwrap();
            assert_eq!(wire, "null");
            assert_eq!(codec.decode(&wire).unwrap(), FieldValue::Null);
        }
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let codec = SharedCodec::integer();
        let err = codec.encode(&FieldValue::Bool(true)).unwrap_err();
        assert!(err.to_string().contains("expected int"));
    }

    #[test]
    fn test_store_codec_native_round_trip() {
        let codec = StoreCodec::native();
        let id = Identity::new();
        let values = [
            FieldValue::Null,
            FieldValue::Bool(true),
            FieldValue::Int(-42),
            FieldValue::String("Arena".to_string()),
            FieldValue::Id(id),
        ];
        for value in values {
            let wire = codec.encode(&value).unwrap();
            assert_eq!(codec.decode(&wire).unwrap(), value);
        }
    }

    #[test]
    fn test_store_codec_widens_int32() {
        let codec = StoreCodec::native();
        assert_eq!(
            codec.decode(&Bson::Int32(7)).unwrap(),
            FieldValue::Int(7)
        );
    }
}
