use crate::value::{parse_timestamp, Value};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shardline_error::{ErrorCode, ShardlineError};
use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// How a column's value is carried between the field and the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Scalar assigned directly.
    Plain,
    /// Datetime; a database NULL leaves the field untouched.
    Timestamp,
    /// Structured value stored as compact JSON text or through a codec.
    Opaque,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("cannot read {found} value into {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} does not fit into {expected}")]
    OutOfRange { expected: &'static str, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("NULL read into a not-null column")]
    NullViolation,
}

impl From<ConversionError> for ShardlineError {
    fn from(err: ConversionError) -> Self {
        let code = match &err {
            ConversionError::TypeMismatch { .. } | ConversionError::OutOfRange { .. } => {
                ErrorCode::TypeMismatch
            }
            ConversionError::Json(_) | ConversionError::Codec(_) => {
                ErrorCode::SerializationFailed
            }
            ConversionError::NullViolation => ErrorCode::NullViolation,
        };
        ShardlineError::new(code, err.to_string())
    }
}

pub type ConversionResult<T> = std::result::Result<T, ConversionError>;

fn mismatch<T>(expected: &'static str, found: &Value) -> ConversionResult<T> {
    Err(ConversionError::TypeMismatch {
        expected,
        found: found.type_name(),
    })
}

/// A field type that can be stored in a column.
pub trait FieldValue: Sized + Send + Sync + 'static {
    const ENCODING: Encoding = Encoding::Plain;

    fn to_value(&self) -> ConversionResult<Value>;

    fn from_value(value: Value) -> ConversionResult<Self>;

    /// What a database NULL assigns. `None` leaves the field as it was.
    fn null() -> Option<Self> {
        None
    }
}

macro_rules! impl_int_field {
    ($($t:ty),*) => {
        $(impl FieldValue for $t {
            fn to_value(&self) -> ConversionResult<Value> {
                Ok(Value::from(*self))
            }

            fn from_value(value: Value) -> ConversionResult<Self> {
                let n = match value.as_i64() {
                    Some(n) => n,
                    None => return mismatch(stringify!($t), &value),
                };
                <$t>::try_from(n).map_err(|_| ConversionError::OutOfRange {
                    expected: stringify!($t),
                    value: n.to_string(),
                })
            }

            fn null() -> Option<Self> {
                Some(0)
            }
        })*
    };
}

impl_int_field!(i8, i16, i32, i64, u8, u16, u32);

impl FieldValue for u64 {
    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::UInt(*self))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match value.as_u64() {
            Some(n) => Ok(n),
            None => mismatch("u64", &value),
        }
    }

    fn null() -> Option<Self> {
        Some(0)
    }
}

macro_rules! impl_float_field {
    ($($t:ty),*) => {
        $(impl FieldValue for $t {
            fn to_value(&self) -> ConversionResult<Value> {
                Ok(Value::Float(*self as f64))
            }

            fn from_value(value: Value) -> ConversionResult<Self> {
                match value.as_f64() {
                    Some(f) => Ok(f as $t),
                    None => mismatch(stringify!($t), &value),
                }
            }

            fn null() -> Option<Self> {
                Some(0.0)
            }
        })*
    };
}

impl_float_field!(f32, f64);

impl FieldValue for bool {
    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match &value {
            Value::Bool(b) => Ok(*b),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => match other.as_i64() {
                Some(n) => Ok(n != 0),
                None => mismatch("bool", &value),
            },
        }
    }

    fn null() -> Option<Self> {
        Some(false)
    }
}

impl FieldValue for String {
    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::Text(self.clone()))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b).map_err(|_| ConversionError::TypeMismatch {
                expected: "String",
                found: "non-UTF-8 bytes",
            }),
            Value::Int(_) | Value::UInt(_) | Value::Float(_) | Value::Timestamp(_) => {
                Ok(value.to_string())
            }
            other => mismatch("String", &other),
        }
    }

    fn null() -> Option<Self> {
        Some(String::new())
    }
}

impl FieldValue for Vec<u8> {
    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::Bytes(self.clone()))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => mismatch("Vec<u8>", &other),
        }
    }

    fn null() -> Option<Self> {
        Some(Vec::new())
    }
}

impl FieldValue for NaiveDateTime {
    const ENCODING: Encoding = Encoding::Timestamp;

    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::Timestamp(*self))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match &value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Text(s) => parse_timestamp(s).map_or_else(|| mismatch("timestamp", &value), Ok),
            Value::Int(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|dt| dt.naive_utc())
                .map_or_else(|| mismatch("timestamp", &value), Ok),
            _ => mismatch("timestamp", &value),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    const ENCODING: Encoding = Encoding::Timestamp;

    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::Timestamp(self.naive_utc()))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        NaiveDateTime::from_value(value).map(|ts| ts.and_utc())
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const ENCODING: Encoding = T::ENCODING;

    fn to_value(&self) -> ConversionResult<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn null() -> Option<Self> {
        Some(None)
    }
}

// Decoding always allocates a fresh box.
impl<T: FieldValue> FieldValue for Box<T> {
    const ENCODING: Encoding = T::ENCODING;

    fn to_value(&self) -> ConversionResult<Value> {
        self.as_ref().to_value()
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        T::from_value(value).map(Box::new)
    }

    fn null() -> Option<Self> {
        T::null().map(Box::new)
    }
}

/// Structured field stored as compact JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> FieldValue for Json<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    const ENCODING: Encoding = Encoding::Opaque;

    fn to_value(&self) -> ConversionResult<Value> {
        Ok(Value::Text(serde_json::to_string(&self.0)?))
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        match value {
            Value::Text(s) => Ok(Json(serde_json::from_str(&s)?)),
            Value::Bytes(b) => Ok(Json(serde_json::from_slice(&b)?)),
            other => mismatch("JSON text", &other),
        }
    }
}

/// Entity-supplied storage routine for opaque columns.
pub trait StorageCodec: Sized {
    fn encode(&self) -> Result<Vec<u8>, String>;

    fn decode(bytes: &[u8]) -> Result<Self, String>;
}

/// Structured field stored through its own [`StorageCodec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Codec<T>(pub T);

impl<T> Deref for Codec<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Codec<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> FieldValue for Codec<T>
where
    T: StorageCodec + Send + Sync + 'static,
{
    const ENCODING: Encoding = Encoding::Opaque;

    fn to_value(&self) -> ConversionResult<Value> {
        self.0
            .encode()
            .map(Value::Bytes)
            .map_err(ConversionError::Codec)
    }

    fn from_value(value: Value) -> ConversionResult<Self> {
        let decoded = match &value {
            Value::Bytes(b) => T::decode(b),
            Value::Text(s) => T::decode(s.as_bytes()),
            other => return mismatch("encoded bytes", other),
        };
        decoded.map(Codec).map_err(ConversionError::Codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
        zip: u32,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl StorageCodec for Point {
        fn encode(&self) -> Result<Vec<u8>, String> {
            Ok(format!("{}:{}", self.x, self.y).into_bytes())
        }

        fn decode(bytes: &[u8]) -> Result<Self, String> {
            let s = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            let (x, y) = s.split_once(':').ok_or("missing ':'")?;
            Ok(Point {
                x: x.parse().map_err(|_| "bad x")?,
                y: y.parse().map_err(|_| "bad y")?,
            })
        }
    }

    #[test]
    fn test_integer_range_checked() {
        assert_eq!(i8::from_value(Value::Int(12)).unwrap(), 12);
        assert!(matches!(
            i8::from_value(Value::Int(300)),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert!(matches!(
            i32::from_value(Value::Text("abc".into())),
            Err(ConversionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_json_is_compact() {
        let value = Json(Address {
            city: "Oslo".into(),
            zip: 150,
        })
        .to_value()
        .unwrap();
        assert_eq!(value, Value::Text(r#"{"city":"Oslo","zip":150}"#.into()));

        let back = Json::<Address>::from_value(value).unwrap();
        assert_eq!(back.city, "Oslo");
    }

    #[test]
    fn test_codec_decode_routine() {
        let p = Codec::<Point>::from_value(Value::Bytes(b"3:4".to_vec())).unwrap();
        assert_eq!(p.0, Point { x: 3, y: 4 });
        assert!(Codec::<Point>::from_value(Value::Text("nope".into())).is_err());
    }

    #[test]
    fn test_null_semantics() {
        assert_eq!(i64::null(), Some(0));
        assert_eq!(String::null(), Some(String::new()));
        assert_eq!(Option::<i64>::null(), Some(None));
        assert!(NaiveDateTime::null().is_none());
        assert!(Json::<Address>::null().is_none());
        assert_eq!(Box::<i32>::null(), Some(Box::new(0)));
    }

    #[test]
    fn test_bool_from_int() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::Text("false".into())).unwrap());
    }
}
