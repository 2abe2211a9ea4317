//! Dynamically-typed SQL values.

use std::fmt;

/// A SQL value as exchanged with drivers and stored in rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// BOOLEAN.
    Bool(bool),
    /// TINYINT.
    TinyInt(i8),
    /// SMALLINT.
    SmallInt(i16),
    /// INTEGER.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// REAL.
    Float(f32),
    /// DOUBLE PRECISION.
    Double(f64),
    /// DECIMAL / NUMERIC, kept as text to avoid precision loss.
    Decimal(String),
    /// TEXT / VARCHAR.
    Text(String),
    /// BLOB / BYTEA.
    Bytes(Vec<u8>),
    /// DATE as days since the Unix epoch.
    Date(i32),
    /// TIME as microseconds since midnight.
    Time(i64),
    /// TIMESTAMP as microseconds since the Unix epoch.
    Timestamp(i64),
    /// TIMESTAMPTZ as microseconds since the Unix epoch (UTC).
    TimestampTz(i64),
    /// UUID.
    Uuid([u8; 16]),
    /// JSON / JSONB.
    Json(serde_json::Value),
    /// ARRAY.
    Array(Vec<Value>),
}

impl Value {
    /// True for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widen any integer variant to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow text (and decimal) values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean value, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow the byte payload of a `Bytes` value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::TinyInt(i) => write!(f, "{i}"),
            Value::SmallInt(i) => write!(f, "{i}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(s) => f.write_str(s),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "date({d})"),
            Value::Time(t) => write!(f, "time({t})"),
            Value::Timestamp(t) | Value::TimestampTz(t) => write!(f, "ts({t})"),
            Value::Uuid(u) => {
                for byte in u {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Json(j) => write!(f, "{j}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
