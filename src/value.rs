use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::data_type::DataType;
use crate::error::{Error, Result};

/// One cell. Values carry their own type; `Null` has none until it lands in
/// a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    /// Shared so that scans and projections clone without copying text.
    Text(Arc<str>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `None` for [Value::Null].
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DataType::Int),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Bool(_) => Some(DataType::Bool),
        }
    }

    /// Converts the value so it can be stored in a column of type `target`.
    ///
    /// `NULL` passes through untouched and integers widen to floats. Every
    /// other cross-type conversion is a [Error::TypeMismatch].
    pub fn coerce_to(self, target: DataType) -> Result<Value> {
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Int(i), DataType::Float) => Ok(Value::Float(i as f64)),
            (value, target) if value.data_type() == Some(target) => Ok(value),
            (value, target) => Err(Error::type_mismatch(format!(
                "cannot store {} value {} in a {} column",
                value.type_label(),
                value,
                target
            ))),
        }
    }

    /// Compares two values with SQL three-valued semantics.
    ///
    /// Returns `Ok(None)` when either side is `NULL` (or a float comparison is
    /// undefined), which callers treat as "unknown".
    ///
    /// # Errors
    /// Returns an error if comparing incompatible types (e.g., `Int` vs `Text`).
    pub fn sql_cmp(&self, other: &Value) -> Result<Option<Ordering>> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(None),
            (Value::Int(l), Value::Int(r)) => Ok(Some(l.cmp(r))),
            (Value::Int(l), Value::Float(r)) => Ok((*l as f64).partial_cmp(r)),
            (Value::Float(l), Value::Int(r)) => Ok(l.partial_cmp(&(*r as f64))),
            (Value::Float(l), Value::Float(r)) => Ok(l.partial_cmp(r)),
            (Value::Text(l), Value::Text(r)) => Ok(Some(l.cmp(r))),
            (Value::Bool(l), Value::Bool(r)) => Ok(Some(l.cmp(r))),
            _ => Err(Error::type_mismatch(format!(
                "cannot compare {} with {}",
                self.type_label(),
                other.type_label()
            ))),
        }
    }

    /// Total order used for sorting: `NULL` first, then numbers (integers and
    /// floats interleaved by magnitude, NaN last), text, and booleans.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(l), Value::Int(r)) => l.cmp(r),
            (Value::Int(l), Value::Float(r)) => float_order(*l as f64, *r),
            (Value::Float(l), Value::Int(r)) => float_order(*l, *r as f64),
            (Value::Float(l), Value::Float(r)) => float_order(*l, *r),
            (Value::Text(l), Value::Text(r)) => l.cmp(r),
            (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Bool(_) => 3,
        }
    }

    pub(crate) fn type_label(&self) -> &'static str {
        self.data_type().map_or("NULL", |t| t.type_name())
    }
}

/// Numeric order where `-0.0 == 0.0`, as in [Value::sql_cmp], and NaN comes
/// after every number.
fn float_order(l: f64, r: f64) -> Ordering {
    l.partial_cmp(&r)
        .unwrap_or_else(|| l.is_nan().cmp(&r.is_nan()))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// JSON rendering used by the response envelope. Non-finite floats have no
/// JSON representation and are emitted as `null`.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) if x.is_finite() => serializer.serialize_f64(*x),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
