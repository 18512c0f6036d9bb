//! Dynamically typed values flowing through compiled methods.
//!
//! Arguments are passed to a method as a slice of [`Value`]s and results come
//! back as one. [`FromValue`] turns a result into plain Rust types.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveTime};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    Uuid(Uuid),
    Timestamp(DateTime<FixedOffset>),
    Time(NaiveTime),
    /// Enumeration variant name
    Enum(String),
    Record(Record),
    Optional(Option<Box<Value>>),
    List(Vec<Value>),
    /// Deduplicated collection; keeps first-insertion order
    Set(Vec<Value>),
}

impl Value {
    pub fn some(value: Self) -> Self {
        Self::Optional(Some(Box::new(value)))
    }

    pub const fn none() -> Self {
        Self::Optional(None)
    }

    /// Builds a set, dropping duplicates by value equality.
    pub fn set_of<I: IntoIterator<Item = Self>>(values: I) -> Self {
        let mut seen = HashSet::new();
        let items = values.into_iter().filter(|value| seen.insert(value.clone())).collect();
        Self::Set(items)
    }

    /// `Null` and the absent optional.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Optional(None))
    }

    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Char(_) => "char",
            Self::String(_) => "string",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::Time(_) => "time",
            Self::Enum(_) => "enum",
            Self::Record(_) => "record",
            Self::Optional(_) => "optional",
            Self::List(_) => "list",
            Self::Set(_) => "set",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Self::Byte(v) => Some(i32::from(v)),
            Self::Short(v) => Some(i32::from(v)),
            Self::Int(v) => Some(v),
            Self::Long(v) => i32::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match *self {
            Self::Byte(v) => Some(i16::from(v)),
            Self::Short(v) => Some(v),
            Self::Int(v) => i16::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::Short(v) => Some(i64::from(v)),
            Self::Int(v) => Some(i64::from(v)),
            Self::Long(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Text of strings, chars are not included.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Elements of a list or set.
    pub fn as_slice(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Unwraps `Optional`, mapping the absent case to `Null`.
    #[must_use]
    pub fn flatten_optional(self) -> Self {
        match self {
            Self::Optional(Some(inner)) => *inner,
            Self::Optional(None) => Self::Null,
            other => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::String(a), Self::String(b)) | (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Optional(a), Self::Optional(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a.len() == b.len() && a.iter().all(|v| b.contains(v)),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(v) => v.hash(state),
            Self::Byte(v) => v.hash(state),
            Self::Short(v) => v.hash(state),
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::Char(v) => v.hash(state),
            Self::String(v) | Self::Enum(v) => v.hash(state),
            Self::Uuid(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
            Self::Time(v) => v.hash(state),
            Self::Record(v) => v.hash(state),
            Self::Optional(v) => v.hash(state),
            Self::List(v) => v.hash(state),
            // equal sets may differ in order
            Self::Set(v) => v.len().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null | Self::Optional(None) => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "{v}"),
            Self::String(v) | Self::Enum(v) => f.write_str(v),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Timestamp(v) => f.write_str(&v.to_rfc3339()),
            Self::Time(v) => write!(f, "{v}"),
            Self::Record(r) => {
                write!(f, "{}(", r.type_name)?;
                for (i, (name, value)) in r.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                f.write_str(")")
            }
            Self::Optional(Some(v)) => write!(f, "Optional[{v}]"),
            Self::List(items) | Self::Set(items) => {
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

/// A materialized composite value: named fields in fill order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets a field, replacing an earlier value of the same name.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Reads a field and converts it; a missing field converts from `Null`.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T, ValueTypeError> {
        T::from_value(self.get(field).cloned().unwrap_or(Value::Null))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// A value did not have the variant the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct ValueTypeError {
    pub expected: &'static str,
    pub found: &'static str,
}

/// Conversion out of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueTypeError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        Ok(value)
    }
}

macro_rules! from_value_via {
    ($ty:ty, $expected:literal, |$v:ident| $extract:expr) => {
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, ValueTypeError> {
                let found = value.kind_name();
                let $v = value.flatten_optional();
                let extracted: Option<$ty> = $extract;
                extracted.ok_or(ValueTypeError {
                    expected: $expected,
                    found,
                })
            }
        }
    };
}

from_value_via!(bool, "boolean", |v| v.as_bool());
from_value_via!(i16, "short", |v| v.as_i16());
from_value_via!(i32, "int", |v| v.as_i32());
from_value_via!(i64, "long", |v| v.as_i64());
from_value_via!(f32, "float", |v| v.as_f32());
from_value_via!(f64, "double", |v| v.as_f64());
from_value_via!(char, "char", |v| match v {
    Value::Char(c) => Some(c),
    _ => None,
});
from_value_via!(String, "string", |v| match v {
    Value::String(s) | Value::Enum(s) => Some(s),
    _ => None,
});
from_value_via!(Uuid, "uuid", |v| match v {
    Value::Uuid(u) => Some(u),
    _ => None,
});
from_value_via!(DateTime<FixedOffset>, "timestamp", |v| match v {
    Value::Timestamp(t) => Some(t),
    _ => None,
});
from_value_via!(NaiveTime, "time", |v| match v {
    Value::Time(t) => Some(t),
    _ => None,
});
from_value_via!(Record, "record", |v| match v {
    Value::Record(r) => Some(r),
    _ => None,
});

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value.flatten_optional() {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ValueTypeError> {
        match value {
            Value::List(items) | Value::Set(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueTypeError {
                expected: "collection",
                found: other.kind_name(),
            }),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => String,
    Uuid => Uuid,
    DateTime<FixedOffset> => Timestamp,
    NaiveTime => Time,
    Record => Record,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_set_equality_ignores_order() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::Set(vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(a, b);

        let mut seen = HashSet::new();
        seen.insert(a);
        assert!(seen.contains(&b));
    }

    #[test]
    fn test_set_of_deduplicates() {
        let set = Value::set_of([Value::from("b"), Value::from("a"), Value::from("b"), Value::from("a")]);
        assert_eq!(set.as_slice(), Some(&[Value::from("b"), Value::from("a")][..]));

        let ada = || Value::Record(Record::new("Person").with("name", "Ada"));
        let people = Value::set_of((0..1000).map(|_| ada()));
        assert_eq!(people.as_slice().map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_record_set_replaces_field() {
        let mut record = Record::new("Person").with("name", "Ada");
        record.set("name", "Grace");
        assert_eq!(record.get("name"), Some(&Value::from("Grace")));
        assert_eq!(record.fields().count(), 1);
    }

    #[test]
    fn test_from_value_unwraps_optional() {
        let got: Option<i64> = FromValue::from_value(Value::some(Value::Int(3))).unwrap();
        assert_eq!(got, Some(3));

        let got: Option<String> = FromValue::from_value(Value::none()).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn test_from_value_reports_mismatch() {
        let err = String::from_value(Value::Int(1)).unwrap_err();
        assert_eq!(err.expected, "string");
        assert_eq!(err.found, "int");
    }

    #[test]
    fn test_display_record() {
        let record = Record::new("Person").with("name", "Ada").with("age", 30);
        assert_eq!(Value::Record(record).to_string(), "Person(name=Ada, age=30)");
    }
}
