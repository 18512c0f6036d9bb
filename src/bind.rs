//! Statement binding: one bind operation per positional marker.

use crate::driver::Statement;
use crate::error::{Error, Result};
use crate::method::Stage;
use crate::types::{Primitive, TypeRef};
use crate::value::Value;

pub const TYPE_DB_VARCHAR: &str = "varchar";
pub const TYPE_DB_TIMESTAMP_TZ: &str = "timestamptz";
pub const TYPE_DB_TIME: &str = "time";

static NULL: Value = Value::Null;

/// The bind operation selected for a positional marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindKind {
    Int,
    Short,
    Long,
    Float,
    Double,
    Boolean,
    String,
    /// Enumeration bound by variant name
    Enum,
    Timestamp,
    Time,
    /// Whole collection bound as one SQL array
    Array { element_type: String },
    Object,
    /// Object bind of a value reached through an access path
    Path(AccessPath),
}

impl BindKind {
    /// Picks the bind operation for a value of type `ty`.
    ///
    /// A placeholder modifier always wins and binds the evaluated path as an object.
    pub fn select(ty: &TypeRef, path: Option<AccessPath>) -> Self {
        if let Some(path) = path {
            return Self::Path(path);
        }
        match ty {
            TypeRef::List(element) | TypeRef::Set(element) => Self::Array {
                element_type: array_element_type(element),
            },
            TypeRef::Primitive(p) | TypeRef::Boxed(p) => match p {
                Primitive::Byte | Primitive::Int => Self::Int,
                Primitive::Short => Self::Short,
                Primitive::Long => Self::Long,
                Primitive::Float => Self::Float,
                Primitive::Double => Self::Double,
                Primitive::Boolean => Self::Boolean,
                Primitive::Char => Self::String,
            },
            TypeRef::String => Self::String,
            TypeRef::Enum(_) => Self::Enum,
            TypeRef::Timestamp => Self::Timestamp,
            TypeRef::Time => Self::Time,
            TypeRef::Unit
            | TypeRef::Uuid
            | TypeRef::Record(_)
            | TypeRef::Optional(_) => Self::Object,
        }
    }

    pub const fn expected(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Short => "short",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Enum => "enum",
            Self::Timestamp => "timestamp",
            Self::Time => "time",
            Self::Array { .. } => "collection",
            Self::Object | Self::Path(_) => "object",
        }
    }
}

/// SQL type name of the elements of an array bind.
pub fn array_element_type(element: &TypeRef) -> String {
    match element {
        TypeRef::Enum(_) => TYPE_DB_VARCHAR.to_owned(),
        TypeRef::Timestamp => TYPE_DB_TIMESTAMP_TZ.to_owned(),
        TypeRef::Time => TYPE_DB_TIME.to_owned(),
        other => other.simple_name().to_lowercase(),
    }
}

/// Accessor chain written after a placeholder name, e.g. `#{user.address.city}`.
///
/// Segments read record fields (a Java-style `getX()` reads field `x`), and a
/// few built-ins work on any value: `toString`, `len`/`size`/`length`,
/// `name` on enums, `toUpperCase`/`toLowerCase` on strings. A trailing `()`
/// on a segment is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath {
    raw: String,
    segments: Vec<String>,
}

impl AccessPath {
    /// Parses a modifier including its leading dot; `None` when it is empty.
    pub fn parse(modifier: &str) -> Option<Self> {
        if modifier.is_empty() {
            return None;
        }
        let segments = modifier
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self {
            raw: modifier.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First segment passing call arguments, which no value accepts.
    pub fn unsupported_segment(&self) -> Option<&str> {
        self.segments
            .iter()
            .map(String::as_str)
            .find(|segment| segment.strip_suffix("()").unwrap_or(segment).contains('('))
    }

    /// Evaluates the path; a null anywhere along it yields null.
    pub fn apply(&self, value: &Value) -> Result<Value> {
        let mut current = value.clone().flatten_optional();
        for segment in &self.segments {
            if current.is_null() {
                return Ok(Value::Null);
            }
            current = self
                .step(&current, segment)
                .ok_or_else(|| Error::InvalidAccessPath {
                    path: self.raw.clone(),
                    found: current.kind_name(),
                })?
                .flatten_optional();
        }
        Ok(current)
    }

    fn step(&self, value: &Value, segment: &str) -> Option<Value> {
        let name = segment.strip_suffix("()").unwrap_or(segment);
        if name.contains('(') {
            return None;
        }
        match (name, value) {
            ("toString" | "to_string", v) => Some(Value::String(v.to_string())),
            ("len" | "size" | "length", Value::List(items) | Value::Set(items)) => {
                i64::try_from(items.len()).ok().map(Value::Long)
            }
            ("len" | "length", Value::String(s)) => i64::try_from(s.chars().count()).ok().map(Value::Long),
            ("name", Value::Enum(variant)) => Some(Value::String(variant.clone())),
            ("toUpperCase" | "to_uppercase", Value::String(s)) => Some(Value::String(s.to_uppercase())),
            ("toLowerCase" | "to_lowercase", Value::String(s)) => Some(Value::String(s.to_lowercase())),
            (_, Value::Record(record)) => record
                .get(name)
                .or_else(|| getter_field(name).and_then(|field| record.get(&field)))
                .cloned(),
            _ => None,
        }
    }
}

/// `getUserId` -> `userId`
fn getter_field(name: &str) -> Option<String> {
    let rest = name.strip_prefix("get")?;
    let mut chars = rest.chars();
    let first = chars.next().filter(char::is_ascii_uppercase)?;
    Some(first.to_ascii_lowercase().to_string() + chars.as_str())
}

/// Binds `value` at `position` with the operation `kind` selects.
pub(crate) fn bind_value(
    statement: &mut dyn Statement,
    method: &str,
    position: usize,
    kind: &BindKind,
    value: &Value,
) -> Result<()> {
    let value = match value {
        Value::Optional(Some(inner)) => inner.as_ref(),
        Value::Optional(None) => &NULL,
        other => other,
    };
    let mismatch = || Error::TypeMismatch {
        method: method.to_owned(),
        position,
        expected: kind.expected(),
        found: value.kind_name(),
    };
    let null = value.is_null();

    let outcome = match kind {
        BindKind::Int => {
            let v = if null { None } else { Some(value.as_i32().ok_or_else(mismatch)?) };
            statement.set_int(position, v)
        }
        BindKind::Short => {
            let v = if null { None } else { Some(value.as_i16().ok_or_else(mismatch)?) };
            statement.set_short(position, v)
        }
        BindKind::Long => {
            let v = if null { None } else { Some(value.as_i64().ok_or_else(mismatch)?) };
            statement.set_long(position, v)
        }
        BindKind::Float => {
            let v = if null { None } else { Some(value.as_f32().ok_or_else(mismatch)?) };
            statement.set_float(position, v)
        }
        BindKind::Double => {
            let v = if null { None } else { Some(value.as_f64().ok_or_else(mismatch)?) };
            statement.set_double(position, v)
        }
        BindKind::Boolean => {
            let v = if null { None } else { Some(value.as_bool().ok_or_else(mismatch)?) };
            statement.set_bool(position, v)
        }
        BindKind::String => match value {
            Value::Null => statement.set_string(position, None),
            Value::Char(c) => statement.set_string(position, Some(c.to_string().as_str())),
            Value::String(s) | Value::Enum(s) => statement.set_string(position, Some(s)),
            _ => return Err(mismatch()),
        },
        BindKind::Enum => match value {
            Value::Null => statement.set_string(position, None),
            Value::String(s) | Value::Enum(s) => statement.set_string(position, Some(s)),
            _ => return Err(mismatch()),
        },
        BindKind::Timestamp => match value {
            Value::Null => statement.set_timestamp(position, None),
            Value::Timestamp(t) => statement.set_timestamp(position, Some(*t)),
            _ => return Err(mismatch()),
        },
        BindKind::Time => match value {
            Value::Null => statement.set_time(position, None),
            Value::Time(t) => statement.set_time(position, Some(*t)),
            _ => return Err(mismatch()),
        },
        BindKind::Array { element_type } => match value {
            Value::Null => statement.set_array(position, element_type, None),
            Value::List(items) | Value::Set(items) => statement.set_array(position, element_type, Some(items)),
            _ => return Err(mismatch()),
        },
        BindKind::Object => statement.set_object(position, value),
        BindKind::Path(path) => {
            if null {
                statement.set_object(position, &Value::Null)
            } else {
                let reached = path.apply(value)?;
                statement.set_object(position, &reached)
            }
        }
    };

    outcome.map_err(Error::data_access(method, Stage::ConnectionAcquired))
}
