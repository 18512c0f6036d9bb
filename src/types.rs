//! Normalized type descriptions handed over by the descriptor front-end.
//!
//! The mapper never inspects Rust types at runtime. Every parameter, result and
//! record field is described by a [`TypeRef`], which drives return-kind
//! classification, bind selection and column reads.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Non-nullable primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Char,
}

impl Primitive {
    /// Name of the nullable (boxed) counterpart, used for SQL array element names.
    pub const fn boxed_name(self) -> &'static str {
        match self {
            Self::Byte => "Byte",
            Self::Short => "Short",
            Self::Int => "Integer",
            Self::Long => "Long",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Boolean => "Boolean",
            Self::Char => "Character",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Char => "char",
        }
    }
}

/// An enumeration mapped to its variant names.
///
/// An empty variant list accepts any name read from a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    pub fn new<N, I, V>(name: N, variants: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn accepts(&self, variant: &str) -> bool {
        self.variants.is_empty() || self.variants.iter().any(|v| v == variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
}

/// A composite target type, listed field by field in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn field_type(&self, name: &str) -> Option<&TypeRef> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }
}

/// Type reference of a parameter, a result or a record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Unit,
    Primitive(Primitive),
    Boxed(Primitive),
    String,
    Uuid,
    /// Timezone-aware timestamp
    Timestamp,
    /// Time of day
    Time,
    Enum(Arc<EnumType>),
    Record(Arc<RecordType>),
    Optional(Box<TypeRef>),
    List(Box<TypeRef>),
    Set(Box<TypeRef>),
}

impl TypeRef {
    pub const fn int() -> Self {
        Self::Primitive(Primitive::Int)
    }

    pub const fn long() -> Self {
        Self::Primitive(Primitive::Long)
    }

    pub const fn boolean() -> Self {
        Self::Primitive(Primitive::Boolean)
    }

    pub const fn boxed(primitive: Primitive) -> Self {
        Self::Boxed(primitive)
    }

    pub fn record(record: RecordType) -> Self {
        Self::Record(Arc::new(record))
    }

    pub fn enumeration(enumeration: EnumType) -> Self {
        Self::Enum(Arc::new(enumeration))
    }

    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn set(inner: Self) -> Self {
        Self::Set(Box::new(inner))
    }

    /// Contained type of `Optional`, `List` and `Set`.
    pub fn element(&self) -> Option<&Self> {
        match self {
            Self::Optional(inner) | Self::List(inner) | Self::Set(inner) => Some(inner),
            _ => None,
        }
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::List(_) | Self::Set(_))
    }

    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Unqualified type name, as a declaration would spell it.
    pub fn simple_name(&self) -> Cow<'_, str> {
        match self {
            Self::Unit => Cow::Borrowed("void"),
            Self::Primitive(p) | Self::Boxed(p) => Cow::Borrowed(p.boxed_name()),
            Self::String => Cow::Borrowed("String"),
            Self::Uuid => Cow::Borrowed("UUID"),
            Self::Timestamp => Cow::Borrowed("Timestamp"),
            Self::Time => Cow::Borrowed("Time"),
            Self::Enum(e) => Cow::Borrowed(&e.name),
            Self::Record(r) => Cow::Borrowed(&r.name),
            Self::Optional(_) => Cow::Borrowed("Optional"),
            Self::List(_) => Cow::Borrowed("List"),
            Self::Set(_) => Cow::Borrowed("Set"),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Optional(inner) | Self::List(inner) | Self::Set(inner) => {
                write!(f, "{}<{inner}>", self.simple_name())
            }
            _ => f.write_str(&self.simple_name()),
        }
    }
}
