//! Method descriptors: the normalized input of the compiler.
//!
//! A descriptor is produced once per mapped method by whatever front-end reads
//! the application's declarations, then handed to
//! [`MapperBuilder::method`](crate::MapperBuilder::method).
//!
//! # Examples
//!
//! ```
//! use sqlx_named_mapper::descriptor::{FieldMapping, MethodDescriptor, ResultSpec};
//! use sqlx_named_mapper::types::{RecordType, TypeRef};
//!
//! let person = TypeRef::record(
//!     RecordType::new("Person")
//!         .field("name", TypeRef::String)
//!         .field("age", TypeRef::int()),
//! );
//!
//! let find_by_id = MethodDescriptor::select(
//!     "PersonDao",
//!     "findById",
//!     "select name, age from person where id = #{id}",
//! )
//! .param("id", TypeRef::int())
//! .returns(
//!     ResultSpec::new(TypeRef::optional(person))
//!         .field(FieldMapping::column("name", TypeRef::String))
//!         .field(FieldMapping::column("age", TypeRef::int())),
//! );
//!
//! assert_eq!(find_by_id.qualified_name(), "PersonDao.findById");
//! ```

use std::borrow::Cow;
use std::fmt;

use crate::classify::{classify, ReturnKind};
use crate::materialize::column_name;
use crate::types::TypeRef;

/// Statement category of a mapped method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Insert,
    Update,
    Delete,
    Select,
}

impl RequestKind {
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::Select)
    }
}

/// One declared call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub declared_type: TypeRef,
}

impl Parameter {
    pub fn new(name: impl Into<String>, declared_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            declared_type,
        }
    }

    pub const fn is_collection(&self) -> bool {
        self.declared_type.is_collection()
    }

    /// Element type of a collection parameter.
    pub fn element_type(&self) -> Option<&TypeRef> {
        if self.is_collection() {
            self.declared_type.element()
        } else {
            None
        }
    }
}

/// Names another mapped method (or registered accessor) by owner and method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessorRef {
    pub owner: String,
    pub method: String,
}

impl AccessorRef {
    pub fn new(owner: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for AccessorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    None,
    ToOne,
    ToMany,
}

/// Source of a field that is filled by another accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    None,
    /// Accessor returns a single, possibly optional, value
    ToOne { accessor: AccessorRef, required: bool },
    /// Accessor returns a collection
    ToMany { accessor: AccessorRef },
}

impl Relation {
    pub const fn kind(&self) -> RelationKind {
        match self {
            Self::None => RelationKind::None,
            Self::ToOne { .. } => RelationKind::ToOne,
            Self::ToMany { .. } => RelationKind::ToMany,
        }
    }

    pub const fn accessor(&self) -> Option<&AccessorRef> {
        match self {
            Self::None => None,
            Self::ToOne { accessor, .. } | Self::ToMany { accessor } => Some(accessor),
        }
    }
}

/// How one field of a record result is produced.
///
/// `column_type` is the type of the value read from the column: the field's own
/// type for direct columns, the identifier's type for relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: String,
    pub column: Option<String>,
    pub column_type: TypeRef,
    pub relation: Relation,
    /// Registered converter name; takes precedence over relation and column reads
    pub converter: Option<String>,
}

impl FieldMapping {
    /// A field read straight from its column.
    pub fn column(field: impl Into<String>, column_type: TypeRef) -> Self {
        Self {
            field: field.into(),
            column: None,
            column_type,
            relation: Relation::None,
            converter: None,
        }
    }

    /// A field filled by an accessor returning one (optional) value.
    pub fn to_one(
        field: impl Into<String>,
        id_column: impl Into<String>,
        id_type: TypeRef,
        accessor: AccessorRef,
        required: bool,
    ) -> Self {
        Self {
            field: field.into(),
            column: Some(id_column.into()),
            column_type: id_type,
            relation: Relation::ToOne { accessor, required },
            converter: None,
        }
    }

    /// A field filled by an accessor returning a collection.
    pub fn to_many(
        field: impl Into<String>,
        id_column: impl Into<String>,
        id_type: TypeRef,
        accessor: AccessorRef,
    ) -> Self {
        Self {
            field: field.into(),
            column: Some(id_column.into()),
            column_type: id_type,
            relation: Relation::ToMany { accessor },
            converter: None,
        }
    }

    /// A field produced by a registered converter from the column's text.
    pub fn converted(field: impl Into<String>, converter: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            column: None,
            column_type: TypeRef::String,
            relation: Relation::None,
            converter: Some(converter.into()),
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Explicit column name, or the snake_case form of the field name.
    pub fn column_name(&self) -> Cow<'_, str> {
        match &self.column {
            Some(column) if !column.is_empty() => Cow::Borrowed(column),
            _ => Cow::Owned(column_name(&self.field)),
        }
    }

    /// Filled in the first pass, straight from the row.
    pub const fn is_direct(&self) -> bool {
        self.converter.is_none() && matches!(self.relation, Relation::None)
    }
}

/// Declared result of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSpec {
    pub target_type: TypeRef,
    pub return_kind: ReturnKind,
    /// Type of each produced value (the container's element, or the target itself)
    pub element_type: TypeRef,
    pub field_mappings: Vec<FieldMapping>,
    pub(crate) explicit_kind: bool,
}

impl ResultSpec {
    /// Result whose kind is classified from the target type.
    pub fn new(target_type: TypeRef) -> Self {
        let shape = classify(&target_type);
        Self {
            target_type,
            return_kind: shape.kind,
            element_type: shape.element,
            field_mappings: Vec::new(),
            explicit_kind: false,
        }
    }

    pub fn void() -> Self {
        Self::new(TypeRef::Unit)
    }

    /// Overrides the classified kind, e.g. a record returned as a single required value.
    #[must_use]
    pub fn with_kind(mut self, kind: ReturnKind) -> Self {
        self.return_kind = kind;
        self.element_type = match (kind, self.target_type.element()) {
            (ReturnKind::Optional | ReturnKind::List | ReturnKind::Set, Some(inner)) => inner.clone(),
            _ => self.target_type.clone(),
        };
        self.explicit_kind = true;
        self
    }

    #[must_use]
    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.field_mappings.push(mapping);
        self
    }
}

/// Everything needed to compile one mapped method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub owner: String,
    pub name: String,
    pub template: String,
    pub parameters: Vec<Parameter>,
    pub result: ResultSpec,
    pub mode: RequestKind,
    /// Run on the unit of work's shared connection instead of a dedicated one
    pub transactional: bool,
    /// Resolve converters and relations after the direct columns
    pub fill_subfields: bool,
    /// Field-filler: memoize results in the unit-of-work cache
    pub cacheable: bool,
    /// Forces (`Some(true)`) or forbids (`Some(false)`) batch execution
    pub batch: Option<bool>,
}

impl MethodDescriptor {
    pub fn new(
        mode: RequestKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            template: template.into(),
            parameters: Vec::new(),
            result: ResultSpec::void(),
            mode,
            transactional: true,
            fill_subfields: true,
            cacheable: false,
            batch: None,
        }
    }

    pub fn select(owner: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(RequestKind::Select, owner, name, template)
    }

    pub fn insert(owner: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(RequestKind::Insert, owner, name, template)
    }

    pub fn update(owner: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(RequestKind::Update, owner, name, template)
    }

    pub fn delete(owner: impl Into<String>, name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(RequestKind::Delete, owner, name, template)
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, declared_type: TypeRef) -> Self {
        self.parameters.push(Parameter::new(name, declared_type));
        self
    }

    #[must_use]
    pub fn returns(mut self, result: ResultSpec) -> Self {
        self.result = result;
        self
    }

    #[must_use]
    pub const fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    #[must_use]
    pub const fn fill_subfields(mut self, fill: bool) -> Self {
        self.fill_subfields = fill;
        self
    }

    #[must_use]
    pub const fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    #[must_use]
    pub const fn batch(mut self, batch: bool) -> Self {
        self.batch = Some(batch);
        self
    }

    /// `Owner.method`, the registry key and the name used in errors.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    /// Mutating, non-returning call over exactly one collection parameter.
    pub fn is_batch_eligible(&self) -> bool {
        self.mode.is_mutation()
            && self.result.return_kind == ReturnKind::Void
            && self.parameters.len() == 1
            && self.parameters[0].is_collection()
    }

    pub fn accessor_ref(&self) -> AccessorRef {
        AccessorRef::new(self.owner.clone(), self.name.clone())
    }
}
