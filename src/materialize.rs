//! Row materialization.
//!
//! Rows become values in two passes. The first reads flat values and direct
//! columns while the result set is open. The second runs after the statement
//! is released and applies converters and relation accessors, which may need
//! the unit of work's connection themselves.

use tracing::trace;

use crate::classify::is_flat;
use crate::descriptor::{AccessorRef, FieldMapping, Relation, ResultSpec};
use crate::driver::{Column, Rows};
use crate::error::{DriverResult, Error, Result};
use crate::mapper::Mapper;
use crate::method::Stage;
use crate::types::{Primitive, TypeRef};
use crate::unit_of_work::UnitOfWork;
use crate::value::{Record, Value};

/// Column name used for a blank field name.
pub const UNDEFINED_COLUMN: &str = "undefined";

/// Derives a column name from a field name.
///
/// `_` goes before an uppercase run that follows a lowercase letter and
/// around a digit run embedded in a word, then everything is lower-cased.
/// Names that are already snake_case come back unchanged.
///
/// ```
/// use sqlx_named_mapper::materialize::column_name;
///
/// assert_eq!(column_name("userId"), "user_id");
/// assert_eq!(column_name("id2Code"), "id_2_code");
/// assert_eq!(column_name("user_id"), "user_id");
/// ```
pub fn column_name(field: &str) -> String {
    let field = field.trim();
    if field.is_empty() {
        return UNDEFINED_COLUMN.to_owned();
    }

    let chars: Vec<char> = field.chars().collect();
    let mut column = String::with_capacity(field.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let prev = i.checked_sub(1).map(|p| chars[p]);

        if c.is_ascii_digit() {
            let end = chars[i..]
                .iter()
                .position(|ch| !ch.is_ascii_digit())
                .map_or(chars.len(), |n| i + n);
            let embedded = prev.is_some_and(char::is_alphabetic)
                && chars.get(end).is_some_and(|ch| ch.is_alphabetic());
            if embedded {
                column.push('_');
            }
            column.extend(&chars[i..end]);
            if embedded {
                column.push('_');
            }
            i = end;
            continue;
        }

        if c.is_uppercase() && prev.is_some_and(char::is_lowercase) {
            column.push('_');
        }
        column.extend(c.to_lowercase());
        i += 1;
    }
    column
}

/// A row after the first pass.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Partial {
    /// Flat value, or the record holding its direct columns
    pub(crate) value: Value,
    /// Field mapping index and raw column value, resolved in the second pass
    deferred: Vec<(usize, Value)>,
}

/// First pass over a result set.
///
/// Single-value kinds read at most one row.
pub(crate) fn read_rows(
    rows: &mut dyn Rows,
    spec: &ResultSpec,
    fill_subfields: bool,
    method: &str,
) -> Result<Vec<Partial>> {
    let single = !spec.return_kind.is_collection();
    let mut partials = Vec::new();
    while rows
        .next_row()
        .map_err(Error::data_access(method, Stage::RowsAvailable))?
    {
        partials.push(read_row(&*rows, spec, fill_subfields, method)?);
        if single {
            break;
        }
    }
    trace!(method, rows = partials.len(), "rows read");
    Ok(partials)
}

fn read_row(rows: &dyn Rows, spec: &ResultSpec, fill_subfields: bool, method: &str) -> Result<Partial> {
    let element = &spec.element_type;
    if is_flat(element) {
        return Ok(Partial {
            value: read_column(rows, Column::Index(1), element, method)?,
            deferred: Vec::new(),
        });
    }

    let mut record = Record::new(element.simple_name());
    let mut deferred = Vec::new();
    for (index, mapping) in spec.field_mappings.iter().enumerate() {
        if mapping.is_direct() {
            let value = read_mapped(rows, mapping, method)?;
            record.set(mapping.field.as_str(), value);
        } else if fill_subfields {
            deferred.push((index, read_mapped(rows, mapping, method)?));
        } else {
            record.set(mapping.field.as_str(), Value::Null);
        }
    }
    Ok(Partial {
        value: Value::Record(record),
        deferred,
    })
}

fn read_mapped(rows: &dyn Rows, mapping: &FieldMapping, method: &str) -> Result<Value> {
    read_column(rows, Column::Name(&mapping.column_name()), &mapping.column_type, method)
}

/// Reads one value of type `ty` from the current row.
pub(crate) fn read_column(rows: &dyn Rows, column: Column<'_>, ty: &TypeRef, method: &str) -> Result<Value> {
    let value = read_raw(rows, column, ty).map_err(Error::data_access(method, Stage::RowsAvailable))?;
    if let (TypeRef::Enum(enumeration), Value::Enum(variant)) = (ty, &value) {
        if !enumeration.accepts(variant) {
            return Err(Error::Conversion {
                field: column.to_string(),
                detail: format!("`{variant}` is not a variant of {}", enumeration.name),
            });
        }
    }
    Ok(value)
}

fn read_raw(rows: &dyn Rows, column: Column<'_>, ty: &TypeRef) -> DriverResult<Value> {
    let value = match ty {
        // SQL NULL reads as the primitive's zero value
        TypeRef::Primitive(p) => return Ok(read_primitive(rows, column, *p)?.unwrap_or_else(|| zero(*p))),
        TypeRef::Boxed(p) => read_primitive(rows, column, *p)?,
        TypeRef::String => rows.get_string(column)?.map(Value::String),
        TypeRef::Uuid => rows.get_uuid(column)?.map(Value::Uuid),
        TypeRef::Timestamp => rows.get_timestamp(column)?.map(Value::Timestamp),
        TypeRef::Time => rows.get_time(column)?.map(Value::Time),
        TypeRef::Enum(_) => rows.get_string(column)?.map(Value::Enum),
        TypeRef::Unit
        | TypeRef::Record(_)
        | TypeRef::Optional(_)
        | TypeRef::List(_)
        | TypeRef::Set(_) => return rows.get_object(column),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn read_primitive(rows: &dyn Rows, column: Column<'_>, primitive: Primitive) -> DriverResult<Option<Value>> {
    Ok(match primitive {
        Primitive::Byte => rows
            .get_short(column)?
            .map(i8::try_from)
            .transpose()?
            .map(Value::Byte),
        Primitive::Short => rows.get_short(column)?.map(Value::Short),
        Primitive::Int => rows.get_int(column)?.map(Value::Int),
        Primitive::Long => rows.get_long(column)?.map(Value::Long),
        Primitive::Float => rows.get_float(column)?.map(Value::Float),
        Primitive::Double => rows.get_double(column)?.map(Value::Double),
        Primitive::Boolean => rows.get_bool(column)?.map(Value::Bool),
        Primitive::Char => rows
            .get_string(column)?
            .and_then(|s| s.chars().next())
            .map(Value::Char),
    })
}

const fn zero(primitive: Primitive) -> Value {
    match primitive {
        Primitive::Byte => Value::Byte(0),
        Primitive::Short => Value::Short(0),
        Primitive::Int => Value::Int(0),
        Primitive::Long => Value::Long(0),
        Primitive::Float => Value::Float(0.0),
        Primitive::Double => Value::Double(0.0),
        Primitive::Boolean => Value::Bool(false),
        Primitive::Char => Value::Char('\0'),
    }
}

/// Second pass: converters and relations of one row.
pub(crate) fn complete(uow: &mut UnitOfWork<'_>, spec: &ResultSpec, partial: Partial, method: &str) -> Result<Value> {
    let Partial { value, deferred } = partial;
    let mut record = match value {
        Value::Record(record) if !deferred.is_empty() => record,
        other => return Ok(other),
    };

    let mapper = uow.mapper();
    for (index, raw) in deferred {
        let mapping = &spec.field_mappings[index];
        let resolved = match (&mapping.converter, &mapping.relation) {
            (Some(converter), _) => convert(mapper, converter, &mapping.field, &raw)?,
            (None, Relation::None) => raw,
            (None, Relation::ToOne { accessor, required }) => {
                let found = call_accessor(uow, mapper, accessor, raw)?.flatten_optional();
                if found.is_null() && *required {
                    return Err(Error::RequiredValueAbsent {
                        method: method.to_owned(),
                        detail: format!("`{accessor}` found nothing for field `{}`", mapping.field),
                    });
                }
                found
            }
            (None, Relation::ToMany { accessor }) => call_accessor(uow, mapper, accessor, raw)?,
        };
        record.set(mapping.field.as_str(), resolved);
    }
    Ok(Value::Record(record))
}

fn convert(mapper: &Mapper, name: &str, field: &str, raw: &Value) -> Result<Value> {
    let converter = mapper.converter(name).ok_or_else(|| Error::Conversion {
        field: field.to_owned(),
        detail: format!("converter `{name}` is not registered"),
    })?;
    let text = (!raw.is_null()).then(|| raw.to_string());
    converter
        .convert(text.as_deref())
        .map_err(|e| Error::Conversion {
            field: field.to_owned(),
            detail: e.to_string(),
        })
}

fn call_accessor(uow: &mut UnitOfWork<'_>, mapper: &Mapper, reference: &AccessorRef, id: Value) -> Result<Value> {
    let accessor = mapper
        .accessor(reference)
        .ok_or_else(|| Error::UnknownAccessor(reference.to_string()))?;
    trace!(accessor = %reference, %id, "resolving relation");
    accessor.call(uow, std::slice::from_ref(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_column_name_camel_case() {
        assert_eq!(column_name("userId"), "user_id");
        assert_eq!(column_name("createdAtUtc"), "created_at_utc");
        assert_eq!(column_name("userID"), "user_id");
        assert_eq!(column_name("Name"), "name");
    }

    #[test]
    fn test_column_name_digits() {
        assert_eq!(column_name("id2Code"), "id_2_code");
        assert_eq!(column_name("address2"), "address2");
        assert_eq!(column_name("line12b"), "line_12_b");
    }

    #[test]
    fn test_column_name_blank() {
        assert_eq!(column_name(""), UNDEFINED_COLUMN);
        assert_eq!(column_name("   "), UNDEFINED_COLUMN);
    }

    proptest! {
        #[test]
        fn column_name_is_idempotent(field in "[a-zA-Z][a-zA-Z0-9_]{0,20}") {
            let once = column_name(&field);
            prop_assert_eq!(column_name(&once), once);
        }

        #[test]
        fn snake_case_is_kept(field in "[a-z]+(_[a-z]+|_[0-9]+){0,4}") {
            prop_assert_eq!(column_name(&field), field);
        }
    }
}
