//! Placeholder resolution: `#{name}` templates to positional SQL plus a binding plan.

use std::borrow::Cow;

use regex::Regex;
use serde::Deserialize;

use crate::bind::{AccessPath, BindKind};
use crate::descriptor::MethodDescriptor;
use crate::error::ConfigurationError;
use crate::types::{RecordType, TypeRef};

/// Upper bound of resolved placeholders per declared parameter.
pub const MAX_MULTIPLIER_NUMBER_PARAMETERS: usize = 1000;

const PLACEHOLDER_PATTERN: &str = r"#\{([^}]*)\}";

/// Positional marker written in place of each placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`, as JDBC and MySQL expect
    #[default]
    Question,
    /// `$1`, `$2`, ... as PostgreSQL expects
    Numbered,
}

impl PlaceholderStyle {
    pub fn marker(self, position: usize) -> Cow<'static, str> {
        match self {
            Self::Question => Cow::Borrowed("?"),
            Self::Numbered => Cow::Owned(format!("${position}")),
        }
    }
}

/// One `#{...}` occurrence split into base name and modifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    /// Trailing access expression including its leading dot, or empty
    pub modifier: String,
}

impl Placeholder {
    fn parse(inner: &str) -> Self {
        match inner.find('.') {
            Some(dot) if dot > 0 => Self {
                name: inner[..dot].to_owned(),
                modifier: inner[dot..].to_owned(),
            },
            _ => Self {
                name: inner.to_owned(),
                modifier: String::new(),
            },
        }
    }
}

/// Converts `#{name}` placeholders to positional markers.
///
/// # Examples
///
/// ```
/// use sqlx_named_mapper::builder::{build_query, PlaceholderStyle};
///
/// let sql = build_query(
///     "SELECT * FROM users WHERE id = #{id} AND name = #{name}",
///     PlaceholderStyle::Question,
/// )?;
/// assert_eq!(sql, "SELECT * FROM users WHERE id = ? AND name = ?");
/// # Ok::<(), sqlx_named_mapper::ConfigurationError>(())
/// ```
pub fn build_query(template: &str, style: PlaceholderStyle) -> Result<String, ConfigurationError> {
    let regex = Regex::new(PLACEHOLDER_PATTERN)?;
    let mut position = 0;
    let replaced = regex.replace_all(template, |_: &regex::Captures<'_>| {
        position += 1;
        style.marker(position)
    });
    Ok(replaced.into_owned())
}

/// Placeholders of `template` in left-to-right order, repeats included.
pub fn placeholders(template: &str) -> Result<Vec<Placeholder>, ConfigurationError> {
    let regex = Regex::new(PLACEHOLDER_PATTERN)?;
    Ok(regex
        .captures_iter(template)
        .map(|c| Placeholder::parse(&c[1]))
        .collect())
}

/// Where a bound value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindSource {
    /// Call argument at this index
    Parameter(usize),
    /// Field of the current element of the batched collection
    ElementField(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// 1-based marker position
    pub position: usize,
    pub name: String,
    pub source: BindSource,
    pub kind: BindKind,
}

/// Ordered binds of a compiled method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingPlan {
    bindings: Vec<Binding>,
    batch: bool,
}

impl BindingPlan {
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Binds resolve against the elements of the single collection parameter.
    pub const fn is_batch(&self) -> bool {
        self.batch
    }

    /// Placeholder names in marker order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.name.as_str())
    }
}

/// A template rewritten to positional markers, with its binding plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub sql: String,
    pub plan: BindingPlan,
}

/// Resolves every placeholder of the descriptor's template.
///
/// Names resolve against the declared parameters, or, when `batch` is set,
/// against the fields of the single collection parameter's element record.
pub fn resolve(
    descriptor: &MethodDescriptor,
    batch: bool,
    style: PlaceholderStyle,
) -> Result<ResolvedTemplate, ConfigurationError> {
    let method = descriptor.qualified_name();
    let limit = descriptor.parameters.len().max(1) * MAX_MULTIPLIER_NUMBER_PARAMETERS;
    let scope = Scope::of(descriptor, batch, &method)?;

    let mut bindings = Vec::new();
    for placeholder in placeholders(&descriptor.template)? {
        let (source, ty) = scope
            .lookup(&placeholder.name)
            .ok_or_else(|| ConfigurationError::UnknownParameter {
                method: method.clone(),
                name: placeholder.name.clone(),
            })?;
        let path = AccessPath::parse(&placeholder.modifier);
        if let Some(segment) = path.as_ref().and_then(AccessPath::unsupported_segment) {
            return Err(ConfigurationError::UnsupportedModifier {
                method,
                placeholder: format!("{}{}", placeholder.name, placeholder.modifier),
                segment: segment.to_owned(),
            });
        }
        let kind = BindKind::select(ty, path);
        bindings.push(Binding {
            position: bindings.len() + 1,
            name: placeholder.name,
            source,
            kind,
        });

        if bindings.len() > limit {
            return Err(ConfigurationError::ResolutionRunaway { method, limit });
        }
    }

    Ok(ResolvedTemplate {
        sql: build_query(&descriptor.template, style)?,
        plan: BindingPlan { bindings, batch },
    })
}

enum Scope<'d> {
    Parameters(&'d MethodDescriptor),
    Element(&'d RecordType),
}

impl<'d> Scope<'d> {
    fn of(descriptor: &'d MethodDescriptor, batch: bool, method: &str) -> Result<Self, ConfigurationError> {
        if !batch {
            return Ok(Self::Parameters(descriptor));
        }
        descriptor
            .parameters
            .first()
            .and_then(|p| p.element_type())
            .and_then(TypeRef::as_record)
            .map(Self::Element)
            .ok_or_else(|| ConfigurationError::BatchShape {
                method: method.to_owned(),
                reason: "the collection parameter's element is not a record",
            })
    }

    fn lookup(&self, name: &str) -> Option<(BindSource, &'d TypeRef)> {
        match *self {
            Self::Parameters(descriptor) => descriptor
                .parameters
                .iter()
                .position(|p| p.name == name)
                .map(|i| (BindSource::Parameter(i), &descriptor.parameters[i].declared_type)),
            Self::Element(record) => record
                .field_type(name)
                .map(|ty| (BindSource::ElementField(name.to_owned()), ty)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_single_param() {
        let result = build_query("SELECT * FROM users WHERE id = #{id}", PlaceholderStyle::Question).unwrap();
        assert_eq!(result, "SELECT * FROM users WHERE id = ?");
    }

    #[test]
    fn test_build_query_repeated_params() {
        let result = build_query(
            "SELECT * FROM users WHERE id = #{id} OR user_id = #{id}",
            PlaceholderStyle::Question,
        )
        .unwrap();
        assert_eq!(result, "SELECT * FROM users WHERE id = ? OR user_id = ?");
    }

    #[test]
    fn test_build_query_numbered() {
        let result = build_query(
            "UPDATE t SET a = #{a} WHERE id = #{id.toString()}",
            PlaceholderStyle::Numbered,
        )
        .unwrap();
        assert_eq!(result, "UPDATE t SET a = $1 WHERE id = $2");
    }

    #[test]
    fn test_build_query_no_params() {
        let result = build_query("SELECT * FROM users", PlaceholderStyle::Question).unwrap();
        assert_eq!(result, "SELECT * FROM users");
    }

    #[test]
    fn test_placeholders_split_modifier() {
        let found = placeholders("where a = #{user.address().city} and b = #{b}").unwrap();
        assert_eq!(
            found,
            vec![
                Placeholder {
                    name: "user".into(),
                    modifier: ".address().city".into()
                },
                Placeholder {
                    name: "b".into(),
                    modifier: String::new()
                },
            ]
        );
    }

    #[test]
    fn test_resolve_orders_bindings() {
        let descriptor = MethodDescriptor::select("Dao", "find", "select * from t where a = #{a} and b = #{b} or a = #{a}")
            .param("b", TypeRef::String)
            .param("a", TypeRef::int());

        let resolved = resolve(&descriptor, false, PlaceholderStyle::Question).unwrap();
        assert_eq!(resolved.sql, "select * from t where a = ? and b = ? or a = ?");
        assert_eq!(resolved.plan.names().collect::<Vec<_>>(), vec!["a", "b", "a"]);
        assert_eq!(resolved.plan.bindings()[0].source, BindSource::Parameter(1));
        assert_eq!(resolved.plan.bindings()[1].kind, BindKind::String);
        assert_eq!(resolved.plan.bindings()[2].position, 3);
        assert_eq!(resolved.sql.matches('?').count(), resolved.plan.len());
    }

    #[test]
    fn test_resolve_unknown_parameter() {
        let descriptor = MethodDescriptor::select("Dao", "find", "select * from t where a = #{missing}").param("a", TypeRef::int());
        let err = resolve(&descriptor, false, PlaceholderStyle::Question).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownParameter { ref name, .. } if name == "missing"));
    }

    #[test]
    fn test_resolve_unsupported_modifier() {
        let descriptor = MethodDescriptor::select("Dao", "find", "select * from t where a = #{name.substring(1)}")
            .param("name", TypeRef::String);
        let err = resolve(&descriptor, false, PlaceholderStyle::Question).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnsupportedModifier { ref placeholder, ref segment, .. }
                if placeholder == "name.substring(1)" && segment == "substring(1)"
        ));

        let upper = MethodDescriptor::select("Dao", "find", "select * from t where a = #{name.toUpperCase()}")
            .param("name", TypeRef::String);
        assert!(resolve(&upper, false, PlaceholderStyle::Question).is_ok());
    }

    #[test]
    fn test_resolve_batch_uses_element_fields() {
        let row = RecordType::new("Row").field("a", TypeRef::int()).field("b", TypeRef::String);
        let descriptor = MethodDescriptor::insert("Dao", "insertAll", "insert into t(a,b) values (#{a},#{b})")
            .param("rows", TypeRef::list(TypeRef::record(row)));

        let resolved = resolve(&descriptor, true, PlaceholderStyle::Question).unwrap();
        assert!(resolved.plan.is_batch());
        assert_eq!(resolved.plan.bindings()[0].source, BindSource::ElementField("a".into()));
        assert_eq!(resolved.plan.bindings()[1].kind, BindKind::String);

        let by_param_name = MethodDescriptor::insert("Dao", "insertAll", "insert into t(a) values (#{rows})")
            .param("rows", TypeRef::list(TypeRef::record(RecordType::new("Row"))));
        assert!(resolve(&by_param_name, true, PlaceholderStyle::Question).is_err());
    }

    #[test]
    fn test_resolve_runaway_guard() {
        let template = "#{a},".repeat(MAX_MULTIPLIER_NUMBER_PARAMETERS + 1);
        let descriptor = MethodDescriptor::insert("Dao", "huge", template).param("a", TypeRef::int());
        let err = resolve(&descriptor, false, PlaceholderStyle::Question).unwrap_err();
        assert!(matches!(err, ConfigurationError::ResolutionRunaway { limit: 1000, .. }));
    }
}
