use crate::types::TypeRef;

/// Semantic shape of a method result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    Void,
    /// Non-nullable single value; never materialized as null
    Scalar,
    /// Nullable single value
    BoxedScalar,
    Optional,
    List,
    Set,
}

impl ReturnKind {
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::List | Self::Set)
    }

    /// Kinds a field-filler method may return.
    pub const fn is_field_filling(self) -> bool {
        matches!(self, Self::Optional | Self::List | Self::Set)
    }

    pub const fn is_scalar(self) -> bool {
        matches!(self, Self::Scalar | Self::BoxedScalar)
    }

    pub const fn is_optional(self) -> bool {
        matches!(self, Self::Optional)
    }
}

/// A classified result type: its kind and the type each produced value has.
///
/// For container kinds `element` is the contained type, otherwise it is the
/// target type itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnShape {
    pub kind: ReturnKind,
    pub element: TypeRef,
}

/// Maps a target type to its return kind.
///
/// Types outside the six supported shapes classify as `Void`; the compiler
/// reports them as unsupported when the target is not the unit type.
pub fn classify(ty: &TypeRef) -> ReturnShape {
    let (kind, element) = match ty {
        TypeRef::Unit => (ReturnKind::Void, ty),
        TypeRef::Primitive(_) => (ReturnKind::Scalar, ty),
        TypeRef::Boxed(_) => (ReturnKind::BoxedScalar, ty),
        TypeRef::Optional(inner) => (ReturnKind::Optional, inner.as_ref()),
        TypeRef::List(inner) => (ReturnKind::List, inner.as_ref()),
        TypeRef::Set(inner) => (ReturnKind::Set, inner.as_ref()),
        TypeRef::String
        | TypeRef::Uuid
        | TypeRef::Timestamp
        | TypeRef::Time
        | TypeRef::Enum(_)
        | TypeRef::Record(_) => (ReturnKind::Void, ty),
    };
    ReturnShape {
        kind,
        element: element.clone(),
    }
}

/// True when values of `ty` are read straight from a single column.
pub fn is_flat(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Primitive(_)
        | TypeRef::Boxed(_)
        | TypeRef::String
        | TypeRef::Uuid
        | TypeRef::Timestamp
        | TypeRef::Time
        | TypeRef::Enum(_) => true,
        TypeRef::Unit
        | TypeRef::Record(_)
        | TypeRef::Optional(_)
        | TypeRef::List(_)
        | TypeRef::Set(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnumType, Primitive, RecordType};

    fn person() -> TypeRef {
        TypeRef::record(RecordType::new("Person").field("name", TypeRef::String))
    }

    #[test]
    fn test_classify_scalars() {
        assert_eq!(classify(&TypeRef::Unit).kind, ReturnKind::Void);
        assert_eq!(classify(&TypeRef::long()).kind, ReturnKind::Scalar);
        assert_eq!(
            classify(&TypeRef::Boxed(Primitive::Long)).kind,
            ReturnKind::BoxedScalar
        );
    }

    #[test]
    fn test_classify_containers_expose_element() {
        let shape = classify(&TypeRef::list(person()));
        assert_eq!(shape.kind, ReturnKind::List);
        assert_eq!(shape.element, person());

        let shape = classify(&TypeRef::set(TypeRef::String));
        assert_eq!(shape.kind, ReturnKind::Set);
        assert_eq!(shape.element, TypeRef::String);

        let shape = classify(&TypeRef::optional(person()));
        assert_eq!(shape.kind, ReturnKind::Optional);
        assert!(shape.kind.is_field_filling());
    }

    #[test]
    fn test_unsupported_shapes_fall_back_to_void() {
        assert_eq!(classify(&person()).kind, ReturnKind::Void);
        assert_eq!(classify(&TypeRef::String).kind, ReturnKind::Void);
    }

    #[test]
    fn test_flat_types() {
        assert!(is_flat(&TypeRef::Uuid));
        assert!(is_flat(&TypeRef::enumeration(EnumType::new(
            "Color",
            ["RED"]
        ))));
        assert!(!is_flat(&person()));
        assert!(!is_flat(&TypeRef::list(TypeRef::int())));
    }
}
