use crate::classify::ReturnKind;
use crate::method::Stage;
use crate::value::ValueTypeError;

/// Boxed error of driver, accessor and converter implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boxed error reported by a driver implementation.
pub type DriverError = BoxError;

/// Result type alias for driver primitives
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Malformed method descriptors, rejected when a method is registered.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Error while compiling the placeholder pattern
    #[error("Failed to parse SQL template: {0}")]
    Parse(#[from] regex::Error),

    #[error("Request template of `{method}` is blank but the method returns a value")]
    BlankTemplate { method: String },

    /// Placeholder name does not match any declared parameter or element field
    #[error("Can't find parameter '{name}' referenced by `{method}`")]
    UnknownParameter { method: String, name: String },

    #[error("Placeholder `{placeholder}` of `{method}` uses unsupported accessor `{segment}`")]
    UnsupportedModifier {
        method: String,
        placeholder: String,
        segment: String,
    },

    #[error("Placeholder resolution of `{method}` exceeded {limit} binds")]
    ResolutionRunaway { method: String, limit: usize },

    #[error("`{method}` cannot run as a batch: {reason}")]
    BatchShape { method: String, reason: &'static str },

    #[error("Field filler `{method}` must take exactly one parameter (the search id), found {found}")]
    FieldFillerArity { method: String, found: usize },

    #[error("Field filler `{method}` must return Optional, List or Set, found {kind:?}")]
    FieldFillerKind { method: String, kind: ReturnKind },

    #[error("`{method}` returns unsupported type {ty}")]
    UnsupportedReturn { method: String, ty: String },

    #[error("Method `{0}` is registered twice")]
    DuplicateMethod(String),

    #[error("Field `{field}` of `{method}` points at unknown accessor `{accessor}`")]
    UnknownAccessor {
        method: String,
        field: String,
        accessor: String,
    },

    #[error("Converter `{converter}` used by field `{field}` of `{method}` is not registered")]
    UnknownConverter {
        method: String,
        field: String,
        converter: String,
    },
}

/// Error types for sqlx-named-mapper
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A required relation or a non-optional scalar resolved to nothing
    #[error("Required value is absent in `{method}`: {detail}")]
    RequiredValueAbsent { method: String, detail: String },

    /// Failure reported by the underlying connection or statement
    #[error("Database error in `{method}` ({stage}): {source}")]
    DataAccess {
        method: String,
        stage: Stage,
        #[source]
        source: DriverError,
    },

    #[error("All parameters of `{method}` are null")]
    AllParametersAbsent { method: String },

    #[error("Bind {position} of `{method}` expects {expected}, got {found}")]
    TypeMismatch {
        method: String,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{method}` expects {expected} argument(s), got {found}")]
    ArgumentCount {
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("No accessor registered as `{0}`")]
    UnknownAccessor(String),

    #[error("Cannot apply `{path}` to {found}")]
    InvalidAccessPath { path: String, found: &'static str },

    /// Converter failure or a column value outside the declared enum
    #[error("Conversion of `{field}` failed: {detail}")]
    Conversion { field: String, detail: String },

    #[error("Unexpected value: {0}")]
    Value(#[from] ValueTypeError),
}

impl Error {
    /// True for errors raised while validating a descriptor.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub(crate) fn data_access(method: &str, stage: Stage) -> impl FnOnce(DriverError) -> Self + '_ {
        move |source| Self::DataAccess {
            method: method.to_owned(),
            stage,
            source,
        }
    }
}

/// Result type alias for sqlx-named-mapper operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
