//! Error types for xmlstore
//!
//! This module defines all error types used throughout the library.
//! Structural errors ([`SchemaError`], [`LinkError`]) halt all use of a schema
//! version; per-document errors ([`ValidationError`], [`ConversionError`]) are
//! isolated to one document and carry enough path/version context to locate
//! the offending node.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias using xmlstore Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xmlstore operations
#[derive(Error, Debug)]
pub enum Error {
    /// Schema could not be loaded
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Template/link resolution failed
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Condition could not be evaluated
    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),

    /// Document conversion failed
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Invalid operation on a document tree (unknown path, occurrence limits, ...)
    #[error("document error: {0}")]
    Document(String),

    /// Value error (value cannot be represented in the requested type)
    #[error("value error: {0}")]
    Value(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),
}

/// Kind of a fatal schema load error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// An attribute does not match its literal pattern
    MalformedPattern,
    /// Two templates in the same scope share an id
    DuplicateTemplateId,
    /// maxOccurs is smaller than minOccurs, or an occurs value is not a count
    InvalidOccursRange,
    /// A required attribute is absent
    MissingRequiredAttribute,
    /// Two siblings (after flattening group-only elements) share a name
    DuplicateSiblingName,
    /// `version` appears on a non-root element
    VersionNotOnRoot,
    /// Datatype token is neither a base datatype nor a configured alias
    UnknownDatatype,
    /// Condition has an unknown type or is missing its operands
    InvalidCondition,
    /// The schema text is not well-formed or has the wrong root
    MalformedXml,
}

impl SchemaErrorKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaErrorKind::MalformedPattern => "MalformedPattern",
            SchemaErrorKind::DuplicateTemplateId => "DuplicateTemplateId",
            SchemaErrorKind::InvalidOccursRange => "InvalidOccursRange",
            SchemaErrorKind::MissingRequiredAttribute => "MissingRequiredAttribute",
            SchemaErrorKind::DuplicateSiblingName => "DuplicateSiblingName",
            SchemaErrorKind::VersionNotOnRoot => "VersionNotOnRoot",
            SchemaErrorKind::UnknownDatatype => "UnknownDatatype",
            SchemaErrorKind::InvalidCondition => "InvalidCondition",
            SchemaErrorKind::MalformedXml => "MalformedXml",
        }
    }
}

/// Fatal error raised while loading a schema or converter definition
#[derive(Debug, Clone)]
pub struct SchemaError {
    /// Error kind
    pub kind: SchemaErrorKind,
    /// Error message
    pub message: String,
    /// Schema path of the offending element (e.g. `/root/settings/name`)
    pub location: Option<String>,
}

impl SchemaError {
    /// Create a new schema error
    pub fn new(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let Some(ref loc) = self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

/// Kind of a link resolution error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    /// A link expands (directly or transitively) into itself
    CyclicLink,
    /// No template with the referenced id is visible from the link
    UnresolvedTemplate,
    /// The referenced path does not lead to an element
    UnresolvedPath,
    /// Both `template` and `path` were given
    AmbiguousSource,
    /// Neither `template` nor `path` was given and the link does not define an element
    MissingSource,
    /// The link chain is deeper than the configured limit
    DepthExceeded,
}

impl LinkErrorKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkErrorKind::CyclicLink => "CyclicLink",
            LinkErrorKind::UnresolvedTemplate => "UnresolvedTemplate",
            LinkErrorKind::UnresolvedPath => "UnresolvedPath",
            LinkErrorKind::AmbiguousSource => "AmbiguousSource",
            LinkErrorKind::MissingSource => "MissingSource",
            LinkErrorKind::DepthExceeded => "DepthExceeded",
        }
    }
}

/// Fatal error raised while resolving templates and links
#[derive(Debug, Clone)]
pub struct LinkError {
    /// Error kind
    pub kind: LinkErrorKind,
    /// Schema path of the link being resolved
    pub link_path: String,
    /// The template id or path the link refers to
    pub target: Option<String>,
}

impl LinkError {
    /// Create a new link error
    pub fn new(kind: LinkErrorKind, link_path: impl Into<String>) -> Self {
        Self {
            kind,
            link_path: link_path.into(),
            target: None,
        }
    }

    /// Set the link target
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] link at {}", self.kind.as_str(), self.link_path)?;
        if let Some(ref target) = self.target {
            write!(f, " -> '{}'", target)?;
        }
        Ok(())
    }
}

impl std::error::Error for LinkError {}

/// Kind of a per-node validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValidationErrorKind {
    /// Value cannot be coerced to the declared datatype
    TypeMismatch,
    /// Value lies outside the inclusive bounds
    OutOfRange,
    /// Fewer occurrences than minOccurs
    MissingRequiredOccurrence,
    /// More occurrences than maxOccurs
    TooManyOccurrences,
    /// Value is not one of the declared options
    UnknownOptionValue,
    /// Value selects an option marked as disabled
    DisabledOption,
    /// A visible leaf has no value (only with `require_values`)
    MissingValue,
}

impl ValidationErrorKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::TypeMismatch => "TypeMismatch",
            ValidationErrorKind::OutOfRange => "OutOfRange",
            ValidationErrorKind::MissingRequiredOccurrence => "MissingRequiredOccurrence",
            ValidationErrorKind::TooManyOccurrences => "TooManyOccurrences",
            ValidationErrorKind::UnknownOptionValue => "UnknownOptionValue",
            ValidationErrorKind::DisabledOption => "DisabledOption",
            ValidationErrorKind::MissingValue => "MissingValue",
        }
    }
}

/// Document validation error with context
///
/// Serializes to JSON so validation reports can be handed to other tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Error kind
    pub kind: ValidationErrorKind,
    /// Error message
    pub message: String,
    /// Path to the node that failed validation
    pub path: String,
    /// Expected value, type or bound
    pub expected: Option<String>,
    /// Actual value found
    pub actual: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(kind: ValidationErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: path.into(),
            expected: None,
            actual: None,
        }
    }

    /// Set expected value
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    /// Set actual value
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.path, self.message)?;
        if let Some(ref expected) = self.expected {
            write!(f, "\nExpected: {}", expected)?;
        }
        if let Some(ref actual) = self.actual {
            write!(f, "\nActual: {}", actual)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Kind of a condition evaluation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionErrorKind {
    /// The variable path does not lead to a node
    UnresolvedVariable,
    /// The condition names a store that is not registered
    UnknownStore,
}

/// Condition evaluation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionError {
    /// Error kind
    pub kind: ConditionErrorKind,
    /// The variable path (for unresolved variables)
    pub variable: Option<String>,
    /// The store name (for unknown stores)
    pub store: Option<String>,
}

impl ConditionError {
    /// An unresolved variable path
    pub fn unresolved_variable(variable: impl Into<String>) -> Self {
        Self {
            kind: ConditionErrorKind::UnresolvedVariable,
            variable: Some(variable.into()),
            store: None,
        }
    }

    /// An unknown attached store
    pub fn unknown_store(store: impl Into<String>) -> Self {
        Self {
            kind: ConditionErrorKind::UnknownStore,
            variable: None,
            store: Some(store.into()),
        }
    }
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConditionErrorKind::UnresolvedVariable => write!(
                f,
                "cannot resolve condition variable '{}'",
                self.variable.as_deref().unwrap_or_default()
            ),
            ConditionErrorKind::UnknownStore => write!(
                f,
                "condition refers to unknown store '{}'",
                self.store.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl std::error::Error for ConditionError {}

/// Kind of a conversion failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionErrorKind {
    /// A value cannot be converted between the source and target datatypes
    UnsupportedTypeCoercion,
    /// The custom transformation code failed, timed out or is not executable
    CustomCodeFailure,
    /// The converted document does not validate against the target schema
    TargetValidationFailed,
    /// No converter (direct or chained) connects the two versions
    NoRoute,
    /// A document or schema does not carry the version the converter expects
    VersionMismatch,
    /// A converter link addresses a path the schemas cannot connect
    InvalidLink,
}

impl ConversionErrorKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionErrorKind::UnsupportedTypeCoercion => "UnsupportedTypeCoercion",
            ConversionErrorKind::CustomCodeFailure => "CustomCodeFailure",
            ConversionErrorKind::TargetValidationFailed => "TargetValidationFailed",
            ConversionErrorKind::NoRoute => "NoRoute",
            ConversionErrorKind::VersionMismatch => "VersionMismatch",
            ConversionErrorKind::InvalidLink => "InvalidLink",
        }
    }
}

/// Per-document conversion failure; the partial target is always discarded
#[derive(Debug, Clone)]
pub struct ConversionError {
    /// Error kind
    pub kind: ConversionErrorKind,
    /// Error message
    pub message: String,
    /// Version converted from
    pub source_version: Option<String>,
    /// Version converted to
    pub target_version: Option<String>,
    /// Path of the offending node, if any
    pub path: Option<String>,
    /// Target validation errors (for `TargetValidationFailed`)
    pub validation_errors: Vec<ValidationError>,
}

impl ConversionError {
    /// Create a new conversion error
    pub fn new(kind: ConversionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_version: None,
            target_version: None,
            path: None,
            validation_errors: Vec::new(),
        }
    }

    /// Set the source and target versions
    pub fn with_versions(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_version = Some(source.into());
        self.target_version = Some(target.into());
        self
    }

    /// Set the node path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach target validation errors
    pub fn with_validation_errors(mut self, errors: Vec<ValidationError>) -> Self {
        self.validation_errors = errors;
        self
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if let (Some(src), Some(tgt)) = (&self.source_version, &self.target_version) {
            write!(f, " ({} -> {})", src, tgt)?;
        }
        if let Some(ref path) = self.path {
            write!(f, "\nPath: {}", path)?;
        }
        for err in &self.validation_errors {
            write!(f, "\n  {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConversionError {}
