//! # xmlstore
//!
//! Typed, versioned, hierarchical configuration stores described by XML
//! schemas, with converters between schema versions.
//!
//! ## Features
//!
//! - Schema loading with templates and links (element reuse with overrides)
//! - Typed values (`string`, `int`, `float`, `bool`, `datetime`, `duration`)
//!   with inclusive bounds and predefined options
//! - Conditional visibility, including conditions on attached stores
//! - Collect-all document validation with node paths
//! - Version conversion: declarative links plus optional custom code, in both
//!   directions, chained across versions by a [`SchemaCatalog`]
//! - Values files in XML and JSON export
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xmlstore::{load_schema, resolve_schema, Document};
//!
//! let schema = Arc::new(resolve_schema(&load_schema(text)?)?);
//! let mut doc = Document::new(schema);
//! doc.set_value("/settings/name", "Run A")?;
//! assert!(doc.validate().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules - foundation
pub mod error;
pub mod limits;

// Core modules - utilities
pub mod names;
pub mod locations;
pub mod paths;
pub mod datatypes;

// Core modules - resource loading
pub mod loaders;
pub mod documents;

// Schema model, resolution and validation
pub mod validators;

// Document instances and conditions
pub mod store;
pub mod conditions;

// Version conversion
pub mod converters;
pub mod catalog;

// Re-exports for convenience
pub use catalog::SchemaCatalog;
pub use conditions::{evaluate_condition, ConditionEvaluator, ConditionPolicy};
pub use converters::{ConversionOptions, ConverterDefinition, Direction, ScriptEngine, VersionConverter};
pub use datatypes::{BaseDataType, TypedValue};
pub use error::{Error, Result};
pub use paths::{NodePath, PathExpr};
pub use store::{Document, DocumentNode, StoreRegistry};
pub use validators::{ElementDefinition, ResolvedSchema, Schema, SchemaOptions, ValidationOptions};

/// Version of the xmlstore library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load a schema from text with default options
pub fn load_schema(text: &str) -> Result<Schema> {
    Schema::from_string(text)
}

/// Resolve every template and link of a schema
pub fn resolve_schema(schema: &Schema) -> Result<ResolvedSchema> {
    schema.resolve()
}

/// Validate a document against a schema, collecting every violation
pub fn validate_document(document: &Document, schema: &ResolvedSchema) -> Vec<error::ValidationError> {
    schema.validate(document)
}

/// Convert a document from the converter's source version to its target version
pub fn convert_forward(converter: &VersionConverter, document: &Document) -> Result<Document> {
    converter.forward(document)
}

/// Convert a document from the converter's target version back to its source version
pub fn convert_backward(converter: &VersionConverter, document: &Document) -> Result<Document> {
    converter.backward(document)
}
