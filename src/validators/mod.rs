//! Schema model and validators
//!
//! This module contains the schema loader, the template and link resolver,
//! and the document validator.

pub mod elements;
pub mod parsing;
pub mod resolver;
pub mod schemas;
pub mod validation;

// Re-exports
pub use elements::{
    ConditionNode, ConditionType, DatatypeRef, ElementAttributes, ElementDefinition, Occurs,
    OptionDefinition,
};
pub use resolver::Resolver;
pub use schemas::{LinkRef, RawId, RawKind, RawNode, ResolvedSchema, Schema, SchemaOptions};
pub use validation::{ValidationContext, ValidationOptions, Validator};
