//! Version converters
//!
//! This module converts documents between schema versions using converter
//! definitions: declarative path links plus optional custom code per
//! direction.
//!
//! - [`ConverterDefinition`]: the parsed `converter` file
//! - [`VersionConverter`]: the two-phase conversion (links, then custom code)
//! - [`ScriptEngine`]: the host-provided runner for custom code

mod base;
mod definition;
mod script;

pub use base::{ConversionOptions, Direction, VersionConverter, DEFAULT_SCRIPT_TIMEOUT};
pub use definition::{ConversionLink, ConverterDefinition};
pub use script::{run_script, NoScriptEngine, ScriptContext, ScriptEngine};
