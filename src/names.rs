//! Literal attribute patterns
//!
//! Validation for the lexical types used by schema and converter files:
//! `versiontype`, `nametype`, `labeltype` and `datatype`.

use crate::error::{Error, Result, SchemaError, SchemaErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum number of characters in a label
pub const MAX_LABEL_CHARS: usize = 80;

static VERSION_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+-)?[\d.]+$").unwrap());

static NAME_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^/\s\[\]]+$").unwrap());

static DATA_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").unwrap());

/// Check if a string is a valid version identifier (`(.+-)?[\d.]+`)
pub fn is_valid_version(version: &str) -> bool {
    VERSION_TYPE.is_match(version)
}

/// Check if a string is a valid element name (`[^/\s[\]]+`)
pub fn is_valid_name(name: &str) -> bool {
    NAME_TYPE.is_match(name)
}

/// Check if a string is a valid datatype token (`\w+`)
pub fn is_valid_datatype(token: &str) -> bool {
    DATA_TYPE.is_match(token)
}

/// Check if a label fits the label length limit
pub fn is_valid_label(label: &str) -> bool {
    label.chars().count() <= MAX_LABEL_CHARS
}

fn malformed(what: &str, value: &str) -> Error {
    Error::Schema(SchemaError::new(
        SchemaErrorKind::MalformedPattern,
        format!("Invalid {}: '{}'", what, value),
    ))
}

/// Validate a version identifier and return an error if invalid
pub fn validate_version(version: &str) -> Result<()> {
    if is_valid_version(version) {
        Ok(())
    } else {
        Err(malformed("version", version))
    }
}

/// Validate an element name and return an error if invalid
pub fn validate_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(malformed("name", name))
    }
}

/// Validate a datatype token and return an error if invalid
pub fn validate_datatype(token: &str) -> Result<()> {
    if is_valid_datatype(token) {
        Ok(())
    } else {
        Err(malformed("datatype", token))
    }
}

/// Validate a label and return an error if it is too long
pub fn validate_label(label: &str) -> Result<()> {
    if is_valid_label(label) {
        Ok(())
    } else {
        Err(malformed(
            &format!("label (longer than {} characters)", MAX_LABEL_CHARS),
            label,
        ))
    }
}
