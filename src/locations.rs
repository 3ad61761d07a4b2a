//! Resource location resolution
//!
//! This module describes where schema, converter and values text comes from.

use std::path::{Path, PathBuf};

/// Resource location - a file path or in-memory text
#[derive(Debug, Clone)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// In-memory XML text
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    ///
    /// Text that starts with `<` is treated as inline XML, anything else as a path.
    pub fn parse(s: &str) -> Self {
        if s.trim_start().starts_with('<') {
            Location::String(s.to_string())
        } else {
            Location::Path(PathBuf::from(s))
        }
    }

    /// Create a file location
    pub fn path(path: impl AsRef<Path>) -> Self {
        Location::Path(path.as_ref().to_path_buf())
    }

    /// Get a short description of the location for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::String(_) => "<inline>".to_string(),
        }
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Location::parse(s)
    }
}

impl From<PathBuf> for Location {
    fn from(p: PathBuf) -> Self {
        Location::Path(p)
    }
}
