//! Limits and constraints for store processing
//!
//! Schemas, converters and value files are runtime data. These limits bound
//! the resources a single load, resolution or document may consume.

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum XML text size in bytes
    pub max_xml_size: usize,

    /// Maximum element nesting depth of a schema or values file
    pub max_schema_depth: usize,

    /// Maximum length of a link chain followed during resolution
    pub max_link_depth: usize,

    /// Maximum number of nodes in one document tree
    pub max_document_nodes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_schema_depth: 256,
            max_link_depth: 64,
            max_document_nodes: 1_000_000,
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_schema_depth: 32,
            max_link_depth: 16,
            max_document_nodes: 10_000,
        }
    }

    /// Create permissive limits (less restrictive, use with caution)
    pub fn permissive() -> Self {
        Self {
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_schema_depth: 4096,
            max_link_depth: 1024,
            max_document_nodes: 100_000_000,
        }
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }

    /// Check if element nesting depth is within limits
    pub fn check_schema_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_schema_depth {
            Err(Error::LimitExceeded(format!(
                "Nesting depth {} exceeds maximum {}",
                depth, self.max_schema_depth
            )))
        } else {
            Ok(())
        }
    }

    /// Check if a link chain is within limits
    pub fn check_link_depth(&self, depth: usize) -> bool {
        depth <= self.max_link_depth
    }

    /// Check if the number of document nodes is within limits
    pub fn check_document_nodes(&self, count: usize) -> Result<()> {
        if count > self.max_document_nodes {
            Err(Error::LimitExceeded(format!(
                "Document node count {} exceeds maximum {}",
                count, self.max_document_nodes
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_schema_depth, 256);
        assert!(limits.check_schema_depth(100).is_ok());
        assert!(limits.check_schema_depth(300).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_link_depth < Limits::default().max_link_depth);
        assert!(!limits.check_link_depth(17));
    }

    #[test]
    fn test_permissive_limits() {
        let limits = Limits::permissive();
        assert!(limits.max_document_nodes > Limits::default().max_document_nodes);
        assert!(limits.check_document_nodes(5_000_000).is_ok());
    }

    #[test]
    fn test_check_xml_size() {
        let limits = Limits::default();
        assert!(limits.check_xml_size(1024).is_ok());
        assert!(limits.check_xml_size(200 * 1024 * 1024).is_err());
    }
}
