//! Converter definition files
//!
//! A converter definition declares a bidirectional mapping between exactly
//! two schema versions:
//!
//! ```xml
//! <converter source="1.0" target="2.0">
//!     <links>
//!         <link source="/settings/name" target="/settings/label"/>
//!     </links>
//!     <custom>
//!         <forward>...</forward>
//!         <backward>...</backward>
//!     </custom>
//! </converter>
//! ```

use std::path::Path;

use super::base::Direction;

use crate::documents::{Document, Element};
use crate::error::{Error, Result, SchemaError, SchemaErrorKind};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::names;
use crate::paths::PathExpr;

mod converter_elements {
    pub const CONVERTER: &str = "converter";
    pub const LINKS: &str = "links";
    pub const LINK: &str = "link";
    pub const CUSTOM: &str = "custom";
    pub const FORWARD: &str = "forward";
    pub const BACKWARD: &str = "backward";
}

mod converter_attrs {
    pub const SOURCE: &str = "source";
    pub const TARGET: &str = "target";
}

/// A declared path correspondence between two versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionLink {
    /// Path in the source-version document
    pub source: PathExpr,
    /// Path in the target-version document
    pub target: PathExpr,
}

impl ConversionLink {
    /// Create a link from two path strings
    pub fn new(source: &str, target: &str) -> Result<Self> {
        Ok(Self {
            source: PathExpr::parse(source)?,
            target: PathExpr::parse(target)?,
        })
    }

    /// The same link read in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

/// Parsed converter definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterDefinition {
    source_version: String,
    target_version: String,
    links: Vec<ConversionLink>,
    forward: Option<String>,
    backward: Option<String>,
}

impl ConverterDefinition {
    /// Create a definition without links or custom code
    pub fn new(source_version: impl Into<String>, target_version: impl Into<String>) -> Result<Self> {
        let source_version = source_version.into();
        let target_version = target_version.into();
        names::validate_version(&source_version)?;
        names::validate_version(&target_version)?;
        Ok(Self {
            source_version,
            target_version,
            links: Vec::new(),
            forward: None,
            backward: None,
        })
    }

    /// Append a link
    pub fn with_link(mut self, link: ConversionLink) -> Self {
        self.links.push(link);
        self
    }

    /// Set the forward custom code
    pub fn with_forward_code(mut self, code: impl Into<String>) -> Self {
        self.forward = Some(code.into());
        self
    }

    /// Set the backward custom code
    pub fn with_backward_code(mut self, code: impl Into<String>) -> Self {
        self.backward = Some(code.into());
        self
    }

    /// Parse a definition from a string
    pub fn from_string(text: &str) -> Result<Self> {
        Self::load(text, &Limits::default())
    }

    /// Parse a definition from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_location(&Location::path(path), &Limits::default())
    }

    /// Parse a definition from a location
    pub fn from_location(location: &Location, limits: &Limits) -> Result<Self> {
        let text = Loader::new().with_limits(limits.clone()).load(location)?;
        Self::load(&text, limits)
    }

    /// Parse a definition from text
    pub fn load(text: &str, limits: &Limits) -> Result<Self> {
        let doc = Document::parse(text.as_bytes(), limits).map_err(|e| match e {
            Error::Xml(msg) => Error::Schema(SchemaError::new(SchemaErrorKind::MalformedXml, msg)),
            other => other,
        })?;
        let root = doc.root().ok_or_else(|| {
            Error::Schema(SchemaError::new(
                SchemaErrorKind::MalformedXml,
                "Converter document has no root element",
            ))
        })?;
        Self::from_element(root)
    }

    /// Build a definition from a parsed `converter` element
    pub fn from_element(root: &Element) -> Result<Self> {
        if root.local_name() != converter_elements::CONVERTER {
            return Err(Error::Schema(SchemaError::new(
                SchemaErrorKind::MalformedXml,
                format!(
                    "Converter root must be a '{}' node, found '{}'",
                    converter_elements::CONVERTER,
                    root.local_name()
                ),
            )));
        }
        let source = required(root, converter_attrs::SOURCE, "/")?;
        let target = required(root, converter_attrs::TARGET, "/")?;
        let mut definition = Self::new(source, target)?;

        for (i, link) in root
            .find_children(converter_elements::LINKS)
            .flat_map(|links| links.find_children(converter_elements::LINK))
            .enumerate()
        {
            let location = format!("/links/link[{}]", i);
            let source = required(link, converter_attrs::SOURCE, &location)?;
            let target = required(link, converter_attrs::TARGET, &location)?;
            let link = ConversionLink::new(source, target).map_err(|e| {
                Error::Schema(
                    SchemaError::new(SchemaErrorKind::MalformedPattern, e.to_string())
                        .with_location(location.clone()),
                )
            })?;
            definition.links.push(link);
        }

        if let Some(custom) = root.find_child(converter_elements::CUSTOM) {
            definition.forward = code_block(custom, converter_elements::FORWARD);
            definition.backward = code_block(custom, converter_elements::BACKWARD);
        }

        tracing::debug!(
            source = %definition.source_version,
            target = %definition.target_version,
            links = definition.links.len(),
            forward = definition.forward.is_some(),
            backward = definition.backward.is_some(),
            "converter loaded"
        );
        Ok(definition)
    }

    /// The version converted from in the forward direction
    pub fn source_version(&self) -> &str {
        &self.source_version
    }

    /// The version converted to in the forward direction
    pub fn target_version(&self) -> &str {
        &self.target_version
    }

    /// Declared links in declaration order
    pub fn links(&self) -> &[ConversionLink] {
        &self.links
    }

    /// Forward custom code, if declared
    pub fn forward_code(&self) -> Option<&str> {
        self.forward.as_deref()
    }

    /// Backward custom code, if declared
    pub fn backward_code(&self) -> Option<&str> {
        self.backward.as_deref()
    }

    /// (from, to) versions for a direction
    pub fn versions(&self, direction: Direction) -> (&str, &str) {
        match direction {
            Direction::Forward => (&self.source_version, &self.target_version),
            Direction::Backward => (&self.target_version, &self.source_version),
        }
    }

    /// Links read in a direction: backward links have their sides swapped
    pub fn links_for(&self, direction: Direction) -> Vec<ConversionLink> {
        match direction {
            Direction::Forward => self.links.clone(),
            Direction::Backward => self.links.iter().map(ConversionLink::reversed).collect(),
        }
    }

    /// Custom code for a direction
    pub fn code_for(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Forward => self.forward_code(),
            Direction::Backward => self.backward_code(),
        }
    }
}

fn required<'a>(element: &'a Element, name: &str, location: &str) -> Result<&'a str> {
    element.get_attribute(name).ok_or_else(|| {
        Error::Schema(
            SchemaError::new(
                SchemaErrorKind::MissingRequiredAttribute,
                format!("'{}' has no '{}' attribute", element.local_name(), name),
            )
            .with_location(location),
        )
    })
}

fn code_block(custom: &Element, name: &str) -> Option<String> {
    custom
        .find_child(name)
        .and_then(|e| e.text.as_deref())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}
