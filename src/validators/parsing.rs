//! Schema document parsing
//!
//! This module reads schema text into the unresolved [`Schema`] arena. All
//! literal patterns and load-time invariants are checked here; any violation
//! rejects the whole schema.

use std::path::Path;

use super::elements::{
    ConditionNode, ConditionType, DatatypeRef, ElementAttributes, OptionDefinition,
};
use super::schemas::{LinkRef, RawId, RawKind, RawNode, Schema, SchemaOptions};

use crate::documents::{Document, Element};
use crate::error::{Error, LinkError, LinkErrorKind, Result, SchemaError, SchemaErrorKind};
use crate::loaders::Loader;
use crate::locations::Location;
use crate::names;
use crate::paths::PathExpr;

/// Schema node local names
mod schema_elements {
    pub const ELEMENT: &str = "element";
    pub const TEMPLATE: &str = "template";
    pub const LINK: &str = "link";
    pub const CONDITION: &str = "condition";
    pub const OPTIONS: &str = "options";
    pub const OPTION: &str = "option";
}

/// Schema attribute names
mod schema_attrs {
    pub const NAME: &str = "name";
    pub const LABEL: &str = "label";
    pub const DESCRIPTION: &str = "description";
    pub const UNIT: &str = "unit";
    pub const TYPE: &str = "type";
    pub const MIN_INCLUSIVE: &str = "minInclusive";
    pub const MAX_INCLUSIVE: &str = "maxInclusive";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const GROUPONLY: &str = "grouponly";
    pub const HIDDEN: &str = "hidden";
    pub const EDITABLE: &str = "editable";
    pub const VERSION: &str = "version";
    pub const ID: &str = "id";
    pub const TEMPLATE: &str = "template";
    pub const PATH: &str = "path";
    pub const VARIABLE: &str = "variable";
    pub const VALUE: &str = "value";
    pub const SOURCE: &str = "source";
    pub const DISABLED: &str = "disabled";
}

/// Literal of presence-only flags
const FLAG_TRUE: &str = "True";

impl Schema {
    /// Load a schema from a string with default options
    pub fn from_string(text: &str) -> Result<Self> {
        Self::load(text, &SchemaOptions::default())
    }

    /// Load a schema from a file with default options
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_location(&Location::path(path), &SchemaOptions::default())
    }

    /// Load a schema from a location
    pub fn from_location(location: &Location, options: &SchemaOptions) -> Result<Self> {
        let loader = Loader::new().with_limits(options.limits().clone());
        let text = loader.load(location)?;
        Self::load(&text, options)
    }

    /// Load a schema from text
    pub fn load(text: &str, options: &SchemaOptions) -> Result<Self> {
        let doc = Document::parse(text.as_bytes(), options.limits()).map_err(|e| match e {
            Error::Xml(msg) => Error::Schema(SchemaError::new(SchemaErrorKind::MalformedXml, msg)),
            other => other,
        })?;
        let root = doc.root().ok_or_else(|| {
            Error::Schema(SchemaError::new(
                SchemaErrorKind::MalformedXml,
                "Schema document has no root element",
            ))
        })?;
        Self::from_element(root, options)
    }

    /// Build a schema from a parsed root element
    pub fn from_element(root: &Element, options: &SchemaOptions) -> Result<Self> {
        if root.local_name() != schema_elements::ELEMENT {
            return Err(Error::Schema(SchemaError::new(
                SchemaErrorKind::MalformedXml,
                format!(
                    "Schema root must be an '{}' node, found '{}'",
                    schema_elements::ELEMENT,
                    root.local_name()
                ),
            )));
        }
        let version = root.get_attribute(schema_attrs::VERSION).ok_or_else(|| {
            Error::Schema(
                SchemaError::new(
                    SchemaErrorKind::MissingRequiredAttribute,
                    "Schema root has no 'version' attribute",
                )
                .with_location("/"),
            )
        })?;
        names::validate_version(version).map_err(|e| locate(e, "/"))?;

        let mut parser = SchemaParser {
            options,
            nodes: Vec::new(),
        };
        parser.parse_node(root, RawKind::Element, None, "/".to_string())?;

        let schema = Schema {
            version: version.to_string(),
            nodes: parser.nodes,
            options: options.clone(),
        };
        tracing::debug!(
            version = %schema.version,
            nodes = schema.node_count(),
            templates = schema.template_count(),
            links = schema.link_count(),
            "schema loaded"
        );
        Ok(schema)
    }
}

struct SchemaParser<'a> {
    options: &'a SchemaOptions,
    nodes: Vec<RawNode>,
}

impl SchemaParser<'_> {
    fn parse_node(
        &mut self,
        elem: &Element,
        kind: RawKind,
        parent: Option<RawId>,
        location: String,
    ) -> Result<RawId> {
        let is_root = parent.is_none();
        let is_element = kind == RawKind::Element;
        let id = self.nodes.len();
        self.nodes.push(RawNode::new(kind, parent, location.clone()));

        let attrs = self.parse_attributes(elem, is_root, &location)?;
        if is_element && attrs.name.is_none() {
            return Err(missing_attribute(schema_attrs::NAME, &location));
        }
        self.nodes[id].attrs = attrs;

        for child in &elem.children {
            match child.local_name() {
                schema_elements::ELEMENT => {
                    let name = child.get_attribute(schema_attrs::NAME).unwrap_or_default();
                    let child_location = join_location(&location, name);
                    let child_id =
                        self.parse_node(child, RawKind::Element, Some(id), child_location)?;
                    self.nodes[id].children.push(child_id);
                }
                schema_elements::LINK => {
                    let link = parse_link_ref(child, &location)?;
                    let label = child
                        .get_attribute(schema_attrs::NAME)
                        .or_else(|| child.get_attribute(schema_attrs::TEMPLATE))
                        .or_else(|| child.get_attribute(schema_attrs::PATH))
                        .unwrap_or_default();
                    let child_location = join_location(&location, &format!("link[{}]", label));
                    let child_id =
                        self.parse_node(child, RawKind::Link(link), Some(id), child_location)?;
                    self.nodes[id].children.push(child_id);
                }
                schema_elements::TEMPLATE => {
                    let template_id = child
                        .get_attribute(schema_attrs::ID)
                        .ok_or_else(|| missing_attribute(schema_attrs::ID, &location))?
                        .to_string();
                    if self.nodes[id].templates.contains_key(&template_id) {
                        return Err(Error::Schema(
                            SchemaError::new(
                                SchemaErrorKind::DuplicateTemplateId,
                                format!("Template id '{}' is declared twice in this scope", template_id),
                            )
                            .with_location(location.clone()),
                        ));
                    }
                    let child_location =
                        join_location(&location, &format!("template[{}]", template_id));
                    let child_id = self.parse_node(
                        child,
                        RawKind::Template {
                            id: template_id.clone(),
                        },
                        Some(id),
                        child_location,
                    )?;
                    self.nodes[id].templates.insert(template_id, child_id);
                }
                schema_elements::CONDITION => {
                    if self.nodes[id].condition.is_some() {
                        return Err(invalid_condition("More than one condition on an element", &location));
                    }
                    let condition = parse_condition(child, &location)?;
                    self.nodes[id].condition = Some(condition);
                }
                schema_elements::OPTIONS => {
                    let options = parse_options(child, &location)?;
                    self.nodes[id].options.extend(options);
                }
                other => {
                    tracing::debug!(tag = other, location = %location, "ignoring unknown schema node");
                }
            }
        }

        Ok(id)
    }

    fn parse_attributes(
        &self,
        elem: &Element,
        is_root: bool,
        location: &str,
    ) -> Result<ElementAttributes> {
        let mut attrs = ElementAttributes::default();

        if let Some(name) = elem.get_attribute(schema_attrs::NAME) {
            names::validate_name(name).map_err(|e| locate(e, location))?;
            attrs.name = Some(name.to_string());
        }
        if let Some(label) = elem.get_attribute(schema_attrs::LABEL) {
            names::validate_label(label).map_err(|e| locate(e, location))?;
            attrs.label = Some(label.to_string());
        }
        attrs.description = elem.get_attribute(schema_attrs::DESCRIPTION).map(str::to_string);
        attrs.unit = elem.get_attribute(schema_attrs::UNIT).map(str::to_string);

        if let Some(token) = elem.get_attribute(schema_attrs::TYPE) {
            names::validate_datatype(token).map_err(|e| locate(e, location))?;
            let base = self.options.lookup_datatype(token).ok_or_else(|| {
                Error::Schema(
                    SchemaError::new(
                        SchemaErrorKind::UnknownDatatype,
                        format!("Unknown datatype '{}'", token),
                    )
                    .with_location(location),
                )
            })?;
            attrs.datatype = Some(DatatypeRef {
                token: token.to_string(),
                base,
            });
        }

        attrs.min_inclusive = elem.get_attribute(schema_attrs::MIN_INCLUSIVE).map(str::to_string);
        attrs.max_inclusive = elem.get_attribute(schema_attrs::MAX_INCLUSIVE).map(str::to_string);

        if let Some(min) = elem.get_attribute(schema_attrs::MIN_OCCURS) {
            attrs.min_occurs = Some(parse_count(schema_attrs::MIN_OCCURS, min, location)?);
        }
        if let Some(max) = elem.get_attribute(schema_attrs::MAX_OCCURS) {
            attrs.max_occurs = Some(if max == "unbounded" {
                None
            } else {
                Some(parse_count(schema_attrs::MAX_OCCURS, max, location)?)
            });
        }
        if attrs.min_occurs.is_some() || attrs.max_occurs.is_some() {
            let occurs = attrs.occurs();
            // Only judge the range when both ends are declared here; a link may
            // supply one end and take the other from its source.
            if attrs.min_occurs.is_some() && attrs.max_occurs.is_some() && !occurs.is_valid() {
                return Err(Error::Schema(
                    SchemaError::new(
                        SchemaErrorKind::InvalidOccursRange,
                        format!("maxOccurs is smaller than minOccurs {}", occurs),
                    )
                    .with_location(location),
                ));
            }
        }

        if let Some(grouponly) = elem.get_attribute(schema_attrs::GROUPONLY) {
            attrs.grouponly = Some(grouponly != "False");
        }
        if elem.has_attribute(schema_attrs::HIDDEN) {
            attrs.hidden = Some(parse_flag(elem, schema_attrs::HIDDEN, location)?);
        }
        if elem.has_attribute(schema_attrs::EDITABLE) {
            attrs.editable = Some(parse_flag(elem, schema_attrs::EDITABLE, location)?);
        }

        if let Some(version) = elem.get_attribute(schema_attrs::VERSION) {
            if !is_root {
                return Err(Error::Schema(
                    SchemaError::new(
                        SchemaErrorKind::VersionNotOnRoot,
                        "'version' is only allowed on the schema root",
                    )
                    .with_location(location),
                ));
            }
            attrs.version = Some(version.to_string());
        }

        Ok(attrs)
    }
}

fn parse_link_ref(elem: &Element, location: &str) -> Result<LinkRef> {
    let template = elem.get_attribute(schema_attrs::TEMPLATE).map(str::to_string);
    let path = match elem.get_attribute(schema_attrs::PATH) {
        Some(path) => Some(PathExpr::parse(path).map_err(|e| {
            Error::Schema(
                SchemaError::new(SchemaErrorKind::MalformedPattern, e.to_string())
                    .with_location(location),
            )
        })?),
        None => None,
    };
    match (&template, &path) {
        (Some(_), Some(_)) => Err(Error::Link(LinkError::new(
            LinkErrorKind::AmbiguousSource,
            location,
        ))),
        (None, None) if !elem.has_attribute(schema_attrs::NAME) => Err(Error::Link(
            LinkError::new(LinkErrorKind::MissingSource, location),
        )),
        _ => Ok(LinkRef { template, path }),
    }
}

fn parse_condition(elem: &Element, location: &str) -> Result<ConditionNode> {
    let type_attr = elem
        .get_attribute(schema_attrs::TYPE)
        .ok_or_else(|| missing_attribute("condition type", location))?;
    let kind = ConditionType::from_str(type_attr).ok_or_else(|| {
        invalid_condition(&format!("Unknown condition type '{}'", type_attr), location)
    })?;

    let mut condition = ConditionNode {
        kind,
        variable: None,
        value: None,
        source: elem.get_attribute(schema_attrs::SOURCE).map(str::to_string),
        children: Vec::new(),
    };

    if kind.is_comparison() {
        let variable = elem
            .get_attribute(schema_attrs::VARIABLE)
            .ok_or_else(|| missing_attribute("condition variable", location))?;
        let value = elem
            .get_attribute(schema_attrs::VALUE)
            .ok_or_else(|| missing_attribute("condition value", location))?;
        let expr = PathExpr::parse(variable)
            .map_err(|e| invalid_condition(&e.to_string(), location))?;
        if expr.steps.is_empty() {
            return Err(invalid_condition(
                &format!("Condition variable '{}' does not name a node", variable),
                location,
            ));
        }
        condition.variable = Some(expr);
        condition.value = Some(value.to_string());
    } else {
        for child in elem.find_children(schema_elements::CONDITION) {
            condition.children.push(parse_condition(child, location)?);
        }
    }

    Ok(condition)
}

fn parse_options(elem: &Element, location: &str) -> Result<Vec<OptionDefinition>> {
    let mut options = Vec::new();
    for child in elem.find_children(schema_elements::OPTION) {
        let value = child
            .get_attribute(schema_attrs::VALUE)
            .ok_or_else(|| missing_attribute("option value", location))?;
        let mut option = OptionDefinition::new(value);
        if let Some(label) = child.get_attribute(schema_attrs::LABEL) {
            names::validate_label(label).map_err(|e| locate(e, location))?;
            option.label = Some(label.to_string());
        }
        option.description = child.get_attribute(schema_attrs::DESCRIPTION).map(str::to_string);
        if child.has_attribute(schema_attrs::DISABLED) {
            option.disabled = parse_flag(child, schema_attrs::DISABLED, location)?;
        }
        options.push(option);
    }
    Ok(options)
}

/// Parse a presence-only flag; the only accepted literal is `True`
fn parse_flag(elem: &Element, attr: &str, location: &str) -> Result<bool> {
    match elem.get_attribute(attr) {
        Some(FLAG_TRUE) => Ok(true),
        Some(other) => Err(Error::Schema(
            SchemaError::new(
                SchemaErrorKind::MalformedPattern,
                format!("'{}' must be \"{}\", found '{}'", attr, FLAG_TRUE, other),
            )
            .with_location(location),
        )),
        None => Ok(false),
    }
}

fn parse_count(attr: &str, value: &str, location: &str) -> Result<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        Error::Schema(
            SchemaError::new(
                SchemaErrorKind::InvalidOccursRange,
                format!("'{}' must be a non-negative integer, found '{}'", attr, value),
            )
            .with_location(location),
        )
    })
}

fn join_location(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn missing_attribute(attr: &str, location: &str) -> Error {
    Error::Schema(
        SchemaError::new(
            SchemaErrorKind::MissingRequiredAttribute,
            format!("Missing required attribute '{}'", attr),
        )
        .with_location(location),
    )
}

fn invalid_condition(message: &str, location: &str) -> Error {
    Error::Schema(SchemaError::new(SchemaErrorKind::InvalidCondition, message).with_location(location))
}

/// Attach a location to a schema error that has none
fn locate(err: Error, location: &str) -> Error {
    match err {
        Error::Schema(e) if e.location.is_none() => Error::Schema(e.with_location(location)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::BaseDataType;
    use crate::validators::elements::Occurs;

    fn schema_kind(result: Result<Schema>) -> SchemaErrorKind {
        match result {
            Err(Error::Schema(e)) => e.kind,
            other => panic!("expected schema error, got {:?}", other.map(|s| s.version)),
        }
    }

    #[test]
    fn test_load_simple_schema() {
        let xml = r#"
            <element name="store" version="1.0">
                <element name="settings">
                    <element name="name" type="string" label="Run name"/>
                    <element name="temperature" type="float" minInclusive="-50" maxInclusive="60" unit="degC"/>
                    <element name="layer" type="int" minOccurs="0" maxOccurs="unbounded"/>
                </element>
            </element>
        "#;
        let schema = Schema::from_string(xml).unwrap();
        assert_eq!(schema.version(), "1.0");
        assert_eq!(schema.node_count(), 5);

        let settings = schema.node(schema.node(Schema::ROOT).children[0]);
        let layer = schema.node(settings.children[2]);
        assert_eq!(layer.attrs.occurs(), Occurs::zero_or_more());
        let temperature = schema.node(settings.children[1]);
        assert_eq!(temperature.attrs.datatype.as_ref().unwrap().base, BaseDataType::Float);
        assert_eq!(temperature.location, "/settings/temperature");
    }

    #[test]
    fn test_templates_links_conditions_options() {
        let xml = r#"
            <element name="store" version="gotm-4.0">
                <template id="layer" type="float"/>
                <element name="physics">
                    <element name="enabled" type="bool"/>
                    <element name="threshold" type="float">
                        <condition type="eq" variable="../enabled" value="True"/>
                    </element>
                    <link name="top" template="layer"/>
                    <element name="method" type="int">
                        <options>
                            <option value="1" label="first"/>
                            <option value="2" disabled="True"/>
                        </options>
                    </element>
                </element>
            </element>
        "#;
        let schema = Schema::from_string(xml).unwrap();
        assert_eq!(schema.template_count(), 1);
        assert_eq!(schema.link_count(), 1);

        let physics = schema.node(schema.node(Schema::ROOT).children[0]);
        let threshold = schema.node(physics.children[1]);
        let condition = threshold.condition.as_ref().unwrap();
        assert_eq!(condition.kind, ConditionType::Eq);
        assert_eq!(condition.variable.as_ref().unwrap().to_string(), "../enabled");

        let method = schema.node(physics.children[3]);
        assert_eq!(method.options.len(), 2);
        assert!(method.options[1].disabled);
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(
            schema_kind(Schema::from_string(r#"<element name="a b" version="1.0"/>"#)),
            SchemaErrorKind::MalformedPattern
        );
        assert_eq!(
            schema_kind(Schema::from_string(r#"<element name="a" version="v1"/>"#)),
            SchemaErrorKind::MalformedPattern
        );
        let long_label = "x".repeat(81);
        let xml = format!(r#"<element name="a" version="1.0" label="{}"/>"#, long_label);
        assert_eq!(schema_kind(Schema::from_string(&xml)), SchemaErrorKind::MalformedPattern);
        assert_eq!(
            schema_kind(Schema::from_string(
                r#"<element name="a" version="1.0"><element name="b" hidden="yes"/></element>"#
            )),
            SchemaErrorKind::MalformedPattern
        );
    }

    #[test]
    fn test_occurs_range() {
        let xml = r#"<element name="a" version="1.0"><element name="b" minOccurs="3" maxOccurs="2"/></element>"#;
        assert_eq!(schema_kind(Schema::from_string(xml)), SchemaErrorKind::InvalidOccursRange);
        let xml = r#"<element name="a" version="1.0"><element name="b" minOccurs="-1"/></element>"#;
        assert_eq!(schema_kind(Schema::from_string(xml)), SchemaErrorKind::InvalidOccursRange);
    }

    #[test]
    fn test_structural_errors() {
        let xml = r#"<element name="a" version="1.0"><template id="t"/><template id="t"/></element>"#;
        assert_eq!(schema_kind(Schema::from_string(xml)), SchemaErrorKind::DuplicateTemplateId);

        let xml = r#"<element name="a" version="1.0"><element name="b" version="2.0"/></element>"#;
        assert_eq!(schema_kind(Schema::from_string(xml)), SchemaErrorKind::VersionNotOnRoot);

        let xml = r#"<element name="a" version="1.0"><element type="int"/></element>"#;
        assert_eq!(
            schema_kind(Schema::from_string(xml)),
            SchemaErrorKind::MissingRequiredAttribute
        );

        let xml = r#"<element name="a"/>"#;
        assert_eq!(
            schema_kind(Schema::from_string(xml)),
            SchemaErrorKind::MissingRequiredAttribute
        );

        let xml = r#"<element name="a" version="1.0"><element name="b" type="gotmfile"/></element>"#;
        assert_eq!(schema_kind(Schema::from_string(xml)), SchemaErrorKind::UnknownDatatype);
        let options = SchemaOptions::new().with_datatype_alias("gotmfile", BaseDataType::String);
        assert!(Schema::load(xml, &options).is_ok());

        let xml = r#"<element name="a" version="1.0"><element name="b"><condition type="xor"/></element></element>"#;
        assert_eq!(schema_kind(Schema::from_string(xml)), SchemaErrorKind::InvalidCondition);

        assert_eq!(
            schema_kind(Schema::from_string("<element name=\"a\" version=\"1.0\">")),
            SchemaErrorKind::MalformedXml
        );
        assert_eq!(
            schema_kind(Schema::from_string(r#"<converter source="1.0" target="2.0"/>"#)),
            SchemaErrorKind::MalformedXml
        );
    }

    #[test]
    fn test_link_sources() {
        let xml = r#"<element name="a" version="1.0"><template id="t"/><link name="x" template="t" path="../b"/></element>"#;
        match Schema::from_string(xml) {
            Err(Error::Link(e)) => assert_eq!(e.kind, LinkErrorKind::AmbiguousSource),
            other => panic!("unexpected: {:?}", other.is_ok()),
        }
        let xml = r#"<element name="a" version="1.0"><link label="nothing"/></element>"#;
        match Schema::from_string(xml) {
            Err(Error::Link(e)) => assert_eq!(e.kind, LinkErrorKind::MissingSource),
            other => panic!("unexpected: {:?}", other.is_ok()),
        }
        let xml = r#"<element name="a" version="1.0"><link name="inline" type="int"/></element>"#;
        assert!(Schema::from_string(xml).is_ok());
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let xml = r#"<element name="a" version="1.0"><documentation>text</documentation><element name="b"/></element>"#;
        let schema = Schema::from_string(xml).unwrap();
        assert_eq!(schema.node(Schema::ROOT).children.len(), 1);
    }
}
