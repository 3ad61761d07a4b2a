//! Document stores
//!
//! A [`Document`] is one instance tree conforming to a resolved schema
//! version. Nodes keep their raw text value; typed access parses it with the
//! node's base datatype. Nodes are addressed with [`NodePath`]s such as
//! `/layers/layer[2]/thickness`.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

use crate::conditions::{ConditionEvaluator, ConditionPolicy};
use crate::datatypes::TypedValue;
use crate::documents::{Document as XmlDocument, Element};
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::paths::NodePath;
use crate::validators::{ElementDefinition, ResolvedSchema};

/// Key used for a node's own value when it also has children
pub const JSON_VALUE_KEY: &str = "$";

/// One node of a document tree
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    definition: Arc<ElementDefinition>,
    value: Option<String>,
    children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// Create a node without value or children
    pub fn new(definition: Arc<ElementDefinition>) -> Self {
        Self {
            definition,
            value: None,
            children: Vec::new(),
        }
    }

    /// Create a node with `minOccurs` instances of every child, recursively
    pub fn instantiate(definition: Arc<ElementDefinition>) -> Self {
        let mut node = Self::new(Arc::clone(&definition));
        for child in &definition.children {
            for _ in 0..child.occurs.min {
                node.children.push(Self::instantiate(Arc::clone(child)));
            }
        }
        node
    }

    /// The node's definition
    pub fn definition(&self) -> &Arc<ElementDefinition> {
        &self.definition
    }

    /// The element name
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The raw value
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The value parsed with the node's datatype
    pub fn typed_value(&self) -> Result<Option<TypedValue>> {
        match (&self.value, self.definition.base_type()) {
            (Some(raw), Some(base)) => base.parse(raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Child nodes in schema order
    pub fn children(&self) -> &[DocumentNode] {
        &self.children
    }

    /// All occurrences of a named child
    pub fn occurrences<'s, 'n>(
        &'s self,
        name: &'n str,
    ) -> impl Iterator<Item = &'s DocumentNode> + 'n
    where
        's: 'n,
    {
        self.children.iter().filter(move |c| c.name() == name)
    }

    /// Number of occurrences of a named child
    pub fn occurrence_count(&self, name: &str) -> usize {
        self.occurrences(name).count()
    }

    /// The `index`-th occurrence of a named child
    pub fn child(&self, name: &str, index: usize) -> Option<&DocumentNode> {
        self.children.iter().filter(|c| c.name() == name).nth(index)
    }

    fn child_mut(&mut self, name: &str, index: usize) -> Option<&mut DocumentNode> {
        self.children.iter_mut().filter(|c| c.name() == name).nth(index)
    }

    /// Insert a child after the last sibling that precedes it in schema order
    fn insert_child(&mut self, child: DocumentNode) {
        let definitions = &self.definition.children;
        let rank = |name: &str| {
            definitions
                .iter()
                .position(|d| d.name == name)
                .unwrap_or(usize::MAX)
        };
        let child_rank = rank(child.name());
        let position = self
            .children
            .iter()
            .rposition(|c| rank(c.name()) <= child_rank)
            .map_or(0, |p| p + 1);
        self.children.insert(position, child);
    }

    /// Number of nodes in this subtree (including self)
    pub fn count_nodes(&self) -> usize {
        1 + self.children.iter().map(|c| c.count_nodes()).sum::<usize>()
    }

    fn collect<'a>(&'a self, path: NodePath, out: &mut Vec<(NodePath, &'a DocumentNode)>) {
        let mut seen: IndexMap<&str, usize> = IndexMap::new();
        out.push((path.clone(), self));
        for child in &self.children {
            let index = seen.entry(child.name()).or_insert(0);
            child.collect(path.child(child.name(), *index), out);
            *index += 1;
        }
    }

    fn to_element(&self) -> Element {
        let mut element = Element::new(self.name());
        if let Some(ref value) = self.value {
            element.push_text(value);
        }
        for child in &self.children {
            element.add_child(child.to_element());
        }
        element
    }

    fn to_json(&self) -> JsonValue {
        let own = self
            .value
            .as_ref()
            .map_or(JsonValue::Null, |v| JsonValue::String(v.clone()));
        if self.definition.children.is_empty() {
            return own;
        }
        let mut map = Map::new();
        if self.definition.can_have_value() {
            map.insert(JSON_VALUE_KEY.to_string(), own);
        }
        for def in &self.definition.children {
            let values: Vec<JsonValue> = self.occurrences(&def.name).map(|c| c.to_json()).collect();
            if def.can_have_clones() {
                map.insert(def.name.clone(), JsonValue::Array(values));
            } else if let Some(value) = values.into_iter().next() {
                map.insert(def.name.clone(), value);
            }
        }
        JsonValue::Object(map)
    }
}

/// A document tree bound to one resolved schema version
#[derive(Debug, Clone)]
pub struct Document {
    schema: Arc<ResolvedSchema>,
    root: DocumentNode,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.version() == other.version() && self.root == other.root
    }
}

impl Document {
    /// Instantiate a document with the minimum occurrences of every element
    pub fn new(schema: Arc<ResolvedSchema>) -> Self {
        let root = DocumentNode::instantiate(Arc::clone(schema.root()));
        Self { schema, root }
    }

    /// The schema version of this document
    pub fn version(&self) -> &str {
        self.schema.version()
    }

    /// The schema this document conforms to
    pub fn schema(&self) -> &Arc<ResolvedSchema> {
        &self.schema
    }

    /// The root node
    pub fn root(&self) -> &DocumentNode {
        &self.root
    }

    /// Get the node at a location
    pub fn get(&self, path: &NodePath) -> Option<&DocumentNode> {
        let mut node = &self.root;
        for (name, index) in &path.segments {
            node = node.child(name, *index)?;
        }
        Some(node)
    }

    /// Get the node at a location for modification
    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut DocumentNode> {
        let mut node = &mut self.root;
        for (name, index) in &path.segments {
            node = node.child_mut(name, *index)?;
        }
        Some(node)
    }

    /// Get the node at a path string such as `/settings/name`
    pub fn find(&self, path: &str) -> Option<&DocumentNode> {
        self.get(&NodePath::parse(path).ok()?)
    }

    /// The raw value at a path string
    pub fn value(&self, path: &str) -> Option<&str> {
        self.find(path)?.value()
    }

    /// The typed value at a path string
    pub fn typed_value(&self, path: &str) -> Result<Option<TypedValue>> {
        match self.find(path) {
            Some(node) => node.typed_value(),
            None => Ok(None),
        }
    }

    /// Set a raw value, creating optional occurrences on the way
    pub fn set_value(&mut self, path: &str, value: impl Into<String>) -> Result<()> {
        let path = NodePath::parse(path)?;
        self.set_value_at(&path, Some(value.into()))
    }

    /// Set or clear the raw value at a location
    pub fn set_value_at(&mut self, path: &NodePath, value: Option<String>) -> Result<()> {
        let node = self.ensure(path)?;
        if value.is_some() && !node.definition.can_have_value() {
            return Err(Error::Document(format!("Node '{}' cannot hold a value", path)));
        }
        node.value = value;
        Ok(())
    }

    /// Store a typed value, converted to the node's datatype
    pub fn set_typed_value(&mut self, path: &NodePath, value: &TypedValue) -> Result<()> {
        let node = self.ensure(path)?;
        let base = node
            .definition
            .base_type()
            .filter(|_| node.definition.can_have_value())
            .ok_or_else(|| Error::Document(format!("Node '{}' cannot hold a value", path)))?;
        node.value = Some(value.coerce_to(base)?.to_xml_string());
        Ok(())
    }

    /// Clear the value at a path string
    pub fn clear_value(&mut self, path: &str) -> Result<()> {
        let path = NodePath::parse(path)?;
        match self.get_mut(&path) {
            Some(node) => {
                node.value = None;
                Ok(())
            }
            None => Err(Error::Document(format!("No node at '{}'", path))),
        }
    }

    /// Get the node at a location, creating missing occurrences up to it
    ///
    /// Occurrences are created only where the schema allows them; asking for
    /// an index at or beyond `maxOccurs` fails.
    pub fn ensure(&mut self, path: &NodePath) -> Result<&mut DocumentNode> {
        let mut node = &mut self.root;
        for (name, index) in &path.segments {
            let definition = node.definition.child(name).cloned().ok_or_else(|| {
                Error::Document(format!("'{}' has no child element '{}'", node.name(), name))
            })?;
            let count = node.occurrence_count(name);
            if *index >= count {
                if definition.occurs.is_over(*index as u32) {
                    return Err(Error::Document(format!(
                        "'{}' allows at most {} occurrence(s) of '{}'",
                        node.name(),
                        definition.occurs.max.unwrap_or_default(),
                        name
                    )));
                }
                for _ in count..=*index {
                    node.insert_child(DocumentNode::instantiate(Arc::clone(&definition)));
                }
            }
            node = node
                .child_mut(name, *index)
                .ok_or_else(|| Error::Document(format!("No node at '{}'", path)))?;
        }
        Ok(node)
    }

    /// Append a new occurrence of `name` below `parent`, returning its location
    pub fn add_child(&mut self, parent: &NodePath, name: &str) -> Result<NodePath> {
        let node = self.ensure(parent)?;
        let count = node.occurrence_count(name);
        let child_path = parent.child(name, count);
        self.ensure(&child_path)?;
        Ok(child_path)
    }

    /// Remove the node at a location, returning it
    pub fn remove(&mut self, path: &NodePath) -> Result<DocumentNode> {
        let (name, index) = path
            .segments
            .last()
            .cloned()
            .ok_or_else(|| Error::Document("The root node cannot be removed".to_string()))?;
        let parent = self
            .get_mut(&path.parent())
            .ok_or_else(|| Error::Document(format!("No node at '{}'", path)))?;
        let position = parent
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name() == name)
            .nth(index)
            .map(|(i, _)| i)
            .ok_or_else(|| Error::Document(format!("No node at '{}'", path)))?;
        Ok(parent.children.remove(position))
    }

    /// All nodes with their locations, depth first
    pub fn nodes(&self) -> Vec<(NodePath, &DocumentNode)> {
        let mut out = Vec::new();
        self.root.collect(NodePath::root(), &mut out);
        out
    }

    /// Number of nodes in the document
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    /// Whether the node and all its ancestors pass their conditions
    pub fn is_visible(
        &self,
        path: &NodePath,
        stores: &StoreRegistry<'_>,
        policy: ConditionPolicy,
    ) -> Result<bool> {
        ConditionEvaluator::new(self, stores).is_visible(path, policy)
    }

    /// Read a values document with default limits
    pub fn from_xml(schema: Arc<ResolvedSchema>, xml: &str) -> Result<Self> {
        Self::from_xml_with_limits(schema, xml, &Limits::default())
    }

    /// Read a values document
    ///
    /// The root element must carry the schema root's name; a `version`
    /// attribute, when present, must match the schema version.
    pub fn from_xml_with_limits(schema: Arc<ResolvedSchema>, xml: &str, limits: &Limits) -> Result<Self> {
        let root = XmlDocument::parse(xml.as_bytes(), limits)?.into_root()?;
        let root_def = Arc::clone(schema.root());
        if root.local_name() != root_def.name {
            return Err(Error::Document(format!(
                "Values root '{}' does not match schema root '{}'",
                root.local_name(),
                root_def.name
            )));
        }
        if let Some(version) = root.get_attribute("version") {
            if version != schema.version() {
                return Err(Error::Document(format!(
                    "Values version '{}' does not match schema version '{}'",
                    version,
                    schema.version()
                )));
            }
        }

        let mut count = 0;
        let root = node_from_element(&root_def, &root, limits, &mut count)?;
        tracing::debug!(version = %schema.version(), nodes = count, "values loaded");
        Ok(Self { schema, root })
    }

    /// Write the document in the values format
    pub fn to_xml(&self) -> String {
        let mut root = self.root.to_element();
        root.set_attribute("version", self.version());
        format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{}", root.to_xml_string())
    }

    /// Export the document as JSON
    ///
    /// Repeatable elements become arrays, leaves become strings (or null when
    /// unset); a node with both a value and children keeps its value under `$`.
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert(self.root.name().to_string(), self.root.to_json());
        JsonValue::Object(map)
    }
}

fn node_from_element(
    definition: &Arc<ElementDefinition>,
    element: &Element,
    limits: &Limits,
    count: &mut usize,
) -> Result<DocumentNode> {
    *count += 1;
    limits.check_document_nodes(*count)?;

    let mut node = DocumentNode::new(Arc::clone(definition));
    if definition.can_have_value() {
        node.value = element.text.clone();
    }
    for child in &element.children {
        let child_def = definition.child(child.local_name()).ok_or_else(|| {
            Error::Document(format!(
                "'{}' has no child element '{}'",
                definition.name,
                child.local_name()
            ))
        })?;
        let child_node = node_from_element(child_def, child, limits, count)?;
        node.insert_child(child_node);
    }
    Ok(node)
}

/// Named documents attached by the hosting application
///
/// Conditions with a `source` read their variable from the store registered
/// under that name.
#[derive(Debug, Clone, Default)]
pub struct StoreRegistry<'a> {
    stores: IndexMap<String, &'a Document>,
}

impl<'a> StoreRegistry<'a> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store, returning the one it replaces
    pub fn register(&mut self, name: impl Into<String>, document: &'a Document) -> Option<&'a Document> {
        self.stores.insert(name.into(), document)
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_store(mut self, name: impl Into<String>, document: &'a Document) -> Self {
        self.register(name, document);
        self
    }

    /// Look up a store by name
    pub fn get(&self, name: &str) -> Option<&'a Document> {
        self.stores.get(name).copied()
    }

    /// Registered store names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(|k| k.as_str())
    }

    /// Number of registered stores
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no store is registered
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
