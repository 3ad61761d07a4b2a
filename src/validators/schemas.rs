//! Schemas
//!
//! A [`Schema`] is the loaded, unresolved form of a schema file: an arena of
//! element, template and link nodes addressed by [`RawId`]. Resolving it
//! yields a [`ResolvedSchema`], an immutable tree of [`ElementDefinition`]s
//! with no residual templates or links, shared through `Arc`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::elements::{ConditionNode, ElementAttributes, ElementDefinition, OptionDefinition};
use crate::datatypes::BaseDataType;
use crate::limits::Limits;
use crate::paths::{NodePath, PathExpr, PathStep};

/// Index of a node in the schema arena
pub type RawId = usize;

/// Options controlling schema loading
#[derive(Debug, Clone, Default)]
pub struct SchemaOptions {
    /// Resource limits
    limits: Limits,
    /// Custom datatype tokens and the base datatype they map to
    datatype_aliases: IndexMap<String, BaseDataType>,
}

impl SchemaOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the limits
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Map a custom datatype token to a base datatype
    pub fn with_datatype_alias(mut self, token: impl Into<String>, base: BaseDataType) -> Self {
        self.datatype_aliases.insert(token.into(), base);
        self
    }

    /// Look up the base datatype of a token, honouring aliases
    pub fn lookup_datatype(&self, token: &str) -> Option<BaseDataType> {
        BaseDataType::from_token(token).or_else(|| self.datatype_aliases.get(token).copied())
    }
}

/// Source reference of a link node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    /// Template id, looked up through the enclosing scopes
    pub template: Option<String>,
    /// Path to another element, relative to the link's container
    pub path: Option<PathExpr>,
}

/// Kind of an arena node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawKind {
    /// A concrete `element`
    Element,
    /// A reusable `template`
    Template {
        /// Template id, unique within its scope
        id: String,
    },
    /// A `link` to a template or another element
    Link(LinkRef),
}

/// A node of the unresolved schema
#[derive(Debug, Clone)]
pub struct RawNode {
    /// Node kind
    pub kind: RawKind,
    /// Enclosing node (the scope for templates)
    pub parent: Option<RawId>,
    /// Ordered element and link children
    pub children: Vec<RawId>,
    /// Templates declared directly inside this node
    pub templates: IndexMap<String, RawId>,
    /// Declared attributes
    pub attrs: ElementAttributes,
    /// Visibility condition
    pub condition: Option<ConditionNode>,
    /// Predefined values
    pub options: Vec<OptionDefinition>,
    /// Human-readable location within the schema file
    pub location: String,
}

impl RawNode {
    /// Create an empty node
    pub fn new(kind: RawKind, parent: Option<RawId>, location: impl Into<String>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            templates: IndexMap::new(),
            attrs: ElementAttributes::default(),
            condition: None,
            options: Vec::new(),
            location: location.into(),
        }
    }

    /// Whether this node is a link
    pub fn is_link(&self) -> bool {
        matches!(self.kind, RawKind::Link(_))
    }

    /// Whether the node declares content beyond its attributes
    pub fn has_content(&self) -> bool {
        !self.children.is_empty() || self.condition.is_some() || !self.options.is_empty()
    }
}

/// A loaded but unresolved schema
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) version: String,
    pub(crate) nodes: Vec<RawNode>,
    pub(crate) options: SchemaOptions,
}

impl Schema {
    /// Id of the root element
    pub const ROOT: RawId = 0;

    /// The schema version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The options the schema was loaded with
    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Get an arena node
    pub fn node(&self, id: RawId) -> &RawNode {
        &self.nodes[id]
    }

    /// Number of arena nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of link nodes
    pub fn link_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_link()).count()
    }

    /// Number of template nodes
    pub fn template_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, RawKind::Template { .. }))
            .count()
    }

    /// Find a template by id, searching `scope` and then its ancestors
    pub fn lookup_template(&self, scope: RawId, id: &str) -> Option<RawId> {
        let mut current = Some(scope);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id];
            if let Some(&found) = node.templates.get(id) {
                return Some(found);
            }
            current = node.parent;
        }
        None
    }

    /// The name a node will carry once resolved
    ///
    /// Links without a `name` take the name of their source. `depth` bounds
    /// the number of links followed.
    pub(crate) fn effective_name(&self, id: RawId, depth: usize) -> Option<String> {
        let node = &self.nodes[id];
        if let Some(ref name) = node.attrs.name {
            return Some(name.clone());
        }
        match node.kind {
            RawKind::Element => None,
            RawKind::Template { ref id } => Some(id.clone()),
            RawKind::Link(ref link) => {
                if !self.options.limits.check_link_depth(depth) {
                    return None;
                }
                let source = self.link_source(id, link, depth + 1)?;
                self.effective_name(source, depth + 1)
            }
        }
    }

    /// Locate the source of a link without resolving it
    pub(crate) fn link_source(&self, id: RawId, link: &LinkRef, depth: usize) -> Option<RawId> {
        let container = self.nodes[id].parent?;
        match (&link.template, &link.path) {
            (Some(template), None) => self.lookup_template(container, template),
            (None, Some(path)) => self.find_by_path(container, path, depth),
            _ => None,
        }
    }

    /// Walk a path expression over the arena, starting from `container`
    pub(crate) fn find_by_path(&self, container: RawId, path: &PathExpr, depth: usize) -> Option<RawId> {
        let mut current = if path.absolute { Self::ROOT } else { container };
        for step in &path.steps {
            match step {
                PathStep::Parent => current = self.nodes[current].parent?,
                PathStep::Child { name, .. } => {
                    current = self.nodes[current]
                        .children
                        .iter()
                        .copied()
                        .find(|&child| self.effective_name(child, depth).as_deref() == Some(name.as_str()))?;
                }
            }
        }
        Some(current)
    }
}

/// A fully resolved schema version
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    version: String,
    root: Arc<ElementDefinition>,
}

impl ResolvedSchema {
    /// Create a resolved schema from its root definition
    pub fn new(version: impl Into<String>, root: Arc<ElementDefinition>) -> Self {
        Self {
            version: version.into(),
            root,
        }
    }

    /// The schema version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The root element definition
    pub fn root(&self) -> &Arc<ElementDefinition> {
        &self.root
    }

    /// Find a definition by path (`/a/b`); occurrence indices are ignored
    pub fn find(&self, path: &str) -> Option<&Arc<ElementDefinition>> {
        let path = NodePath::parse(path).ok()?;
        self.find_path(&path)
    }

    /// Find the definition addressed by a node path
    pub fn find_path(&self, path: &NodePath) -> Option<&Arc<ElementDefinition>> {
        let mut current = &self.root;
        for (name, _) in &path.segments {
            current = current.child(name)?;
        }
        Some(current)
    }

    /// Schema paths of every definition that carries a value
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_leaf_paths(&self.root, &NodePath::root(), &mut out);
        out
    }

    /// Total number of definitions in the tree
    pub fn definition_count(&self) -> usize {
        self.root.count_definitions()
    }
}

fn collect_leaf_paths(def: &ElementDefinition, path: &NodePath, out: &mut Vec<String>) {
    if def.can_have_value() {
        out.push(path.schema_path());
    }
    for child in &def.children {
        collect_leaf_paths(child, &path.child(child.name.clone(), 0), out);
    }
}

impl fmt::Display for ResolvedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResolvedSchema(root='{}', version='{}', definitions={})",
            self.root.name,
            self.version,
            self.definition_count()
        )
    }
}
