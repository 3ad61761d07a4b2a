//! Template and link resolution
//!
//! Expands every link of a [`Schema`] into a concrete element definition.
//! Resolution is depth-first over the arena. Finished nodes are memoized by
//! arena id and links additionally by (source, override set), so equivalent
//! links share one `Arc`. An explicit in-progress stack detects cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::elements::{ElementAttributes, ElementDefinition};
use super::schemas::{LinkRef, RawId, RawKind, ResolvedSchema, Schema};

use crate::error::{Error, LinkError, LinkErrorKind, Result, SchemaError, SchemaErrorKind};

/// Memoization key of a link expansion
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LinkKey {
    source: RawId,
    overrides: ElementAttributes,
    /// The link node itself when it declares children, a condition or options
    content: Option<RawId>,
}

/// Resolver state for one schema
pub struct Resolver<'a> {
    schema: &'a Schema,
    resolved: HashMap<RawId, Arc<ElementDefinition>>,
    links: HashMap<LinkKey, Arc<ElementDefinition>>,
    in_progress: Vec<RawId>,
    link_depth: usize,
}

impl<'a> Resolver<'a> {
    /// Create a resolver for a schema
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            resolved: HashMap::new(),
            links: HashMap::new(),
            in_progress: Vec::new(),
            link_depth: 0,
        }
    }

    /// Resolve the whole schema
    pub fn resolve_schema(mut self) -> Result<ResolvedSchema> {
        let root = self.resolve(Schema::ROOT)?;
        check_tree(&root)?;
        tracing::debug!(
            version = %self.schema.version(),
            definitions = root.count_definitions(),
            link_expansions = self.links.len(),
            "schema resolved"
        );
        Ok(ResolvedSchema::new(self.schema.version(), root))
    }

    /// Resolve one arena node
    pub fn resolve(&mut self, id: RawId) -> Result<Arc<ElementDefinition>> {
        if let Some(done) = self.resolved.get(&id) {
            return Ok(Arc::clone(done));
        }
        let schema = self.schema;
        let node = schema.node(id);
        if self.in_progress.contains(&id) {
            return Err(Error::Link(LinkError::new(
                LinkErrorKind::CyclicLink,
                node.location.clone(),
            )));
        }

        self.in_progress.push(id);
        let result = match node.kind {
            RawKind::Link(ref link) => self.resolve_link(id, link),
            RawKind::Element | RawKind::Template { .. } => self.build(id, None),
        };
        self.in_progress.pop();

        let def = result?;
        self.resolved.insert(id, Arc::clone(&def));
        Ok(def)
    }

    /// Build a definition from a node's own declarations, optionally layered on a base
    fn build(&mut self, id: RawId, base: Option<&ElementDefinition>) -> Result<Arc<ElementDefinition>> {
        let schema = self.schema;
        let node = schema.node(id);

        let attrs = match base {
            Some(base) => base.attributes().overlay(&node.attrs),
            None => node.attrs.clone(),
        };
        let name = match (&attrs.name, &node.kind) {
            (Some(name), _) => name.clone(),
            (None, RawKind::Template { id }) => id.clone(),
            (None, _) => {
                return Err(Error::Schema(
                    SchemaError::new(SchemaErrorKind::MissingRequiredAttribute, "Element has no name")
                        .with_location(node.location.clone()),
                ))
            }
        };

        let mut def = ElementDefinition::from_attributes(name, &attrs);
        if let Some(base) = base {
            def.condition = base.condition.clone();
            def.options = base.options.clone();
            def.children = base.children.clone();
        }
        if node.condition.is_some() {
            def.condition = node.condition.clone();
        }
        if !node.options.is_empty() {
            def.options = node.options.clone();
        }
        for &child in &node.children {
            let resolved = self.resolve(child)?;
            def.children.push(resolved);
        }
        Ok(Arc::new(def))
    }

    fn resolve_link(&mut self, id: RawId, link: &LinkRef) -> Result<Arc<ElementDefinition>> {
        let schema = self.schema;
        let node = schema.node(id);
        let container = node.parent.unwrap_or(Schema::ROOT);

        let source = match (&link.template, &link.path) {
            (Some(template), None) => schema.lookup_template(container, template).ok_or_else(|| {
                Error::Link(
                    LinkError::new(LinkErrorKind::UnresolvedTemplate, node.location.clone())
                        .with_target(template.clone()),
                )
            })?,
            (None, Some(path)) => schema.find_by_path(container, path, 0).ok_or_else(|| {
                Error::Link(
                    LinkError::new(LinkErrorKind::UnresolvedPath, node.location.clone())
                        .with_target(path.to_string()),
                )
            })?,
            (Some(_), Some(_)) => {
                return Err(Error::Link(LinkError::new(
                    LinkErrorKind::AmbiguousSource,
                    node.location.clone(),
                )))
            }
            // Inline element declared through a link
            (None, None) => return self.build(id, None),
        };

        if self.in_progress.contains(&source) {
            return Err(Error::Link(
                LinkError::new(LinkErrorKind::CyclicLink, node.location.clone())
                    .with_target(schema.node(source).location.clone()),
            ));
        }
        if !schema.options().limits().check_link_depth(self.link_depth + 1) {
            return Err(Error::Link(LinkError::new(
                LinkErrorKind::DepthExceeded,
                node.location.clone(),
            )));
        }

        let key = LinkKey {
            source,
            overrides: node.attrs.clone(),
            content: node.has_content().then_some(id),
        };
        if let Some(done) = self.links.get(&key) {
            return Ok(Arc::clone(done));
        }

        self.link_depth += 1;
        let base = self.resolve(source);
        self.link_depth -= 1;
        let base = base?;

        tracing::trace!(link = %node.location, source = %schema.node(source).location, "expanding link");
        let def = self.build(id, Some(&base))?;
        self.links.insert(key, Arc::clone(&def));
        Ok(def)
    }
}

impl Schema {
    /// Resolve all templates and links into a concrete schema
    pub fn resolve(&self) -> Result<ResolvedSchema> {
        Resolver::new(self).resolve_schema()
    }
}

/// Checks that need the concrete tree: occurrence ranges after overrides,
/// bounds under the final datatype, and sibling name uniqueness.
fn check_tree(root: &Arc<ElementDefinition>) -> Result<()> {
    let mut seen = HashSet::new();
    check_definition(root, "", &mut seen)
}

fn check_definition(
    def: &Arc<ElementDefinition>,
    parent_path: &str,
    seen: &mut HashSet<*const ElementDefinition>,
) -> Result<()> {
    if !seen.insert(Arc::as_ptr(def)) {
        return Ok(());
    }
    let path = if parent_path.is_empty() {
        "/".to_string()
    } else if parent_path == "/" {
        format!("/{}", def.name)
    } else {
        format!("{}/{}", parent_path, def.name)
    };
    let schema_error = |kind: SchemaErrorKind, message: String| {
        Error::Schema(SchemaError::new(kind, message).with_location(path.clone()))
    };

    if def.name.is_empty() {
        return Err(schema_error(
            SchemaErrorKind::MissingRequiredAttribute,
            "Element has an empty name".to_string(),
        ));
    }
    if !def.occurs.is_valid() {
        return Err(schema_error(
            SchemaErrorKind::InvalidOccursRange,
            format!("maxOccurs is smaller than minOccurs {}", def.occurs),
        ));
    }
    let bounded = def.min_inclusive.is_some() || def.max_inclusive.is_some();
    if let Some(base) = def.base_type().filter(|b| bounded && !b.is_ordered()) {
        return Err(schema_error(
            SchemaErrorKind::MalformedPattern,
            format!("{} values cannot have inclusive bounds", base),
        ));
    }
    for bound in [def.min_bound(), def.max_bound()] {
        if let Err(e) = bound {
            return Err(schema_error(SchemaErrorKind::MalformedPattern, e.to_string()));
        }
    }

    let direct: Vec<&str> = def.children.iter().map(|c| c.name.as_str()).collect();
    for names in [direct, def.flattened_child_names()] {
        let mut unique = HashSet::new();
        for name in names {
            if !unique.insert(name) {
                return Err(schema_error(
                    SchemaErrorKind::DuplicateSiblingName,
                    format!("Two children share the name '{}'", name),
                ));
            }
        }
    }

    for child in &def.children {
        check_definition(child, &path, seen)?;
    }
    Ok(())
}
