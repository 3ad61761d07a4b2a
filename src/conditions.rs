//! Condition evaluation
//!
//! Conditions decide whether an element is applicable given the current
//! values of other nodes. `and`/`or` combine child conditions (an empty `and`
//! holds, an empty `or` does not); `eq`/`ne` compare one variable against a
//! literal under the variable's datatype.
//!
//! Variable paths are relative to the condition's container, i.e. the element
//! that owns the condition: `../enabled` names a sibling of that element. A
//! condition with a `source` reads from the store registered under that name
//! instead of the current document, at the same location.

use crate::datatypes::{BaseDataType, TypedValue};
use crate::error::{ConditionError, Error, Result};
use crate::paths::NodePath;
use crate::store::{Document, DocumentNode, StoreRegistry};
use crate::validators::{ConditionNode, ConditionType};

/// What visibility checks do when a condition cannot be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionPolicy {
    /// Treat the element as hidden
    #[default]
    Hide,
    /// Treat the element as visible
    Show,
    /// Propagate the evaluation error
    Error,
}

/// Evaluates conditions against a document and its attached stores
pub struct ConditionEvaluator<'a> {
    document: &'a Document,
    stores: &'a StoreRegistry<'a>,
}

impl<'a> ConditionEvaluator<'a> {
    /// Create an evaluator over a document and its attached stores
    pub fn new(document: &'a Document, stores: &'a StoreRegistry<'a>) -> Self {
        Self { document, stores }
    }

    /// Evaluate a condition owned by the node at `owner`
    ///
    /// Fails with `UnresolvedVariable` when a variable path does not lead to
    /// a node and with `UnknownStore` when `source` names no attached store.
    /// A variable node without a value is unset: `eq` is false, `ne` is true.
    pub fn evaluate(&self, condition: &ConditionNode, owner: &NodePath) -> Result<bool> {
        match condition.kind {
            ConditionType::And => {
                for child in &condition.children {
                    if !self.evaluate(child, owner)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ConditionType::Or => {
                for child in &condition.children {
                    if self.evaluate(child, owner)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ConditionType::Eq => self.compare(condition, owner),
            ConditionType::Ne => self.compare(condition, owner).map(|equal| !equal),
        }
    }

    /// Whether the node at `path` and all its ancestors pass their conditions
    pub fn is_visible(&self, path: &NodePath, policy: ConditionPolicy) -> Result<bool> {
        let mut current = NodePath::root();
        let mut levels = vec![current.clone()];
        for (name, index) in &path.segments {
            current = current.child(name.clone(), *index);
            levels.push(current.clone());
        }

        for level in &levels {
            let node = self.document.get(level).ok_or_else(|| {
                Error::Document(format!("No node at '{}'", level))
            })?;
            let Some(ref condition) = node.definition().condition else {
                continue;
            };
            match self.evaluate(condition, level) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(Error::Condition(e)) => match policy {
                    ConditionPolicy::Hide => {
                        tracing::warn!(path = %level, error = %e, "condition failed, hiding node");
                        return Ok(false);
                    }
                    ConditionPolicy::Show => {
                        tracing::warn!(path = %level, error = %e, "condition failed, showing node");
                    }
                    ConditionPolicy::Error => return Err(Error::Condition(e)),
                },
                Err(other) => return Err(other),
            }
        }
        Ok(true)
    }

    /// Whether the variable of an `eq`/`ne` condition equals its literal
    fn compare(&self, condition: &ConditionNode, owner: &NodePath) -> Result<bool> {
        let variable = condition
            .variable
            .as_ref()
            .ok_or_else(|| ConditionError::unresolved_variable(""))?;
        let literal = condition.value.as_deref().unwrap_or_default();

        let document = match condition.source {
            Some(ref store) => self
                .stores
                .get(store)
                .ok_or_else(|| ConditionError::unknown_store(store.clone()))?,
            None => self.document,
        };

        let unresolved = || Error::Condition(ConditionError::unresolved_variable(variable.to_string()));
        let target = variable.apply(owner).ok_or_else(unresolved)?;
        let node = document.get(&target).ok_or_else(unresolved)?;
        Ok(values_equal(node, literal))
    }
}

/// Compare a node's value with a literal under the node's datatype
///
/// A literal that does not parse as the node's datatype never matches.
fn values_equal(node: &DocumentNode, literal: &str) -> bool {
    let Some(raw) = node.value() else {
        return false;
    };
    let base = node.definition().base_type().unwrap_or(BaseDataType::String);
    match (base.parse(raw), base.parse(literal)) {
        (Ok(actual), Ok(expected)) => typed_equal(&actual, &expected),
        _ => false,
    }
}

fn typed_equal(a: &TypedValue, b: &TypedValue) -> bool {
    match (a, b) {
        (TypedValue::String(a), TypedValue::String(b)) => a == b,
        (TypedValue::Bool(a), TypedValue::Bool(b)) => a == b,
        _ => a.partial_cmp(b) == Some(std::cmp::Ordering::Equal),
    }
}

/// Evaluate a condition with the given stores
pub fn evaluate_condition(
    condition: &ConditionNode,
    document: &Document,
    owner: &NodePath,
    stores: &StoreRegistry<'_>,
) -> Result<bool> {
    ConditionEvaluator::new(document, stores).evaluate(condition, owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConditionErrorKind;
    use crate::paths::PathExpr;
    use crate::validators::{ResolvedSchema, Schema};
    use std::sync::Arc;

    const SCHEMA: &str = r#"
        <element name="store" version="1.0">
            <element name="model">
                <element name="enabled" type="bool"/>
                <element name="threshold" type="float">
                    <condition type="eq" variable="../enabled" value="True"/>
                </element>
                <element name="mode" type="int"/>
                <element name="detail" type="string" minOccurs="0">
                    <condition type="and">
                        <condition type="eq" variable="../enabled" value="True"/>
                        <condition type="ne" variable="../mode" value="0"/>
                    </condition>
                </element>
            </element>
            <element name="remote" type="string" minOccurs="0">
                <condition type="eq" variable="/model/enabled" value="True" source="defaults"/>
            </element>
        </element>
    "#;

    fn schema() -> Arc<ResolvedSchema> {
        Arc::new(Schema::from_string(SCHEMA).unwrap().resolve().unwrap())
    }

    fn path(p: &str) -> NodePath {
        NodePath::parse(p).unwrap()
    }

    #[test]
    fn test_eq_on_sibling() {
        let mut doc = Document::new(schema());
        let registry = StoreRegistry::new();
        let threshold = path("/model/threshold");

        doc.set_value("/model/enabled", "True").unwrap();
        assert!(doc.is_visible(&threshold, &registry, ConditionPolicy::Hide).unwrap());

        doc.set_value("/model/enabled", "False").unwrap();
        assert!(!doc.is_visible(&threshold, &registry, ConditionPolicy::Hide).unwrap());

        // Bool comparison is datatype-aware
        doc.set_value("/model/enabled", "true").unwrap();
        assert!(doc.is_visible(&threshold, &registry, ConditionPolicy::Hide).unwrap());
    }

    #[test]
    fn test_typed_equality() {
        assert!(typed_equal(&TypedValue::Bool(true), &TypedValue::Bool(true)));
        assert!(!typed_equal(&TypedValue::Bool(true), &TypedValue::Bool(false)));
        assert!(typed_equal(&TypedValue::Int(2), &TypedValue::Float(2.0)));
        assert!(!typed_equal(&TypedValue::Int(2), &TypedValue::Bool(true)));
    }

    #[test]
    fn test_unset_variable() {
        let doc = Document::new(schema());
        let registry = StoreRegistry::new();
        let evaluator = ConditionEvaluator::new(&doc, &registry);
        let owner = path("/model/threshold");

        let eq = ConditionNode::eq(PathExpr::parse("../enabled").unwrap(), "True");
        let ne = ConditionNode::ne(PathExpr::parse("../enabled").unwrap(), "True");
        assert!(!evaluator.evaluate(&eq, &owner).unwrap());
        assert!(evaluator.evaluate(&ne, &owner).unwrap());
    }

    #[test]
    fn test_unresolved_variable_policy() {
        let doc = Document::new(schema());
        let registry = StoreRegistry::new();
        let evaluator = ConditionEvaluator::new(&doc, &registry);
        let owner = path("/model/threshold");

        let missing = ConditionNode::eq(PathExpr::parse("../missing").unwrap(), "1");
        match evaluator.evaluate(&missing, &owner) {
            Err(Error::Condition(e)) => assert_eq!(e.kind, ConditionErrorKind::UnresolvedVariable),
            other => panic!("unexpected: {:?}", other),
        }

        // A store that is not attached falls under the same policy
        let mut doc = Document::new(schema());
        doc.set_value("/model/enabled", "True").unwrap();
        doc.ensure(&path("/remote")).unwrap();
        let remote = path("/remote");
        assert!(!doc.is_visible(&remote, &registry, ConditionPolicy::Hide).unwrap());
        assert!(doc.is_visible(&remote, &registry, ConditionPolicy::Show).unwrap());
        assert!(doc.is_visible(&remote, &registry, ConditionPolicy::Error).is_err());
    }

    #[test]
    fn test_combinators() {
        let mut doc = Document::new(schema());
        doc.set_value("/model/enabled", "True").unwrap();
        doc.set_value("/model/mode", "2").unwrap();
        doc.ensure(&path("/model/detail")).unwrap();
        let registry = StoreRegistry::new();
        let detail = path("/model/detail");
        assert!(doc.is_visible(&detail, &registry, ConditionPolicy::Error).unwrap());

        doc.set_value("/model/mode", "0").unwrap();
        assert!(!doc.is_visible(&detail, &registry, ConditionPolicy::Error).unwrap());

        let evaluator = ConditionEvaluator::new(&doc, &registry);
        assert!(evaluator.evaluate(&ConditionNode::and(vec![]), &detail).unwrap());
        assert!(!evaluator.evaluate(&ConditionNode::or(vec![]), &detail).unwrap());
    }

    #[test]
    fn test_ancestor_conditions_hide_descendants() {
        let xml = r#"
            <element name="store" version="1.0">
                <element name="on" type="bool"/>
                <element name="group">
                    <condition type="eq" variable="../on" value="True"/>
                    <element name="leaf" type="int"/>
                </element>
            </element>
        "#;
        let schema = Arc::new(Schema::from_string(xml).unwrap().resolve().unwrap());
        let mut doc = Document::new(schema);
        doc.set_value("/on", "False").unwrap();
        let registry = StoreRegistry::new();
        assert!(!doc.is_visible(&path("/group/leaf"), &registry, ConditionPolicy::Error).unwrap());
        doc.set_value("/on", "True").unwrap();
        assert!(doc.is_visible(&path("/group/leaf"), &registry, ConditionPolicy::Error).unwrap());
    }

    #[test]
    fn test_cross_store() {
        let schema = schema();
        let mut defaults = Document::new(Arc::clone(&schema));
        defaults.set_value("/model/enabled", "True").unwrap();

        let mut doc = Document::new(schema);
        doc.set_value("/model/enabled", "False").unwrap();
        doc.ensure(&path("/remote")).unwrap();
        let registry = StoreRegistry::new().with_store("defaults", &defaults);
        assert!(doc.is_visible(&path("/remote"), &registry, ConditionPolicy::Error).unwrap());

        let empty = StoreRegistry::new();
        let evaluator = ConditionEvaluator::new(&doc, &empty);
        let condition = doc.schema().find("/remote").unwrap().condition.clone().unwrap();
        match evaluator.evaluate(&condition, &path("/remote")) {
            Err(Error::Condition(e)) => assert_eq!(e.kind, ConditionErrorKind::UnknownStore),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_literal_never_matches() {
        let mut doc = Document::new(schema());
        doc.set_value("/model/mode", "3").unwrap();
        let registry = StoreRegistry::new();
        let evaluator = ConditionEvaluator::new(&doc, &registry);
        let owner = path("/model/detail");
        let eq = ConditionNode::eq(PathExpr::parse("../mode").unwrap(), "three");
        let ne = ConditionNode::ne(PathExpr::parse("../mode").unwrap(), "three");
        assert!(!evaluator.evaluate(&eq, &owner).unwrap());
        assert!(evaluator.evaluate(&ne, &owner).unwrap());
        let eq = ConditionNode::eq(PathExpr::parse("../mode").unwrap(), "03");
        assert!(evaluator.evaluate(&eq, &owner).unwrap());
    }
}
