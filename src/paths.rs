//! Path expressions
//!
//! Links, conditions and converter definitions all address nodes with the
//! same small path language:
//!
//! - `/a/b` is absolute (relative to the root element, which is not named)
//! - `a/b`, `./a`, `../a` are relative to a reference container
//! - `name[i]` selects the i-th (0-based) occurrence of a repeated element
//!
//! Parsing is shared; the schema resolver walks these steps over element
//! definitions while documents walk them over instance nodes.

use crate::error::{Error, Result};
use std::fmt;

/// A single step in a path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// `..` - move to the parent
    Parent,
    /// `name` or `name[i]` - move to a named child
    Child {
        /// Child element name
        name: String,
        /// Occurrence index, if given
        index: Option<usize>,
    },
}

impl PathStep {
    /// Parse a step from a string. Empty steps and `.` yield `None`.
    pub fn parse(step: &str) -> Result<Option<Self>> {
        let step = step.trim();
        match step {
            "" | "." => return Ok(None),
            ".." => return Ok(Some(PathStep::Parent)),
            _ => {}
        }

        let (name, index) = match step.find('[') {
            Some(bracket_pos) => {
                let rest = &step[bracket_pos + 1..];
                let digits = rest.strip_suffix(']').ok_or_else(|| {
                    Error::Value(format!("Unterminated index in path step '{}'", step))
                })?;
                let index = digits.parse::<usize>().map_err(|_| {
                    Error::Value(format!("Invalid index '{}' in path step '{}'", digits, step))
                })?;
                (&step[..bracket_pos], Some(index))
            }
            None => (step, None),
        };

        if name.is_empty() {
            return Err(Error::Value(format!("Missing name in path step '{}'", step)));
        }

        Ok(Some(PathStep::Child {
            name: name.to_string(),
            index,
        }))
    }
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    /// Whether the path starts at the root
    pub absolute: bool,
    /// The steps of the path
    pub steps: Vec<PathStep>,
}

impl PathExpr {
    /// Parse a path expression
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        let absolute = path.starts_with('/');
        let mut steps = Vec::new();
        for raw in path.split('/') {
            if let Some(step) = PathStep::parse(raw)? {
                steps.push(step);
            }
        }
        Ok(Self { absolute, steps })
    }

    /// Whether the path navigates upwards with `..`
    pub fn is_relative_upwards(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, PathStep::Parent))
    }

    /// Apply this expression to a reference location, yielding an absolute location.
    ///
    /// `container` is used for relative expressions. Returns `None` when the
    /// expression climbs above the root.
    pub fn apply(&self, container: &NodePath) -> Option<NodePath> {
        let mut current = if self.absolute {
            NodePath::root()
        } else {
            container.clone()
        };
        for step in &self.steps {
            match step {
                PathStep::Parent => {
                    current.segments.pop()?;
                }
                PathStep::Child { name, index } => {
                    current.segments.push((name.clone(), index.unwrap_or(0)));
                }
            }
        }
        Some(current)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match step {
                PathStep::Parent => write!(f, "..")?,
                PathStep::Child { name, index: None } => write!(f, "{}", name)?,
                PathStep::Child {
                    name,
                    index: Some(i),
                } => write!(f, "{}[{}]", name, i)?,
            }
        }
        Ok(())
    }
}

/// Absolute location of a node: (name, occurrence index) per level below the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    /// Path segments from the root downwards
    pub segments: Vec<(String, usize)>,
}

impl NodePath {
    /// The root location
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an absolute or root-relative path
    pub fn parse(path: &str) -> Result<Self> {
        PathExpr::parse(path)?
            .apply(&NodePath::root())
            .ok_or_else(|| Error::Value(format!("Path '{}' climbs above the root", path)))
    }

    /// Whether this is the root location
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The parent location (the root is its own parent)
    pub fn parent(&self) -> NodePath {
        let mut parent = self.clone();
        parent.segments.pop();
        parent
    }

    /// Append a child segment
    pub fn child(&self, name: impl Into<String>, index: usize) -> NodePath {
        let mut child = self.clone();
        child.segments.push((name.into(), index));
        child
    }

    /// The name of the last segment
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|(name, _)| name.as_str())
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether `self` equals `other` or lies below it
    pub fn starts_with(&self, other: &NodePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// The path with every occurrence index dropped, as used to address definitions
    pub fn schema_path(&self) -> String {
        let mut out = String::new();
        for (name, _) in &self.segments {
            out.push('/');
            out.push_str(name);
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for (name, index) in &self.segments {
            if *index == 0 {
                write!(f, "/{}", name)?;
            } else {
                write!(f, "/{}[{}]", name, index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        assert_eq!(PathStep::parse("").unwrap(), None);
        assert_eq!(PathStep::parse(".").unwrap(), None);
        assert_eq!(PathStep::parse("..").unwrap(), Some(PathStep::Parent));
        assert_eq!(
            PathStep::parse("layer[2]").unwrap(),
            Some(PathStep::Child {
                name: "layer".to_string(),
                index: Some(2)
            })
        );
        assert!(PathStep::parse("layer[x]").is_err());
        assert!(PathStep::parse("[1]").is_err());
    }

    #[test]
    fn test_parse_expr() {
        let expr = PathExpr::parse("/settings/name").unwrap();
        assert!(expr.absolute);
        assert_eq!(expr.steps.len(), 2);
        assert_eq!(expr.to_string(), "/settings/name");

        let expr = PathExpr::parse("../enabled").unwrap();
        assert!(!expr.absolute);
        assert!(expr.is_relative_upwards());
    }

    #[test]
    fn test_apply_relative() {
        let container = NodePath::parse("/physics/turbulence").unwrap();
        let expr = PathExpr::parse("../enabled").unwrap();
        assert_eq!(expr.apply(&container).unwrap().to_string(), "/physics/enabled");

        let expr = PathExpr::parse("./a/b[1]").unwrap();
        assert_eq!(
            expr.apply(&container).unwrap().to_string(),
            "/physics/turbulence/a/b[1]"
        );
    }

    #[test]
    fn test_apply_above_root() {
        let expr = PathExpr::parse("../../x").unwrap();
        assert!(expr.apply(&NodePath::parse("/a").unwrap()).is_none());
    }

    #[test]
    fn test_node_path_helpers() {
        let path = NodePath::parse("/a/b[3]/c").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.name(), Some("c"));
        assert_eq!(path.schema_path(), "/a/b/c");
        assert!(path.starts_with(&NodePath::parse("/a/b[3]").unwrap()));
        assert!(!path.starts_with(&NodePath::parse("/a/b").unwrap()));
        assert_eq!(NodePath::root().to_string(), "/");
    }
}
