//! Element definitions
//!
//! Schema-level description of the nodes a store may contain: datatype,
//! constraints, occurrence bounds, visibility condition, predefined options
//! and ordered children. Resolved definitions are immutable and shared
//! through `Arc`.

use std::fmt;
use std::sync::Arc;

use crate::datatypes::{BaseDataType, TypedValue};
use crate::error::Result;
use crate::paths::PathExpr;

/// Occurrence bounds of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// Whether maxOccurs >= minOccurs
    pub fn is_valid(&self) -> bool {
        self.max.map_or(true, |max| max >= self.min)
    }

    /// Check if particle has maxOccurs == 1
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if occurrence count is under the minimum
    pub fn is_missing(&self, count: u32) -> bool {
        count < self.min
    }

    /// Check if occurrence count is at or over the maximum
    pub fn is_over(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count >= max,
            None => false,
        }
    }

    /// Check if occurrence count exceeds the maximum
    pub fn is_exceeded(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count > max,
            None => false,
        }
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {}]", self.min, max),
            None => write!(f, "[{}, unbounded]", self.min),
        }
    }
}

/// One entry of an element's predefined value list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionDefinition {
    /// The option value
    pub value: String,
    /// Display label
    pub label: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Whether the option exists but may not be selected
    pub disabled: bool,
}

impl OptionDefinition {
    /// Create a new enabled option
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: None,
            description: None,
            disabled: false,
        }
    }

    /// Mark the option as disabled
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Condition combinator or comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// All children must hold (empty = true)
    And,
    /// At least one child must hold (empty = false)
    Or,
    /// Variable equals the literal value
    Eq,
    /// Variable differs from the literal value
    Ne,
}

impl ConditionType {
    /// Parse from the `type` attribute
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "and" => Some(ConditionType::And),
            "or" => Some(ConditionType::Or),
            "eq" => Some(ConditionType::Eq),
            "ne" => Some(ConditionType::Ne),
            _ => None,
        }
    }

    /// Get the attribute spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::And => "and",
            ConditionType::Or => "or",
            ConditionType::Eq => "eq",
            ConditionType::Ne => "ne",
        }
    }

    /// Whether this is a leaf comparison
    pub fn is_comparison(&self) -> bool {
        matches!(self, ConditionType::Eq | ConditionType::Ne)
    }
}

/// Visibility predicate attached to an element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionNode {
    /// Condition type
    pub kind: ConditionType,
    /// Variable path (eq/ne), relative to the container of the owning element
    pub variable: Option<PathExpr>,
    /// Literal to compare against (eq/ne)
    pub value: Option<String>,
    /// Name of an attached store to read the variable from
    pub source: Option<String>,
    /// Child conditions (and/or)
    pub children: Vec<ConditionNode>,
}

impl ConditionNode {
    /// Create an `eq` comparison
    pub fn eq(variable: PathExpr, value: impl Into<String>) -> Self {
        Self::comparison(ConditionType::Eq, variable, value)
    }

    /// Create a `ne` comparison
    pub fn ne(variable: PathExpr, value: impl Into<String>) -> Self {
        Self::comparison(ConditionType::Ne, variable, value)
    }

    fn comparison(kind: ConditionType, variable: PathExpr, value: impl Into<String>) -> Self {
        Self {
            kind,
            variable: Some(variable),
            value: Some(value.into()),
            source: None,
            children: Vec::new(),
        }
    }

    /// Create an `and` combinator
    pub fn and(children: Vec<ConditionNode>) -> Self {
        Self::combinator(ConditionType::And, children)
    }

    /// Create an `or` combinator
    pub fn or(children: Vec<ConditionNode>) -> Self {
        Self::combinator(ConditionType::Or, children)
    }

    fn combinator(kind: ConditionType, children: Vec<ConditionNode>) -> Self {
        Self {
            kind,
            variable: None,
            value: None,
            source: None,
            children,
        }
    }

    /// Redirect variable lookups to an attached store
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Datatype token together with the base datatype it maps to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatatypeRef {
    /// The token as written in the schema (may be an alias)
    pub token: String,
    /// The base datatype
    pub base: BaseDataType,
}

/// Attributes declared on an element, template or link
///
/// Every field is optional so that a link can declare only the attributes it
/// overrides. The set is hashable and doubles as the memoization key of link
/// resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ElementAttributes {
    /// `name`
    pub name: Option<String>,
    /// `label`
    pub label: Option<String>,
    /// `description`
    pub description: Option<String>,
    /// `unit`
    pub unit: Option<String>,
    /// `type`
    pub datatype: Option<DatatypeRef>,
    /// `minInclusive`
    pub min_inclusive: Option<String>,
    /// `maxInclusive`
    pub max_inclusive: Option<String>,
    /// `minOccurs`
    pub min_occurs: Option<u32>,
    /// `maxOccurs`; `Some(None)` is an explicit `unbounded`
    pub max_occurs: Option<Option<u32>>,
    /// `grouponly`
    pub grouponly: Option<bool>,
    /// `hidden`
    pub hidden: Option<bool>,
    /// `editable`
    pub editable: Option<bool>,
    /// `version`
    pub version: Option<String>,
}

impl ElementAttributes {
    /// Layer `overrides` on top of `self`; set fields of `overrides` win
    pub fn overlay(&self, overrides: &ElementAttributes) -> ElementAttributes {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }
        ElementAttributes {
            name: pick(&self.name, &overrides.name),
            label: pick(&self.label, &overrides.label),
            description: pick(&self.description, &overrides.description),
            unit: pick(&self.unit, &overrides.unit),
            datatype: pick(&self.datatype, &overrides.datatype),
            min_inclusive: pick(&self.min_inclusive, &overrides.min_inclusive),
            max_inclusive: pick(&self.max_inclusive, &overrides.max_inclusive),
            min_occurs: pick(&self.min_occurs, &overrides.min_occurs),
            max_occurs: pick(&self.max_occurs, &overrides.max_occurs),
            grouponly: pick(&self.grouponly, &overrides.grouponly),
            hidden: pick(&self.hidden, &overrides.hidden),
            editable: pick(&self.editable, &overrides.editable),
            version: pick(&self.version, &overrides.version),
        }
    }

    /// Occurrence bounds, with unset ends defaulting to 1
    pub fn occurs(&self) -> Occurs {
        Occurs::new(self.min_occurs.unwrap_or(1), self.max_occurs.unwrap_or(Some(1)))
    }

    /// Whether any attribute is set
    pub fn is_empty(&self) -> bool {
        *self == ElementAttributes::default()
    }
}

/// A fully resolved element definition
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDefinition {
    /// Element name (unique among flattened siblings)
    pub name: String,
    /// Display label (at most 80 characters)
    pub label: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Unit of the value
    pub unit: Option<String>,
    /// Datatype; `None` for containers that carry no value
    pub datatype: Option<DatatypeRef>,
    /// Inclusive lower bound, as written
    pub min_inclusive: Option<String>,
    /// Inclusive upper bound, as written
    pub max_inclusive: Option<String>,
    /// Occurrence bounds
    pub occurs: Occurs,
    /// Pure grouping element; its children count as siblings of its own siblings
    pub grouponly: bool,
    /// Never shown
    pub hidden: bool,
    /// Values outside the option list are accepted
    pub editable: bool,
    /// Schema version (root only)
    pub version: Option<String>,
    /// Visibility condition
    pub condition: Option<ConditionNode>,
    /// Predefined values
    pub options: Vec<OptionDefinition>,
    /// Ordered children
    pub children: Vec<Arc<ElementDefinition>>,
}

impl ElementDefinition {
    /// Create a container definition with default attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            description: None,
            unit: None,
            datatype: None,
            min_inclusive: None,
            max_inclusive: None,
            occurs: Occurs::default(),
            grouponly: false,
            hidden: false,
            editable: false,
            version: None,
            condition: None,
            options: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Build a childless definition from declared attributes
    pub fn from_attributes(name: impl Into<String>, attrs: &ElementAttributes) -> Self {
        Self {
            name: name.into(),
            label: attrs.label.clone(),
            description: attrs.description.clone(),
            unit: attrs.unit.clone(),
            datatype: attrs.datatype.clone(),
            min_inclusive: attrs.min_inclusive.clone(),
            max_inclusive: attrs.max_inclusive.clone(),
            occurs: attrs.occurs(),
            grouponly: attrs.grouponly.unwrap_or(false),
            hidden: attrs.hidden.unwrap_or(false),
            editable: attrs.editable.unwrap_or(false),
            version: attrs.version.clone(),
            condition: None,
            options: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The declared attributes of this definition, all set
    pub fn attributes(&self) -> ElementAttributes {
        ElementAttributes {
            name: Some(self.name.clone()),
            label: self.label.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            datatype: self.datatype.clone(),
            min_inclusive: self.min_inclusive.clone(),
            max_inclusive: self.max_inclusive.clone(),
            min_occurs: Some(self.occurs.min),
            max_occurs: Some(self.occurs.max),
            grouponly: Some(self.grouponly),
            hidden: Some(self.hidden),
            editable: Some(self.editable),
            version: self.version.clone(),
        }
    }

    /// The base datatype, if this element carries a value
    pub fn base_type(&self) -> Option<BaseDataType> {
        self.datatype.as_ref().map(|d| d.base)
    }

    /// Whether nodes of this element carry a value
    pub fn can_have_value(&self) -> bool {
        self.datatype.is_some() && !self.grouponly
    }

    /// Whether nodes of this element may repeat
    pub fn can_have_clones(&self) -> bool {
        !self.occurs.is_single()
    }

    /// Find a direct child definition by name
    pub fn child(&self, name: &str) -> Option<&Arc<ElementDefinition>> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Parse the lower bound under the element's datatype
    pub fn min_bound(&self) -> Result<Option<TypedValue>> {
        self.parse_bound(self.min_inclusive.as_deref())
    }

    /// Parse the upper bound under the element's datatype
    pub fn max_bound(&self) -> Result<Option<TypedValue>> {
        self.parse_bound(self.max_inclusive.as_deref())
    }

    fn parse_bound(&self, bound: Option<&str>) -> Result<Option<TypedValue>> {
        match (bound, self.base_type()) {
            (Some(raw), Some(base)) => base.parse(raw).map(Some),
            (Some(raw), None) => BaseDataType::String.parse(raw).map(Some),
            (None, _) => Ok(None),
        }
    }

    /// Look up an option by value, comparing under the element's datatype
    pub fn find_option(&self, value: &TypedValue) -> Option<&OptionDefinition> {
        let base = value.datatype();
        self.options
            .iter()
            .find(|opt| base.parse(&opt.value).map_or(false, |v| &v == value))
    }

    /// Names visible at this element's child level, with group-only children flattened
    pub fn flattened_child_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for child in &self.children {
            if child.grouponly {
                names.extend(child.flattened_child_names());
            } else {
                names.push(child.name.as_str());
            }
        }
        names
    }

    /// Count of definitions in this subtree (including self)
    pub fn count_definitions(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| c.count_definitions())
            .sum::<usize>()
    }
}
