//! Document validation
//!
//! Validation is collect-all: every node is checked independently and every
//! violation is reported with the path of the offending node. Values are
//! parsed with the declared base datatype before option and range checks;
//! ranges are inclusive on both ends.

use std::cmp::Ordering;

use super::elements::ElementDefinition;
use super::schemas::ResolvedSchema;

use crate::conditions::{ConditionEvaluator, ConditionPolicy};
use crate::datatypes::TypedValue;
use crate::error::{ValidationError, ValidationErrorKind};
use crate::paths::NodePath;
use crate::store::{Document, DocumentNode, StoreRegistry};

/// Options controlling document validation
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Report visible leaves that carry no value
    require_values: bool,
    /// Visibility policy used when deciding whether a missing value matters
    condition_policy: ConditionPolicy,
}

impl ValidationOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether visible leaves must carry a value
    pub fn require_values(&self) -> bool {
        self.require_values
    }

    /// Get the condition policy
    pub fn condition_policy(&self) -> ConditionPolicy {
        self.condition_policy
    }

    /// Require visible leaves to carry a value
    pub fn with_require_values(mut self, require: bool) -> Self {
        self.require_values = require;
        self
    }

    /// Set the condition policy
    pub fn with_condition_policy(mut self, policy: ConditionPolicy) -> Self {
        self.condition_policy = policy;
        self
    }
}

/// Validation context collecting errors during one traversal
#[derive(Debug, Default)]
pub struct ValidationContext {
    /// Collected validation errors
    pub errors: Vec<ValidationError>,
    /// Number of nodes checked
    pub checked: usize,
}

impl ValidationContext {
    /// Create a new context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Whether any error was collected
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Validates documents against a resolved schema
pub struct Validator<'a> {
    schema: &'a ResolvedSchema,
    options: ValidationOptions,
    stores: Option<&'a StoreRegistry<'a>>,
}

impl<'a> Validator<'a> {
    /// Create a validator with default options
    pub fn new(schema: &'a ResolvedSchema) -> Self {
        Self {
            schema,
            options: ValidationOptions::default(),
            stores: None,
        }
    }

    /// Set the options
    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach stores used by cross-store conditions
    pub fn with_stores(mut self, stores: &'a StoreRegistry<'a>) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Validate a document, returning every violation found
    pub fn validate(&self, document: &Document) -> Vec<ValidationError> {
        let empty = StoreRegistry::new();
        let stores = self.stores.unwrap_or(&empty);
        let evaluator = ConditionEvaluator::new(document, stores);

        let mut context = ValidationContext::new();
        self.check_node(
            self.schema.root(),
            document.root(),
            &NodePath::root(),
            &evaluator,
            &mut context,
        );
        tracing::debug!(
            version = %self.schema.version(),
            nodes = context.checked,
            valid = !context.has_errors(),
            errors = context.errors.len(),
            "document validated"
        );
        context.errors
    }

    fn check_node(
        &self,
        definition: &ElementDefinition,
        node: &DocumentNode,
        path: &NodePath,
        evaluator: &ConditionEvaluator<'_>,
        context: &mut ValidationContext,
    ) {
        context.checked += 1;

        if definition.can_have_value() {
            match node.value() {
                Some(raw) => check_value(definition, raw, path, context),
                None if self.options.require_values => {
                    let visible = evaluator
                        .is_visible(path, self.options.condition_policy)
                        .unwrap_or(true);
                    if visible {
                        context.add_error(ValidationError::new(
                            ValidationErrorKind::MissingValue,
                            path.to_string(),
                            "Value has not been set",
                        ));
                    }
                }
                None => {}
            }
        }

        for child_def in &definition.children {
            let count = node.occurrence_count(&child_def.name);
            let occurs = child_def.occurs;
            if occurs.is_missing(count as u32) {
                context.add_error(
                    ValidationError::new(
                        ValidationErrorKind::MissingRequiredOccurrence,
                        path.child(child_def.name.clone(), 0).to_string(),
                        format!("'{}' occurs {} time(s)", child_def.name, count),
                    )
                    .with_expected(format!("at least {}", occurs.min))
                    .with_actual(count.to_string()),
                );
            } else if occurs.is_exceeded(count as u32) {
                context.add_error(
                    ValidationError::new(
                        ValidationErrorKind::TooManyOccurrences,
                        path.child(child_def.name.clone(), 0).to_string(),
                        format!("'{}' occurs {} time(s)", child_def.name, count),
                    )
                    .with_expected(format!("at most {}", occurs.max.unwrap_or_default()))
                    .with_actual(count.to_string()),
                );
            }
            for (index, child) in node.occurrences(&child_def.name).enumerate() {
                let child_path = path.child(child_def.name.clone(), index);
                self.check_node(child_def, child, &child_path, evaluator, context);
            }
        }

        for child in node.children() {
            if definition.child(child.name()).is_none() {
                context.add_error(
                    ValidationError::new(
                        ValidationErrorKind::TooManyOccurrences,
                        path.child(child.name(), 0).to_string(),
                        format!("'{}' is not declared in schema {}", child.name(), self.schema.version()),
                    )
                    .with_expected("0"),
                );
            }
        }
    }
}

fn check_value(definition: &ElementDefinition, raw: &str, path: &NodePath, context: &mut ValidationContext) {
    let Some(base) = definition.base_type() else {
        return;
    };
    let value = match base.parse(raw) {
        Ok(value) => value,
        Err(_) => {
            context.add_error(
                ValidationError::new(
                    ValidationErrorKind::TypeMismatch,
                    path.to_string(),
                    format!("'{}' is not a valid {} value", raw, base),
                )
                .with_expected(base.as_str())
                .with_actual(raw),
            );
            return;
        }
    };

    if !definition.options.is_empty() {
        match definition.find_option(&value) {
            Some(option) if option.disabled => context.add_error(
                ValidationError::new(
                    ValidationErrorKind::DisabledOption,
                    path.to_string(),
                    format!("Option '{}' is disabled", option.value),
                )
                .with_actual(raw),
            ),
            Some(_) => {}
            None if definition.editable => {}
            None => {
                let allowed: Vec<&str> = definition
                    .options
                    .iter()
                    .filter(|o| !o.disabled)
                    .map(|o| o.value.as_str())
                    .collect();
                context.add_error(
                    ValidationError::new(
                        ValidationErrorKind::UnknownOptionValue,
                        path.to_string(),
                        format!("'{}' is not one of the predefined options", raw),
                    )
                    .with_expected(allowed.join(", "))
                    .with_actual(raw),
                );
            }
        }
    }

    check_range(definition, &value, raw, path, context);
}

fn check_range(
    definition: &ElementDefinition,
    value: &TypedValue,
    raw: &str,
    path: &NodePath,
    context: &mut ValidationContext,
) {
    let min = definition.min_bound().ok().flatten();
    let max = definition.max_bound().ok().flatten();
    let below = min
        .as_ref()
        .map_or(false, |min| value.partial_cmp(min) == Some(Ordering::Less));
    let above = max
        .as_ref()
        .map_or(false, |max| value.partial_cmp(max) == Some(Ordering::Greater));
    if below || above {
        let bound = |b: &Option<TypedValue>| b.as_ref().map_or("-".to_string(), |v| v.to_xml_string());
        context.add_error(
            ValidationError::new(
                ValidationErrorKind::OutOfRange,
                path.to_string(),
                format!("{} is outside the allowed range", raw),
            )
            .with_expected(format!("[{}, {}]", bound(&min), bound(&max)))
            .with_actual(raw),
        );
    }
}

impl ResolvedSchema {
    /// Validate a document against this schema
    pub fn validate(&self, document: &Document) -> Vec<ValidationError> {
        Validator::new(self).validate(document)
    }

    /// Whether a document validates without errors
    pub fn is_valid(&self, document: &Document) -> bool {
        self.validate(document).is_empty()
    }
}

impl Document {
    /// Validate this document against its own schema
    pub fn validate(&self) -> Vec<ValidationError> {
        self.schema().validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::Schema;
    use std::sync::Arc;

    const SCHEMA: &str = r#"
        <element name="store" version="1.0">
            <element name="temperature" type="float" minInclusive="-50" maxInclusive="60"/>
            <element name="count" type="int" minInclusive="0"/>
            <element name="method" type="int">
                <options>
                    <option value="1"/>
                    <option value="2"/>
                    <option value="3" disabled="True"/>
                </options>
            </element>
            <element name="scheme" type="string" editable="True">
                <options><option value="upwind"/></options>
            </element>
            <element name="enabled" type="bool"/>
            <element name="extra" type="string">
                <condition type="eq" variable="../enabled" value="True"/>
            </element>
            <element name="layer" type="float" minOccurs="1" maxOccurs="2"/>
            <element name="spin" type="duration" minOccurs="0" maxInclusive="PT1H"/>
        </element>
    "#;

    fn document() -> Document {
        let schema = Arc::new(Schema::from_string(SCHEMA).unwrap().resolve().unwrap());
        let mut doc = Document::new(schema);
        doc.set_value("/temperature", "22.5").unwrap();
        doc.set_value("/count", "3").unwrap();
        doc.set_value("/method", "2").unwrap();
        doc.set_value("/scheme", "upwind").unwrap();
        doc.set_value("/enabled", "False").unwrap();
        doc.set_value("/layer", "1.0").unwrap();
        doc
    }

    fn kinds(errors: &[ValidationError]) -> Vec<ValidationErrorKind> {
        errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_valid_document() {
        assert!(document().validate().is_empty());
    }

    #[test]
    fn test_out_of_range() {
        let mut doc = document();
        doc.set_value("/temperature", "75.2").unwrap();
        let errors = doc.validate();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::OutOfRange]);
        assert_eq!(errors[0].path, "/temperature");
        assert_eq!(errors[0].expected.as_deref(), Some("[-50, 60]"));

        doc.set_value("/temperature", "60").unwrap();
        assert!(doc.validate().is_empty());
        doc.set_value("/temperature", "-50.1").unwrap();
        assert_eq!(kinds(&doc.validate()), vec![ValidationErrorKind::OutOfRange]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut doc = document();
        doc.set_value("/temperature", "warm").unwrap();
        doc.set_value("/count", "-1").unwrap();
        doc.set_value("/method", "7").unwrap();
        doc.set_value("/enabled", "maybe").unwrap();
        let errors = doc.validate();
        assert_eq!(
            kinds(&errors),
            vec![
                ValidationErrorKind::TypeMismatch,
                ValidationErrorKind::OutOfRange,
                ValidationErrorKind::UnknownOptionValue,
                ValidationErrorKind::TypeMismatch,
            ]
        );
        assert_eq!(errors[2].expected.as_deref(), Some("1, 2"));
    }

    #[test]
    fn test_unrepresentable_values_are_type_mismatches() {
        let mut doc = document();
        for raw in ["-1e300", "P99999999999999W"] {
            doc.set_value("/spin", raw).unwrap();
            let errors = doc.validate();
            assert_eq!(kinds(&errors), vec![ValidationErrorKind::TypeMismatch], "{}", raw);
            assert_eq!(errors[0].path, "/spin");
        }

        doc.set_value("/spin", "PT2H").unwrap();
        assert_eq!(kinds(&doc.validate()), vec![ValidationErrorKind::OutOfRange]);

        let mut doc = document();
        doc.set_value("/temperature", "NaN").unwrap();
        assert_eq!(kinds(&doc.validate()), vec![ValidationErrorKind::TypeMismatch]);
    }

    #[test]
    fn test_options() {
        let mut doc = document();
        doc.set_value("/method", "3").unwrap();
        assert_eq!(kinds(&doc.validate()), vec![ValidationErrorKind::DisabledOption]);

        // Editable elements accept values outside their options
        let mut doc = document();
        doc.set_value("/scheme", "central").unwrap();
        assert!(doc.validate().is_empty());
    }

    #[test]
    fn test_occurrences() {
        let mut doc = document();
        doc.remove(&NodePath::parse("/layer").unwrap()).unwrap();
        let errors = doc.validate();
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::MissingRequiredOccurrence]);
        assert_eq!(errors[0].path, "/layer");

        let xml = r#"<store version="1.0"><layer>1</layer><layer>2</layer><layer>3</layer></store>"#;
        let doc = Document::from_xml(Arc::clone(document().schema()), xml).unwrap();
        let errors = doc.validate();
        assert!(kinds(&errors).contains(&ValidationErrorKind::TooManyOccurrences));
        assert!(kinds(&errors).contains(&ValidationErrorKind::MissingRequiredOccurrence));
    }

    #[test]
    fn test_required_values_skip_hidden_nodes() {
        let doc = document();
        let options = ValidationOptions::new().with_require_values(true);
        let schema = Arc::clone(doc.schema());
        assert!(Validator::new(&schema).with_options(options).validate(&doc).is_empty());

        let mut doc = document();
        doc.set_value("/enabled", "True").unwrap();
        let errors = Validator::new(&schema).with_options(options).validate(&doc);
        assert_eq!(kinds(&errors), vec![ValidationErrorKind::MissingValue]);
        assert_eq!(errors[0].path, "/extra");
    }
}
