//! Two-phase version converter
//!
//! A conversion builds a fresh target document in two phases:
//!
//! 1. **Link phase**: nodes whose path also exists in the target schema are
//!    copied over (unless disabled), then the declared links are applied in
//!    declaration order, so later links win.
//! 2. **Custom phase**: the custom code for the requested direction runs with
//!    the source and the populated target.
//!
//! The target is validated afterwards. Any failure discards the target.

use std::sync::Arc;
use std::time::Duration;

use super::definition::{ConversionLink, ConverterDefinition};
use super::script::{run_script, NoScriptEngine, ScriptEngine};

use crate::datatypes::TypedValue;
use crate::error::{ConversionError, ConversionErrorKind, Error, Result};
use crate::paths::{NodePath, PathExpr, PathStep};
use crate::store::{Document, DocumentNode};
use crate::validators::{ElementDefinition, ResolvedSchema};

/// Default time custom code may run
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Conversion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the converter's source version to its target version
    Forward,
    /// From the converter's target version back to its source version
    Backward,
}

impl Direction {
    /// The opposite direction
    pub fn reverse(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Configuration for conversions
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Copy nodes whose path exists in both schemas before applying links
    copy_same_paths: bool,
    /// Validate the converted document against the target schema
    validate_target: bool,
    /// Time custom code may run before it is cancelled
    script_timeout: Duration,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            copy_same_paths: true,
            validate_target: true,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }
}

impl ConversionOptions {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if same-path nodes are copied
    pub fn copy_same_paths(&self) -> bool {
        self.copy_same_paths
    }

    /// Check if the target is validated
    pub fn validate_target(&self) -> bool {
        self.validate_target
    }

    /// Get the script timeout
    pub fn script_timeout(&self) -> Duration {
        self.script_timeout
    }

    /// Set same-path copying
    pub fn with_copy_same_paths(mut self, copy: bool) -> Self {
        self.copy_same_paths = copy;
        self
    }

    /// Set target validation
    pub fn with_validate_target(mut self, validate: bool) -> Self {
        self.validate_target = validate;
        self
    }

    /// Set the script timeout
    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }
}

/// Converts documents between the two versions of a converter definition
///
/// Holds only shared, immutable data; one converter may serve conversions on
/// many threads at once.
#[derive(Clone)]
pub struct VersionConverter {
    definition: Arc<ConverterDefinition>,
    source: Arc<ResolvedSchema>,
    target: Arc<ResolvedSchema>,
    options: ConversionOptions,
    engine: Arc<dyn ScriptEngine>,
}

impl std::fmt::Debug for VersionConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionConverter")
            .field("source", &self.source.version())
            .field("target", &self.target.version())
            .field("links", &self.definition.links().len())
            .field("options", &self.options)
            .finish()
    }
}

impl VersionConverter {
    /// Create a converter, checking versions and links against both schemas
    pub fn new(
        definition: Arc<ConverterDefinition>,
        source: Arc<ResolvedSchema>,
        target: Arc<ResolvedSchema>,
    ) -> Result<Self> {
        for (schema, expected) in [
            (&source, definition.source_version()),
            (&target, definition.target_version()),
        ] {
            if schema.version() != expected {
                return Err(Error::Conversion(
                    ConversionError::new(
                        ConversionErrorKind::VersionMismatch,
                        format!(
                            "Converter expects version '{}', schema has version '{}'",
                            expected,
                            schema.version()
                        ),
                    )
                    .with_versions(definition.source_version(), definition.target_version()),
                ));
            }
        }

        for link in definition.links() {
            check_link(link, &source, &target).map_err(|e| {
                Error::Conversion(
                    e.with_versions(definition.source_version(), definition.target_version()),
                )
            })?;
        }

        Ok(Self {
            definition,
            source,
            target,
            options: ConversionOptions::default(),
            engine: Arc::new(NoScriptEngine),
        })
    }

    /// Set the options
    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the engine that runs custom code
    pub fn with_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// The converter definition
    pub fn definition(&self) -> &ConverterDefinition {
        &self.definition
    }

    /// The options
    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// (from, to) schemas for a direction
    pub fn schemas(&self, direction: Direction) -> (&Arc<ResolvedSchema>, &Arc<ResolvedSchema>) {
        match direction {
            Direction::Forward => (&self.source, &self.target),
            Direction::Backward => (&self.target, &self.source),
        }
    }

    /// Convert from the source version to the target version
    pub fn forward(&self, document: &Document) -> Result<Document> {
        self.convert(document, Direction::Forward)
    }

    /// Convert from the target version back to the source version
    pub fn backward(&self, document: &Document) -> Result<Document> {
        self.convert(document, Direction::Backward)
    }

    /// Convert a document in the given direction
    pub fn convert(&self, document: &Document, direction: Direction) -> Result<Document> {
        let (from, to) = self.definition.versions(direction);
        self.run(document, direction).map_err(|e| match e {
            Error::Conversion(e) if e.source_version.is_none() => {
                Error::Conversion(e.with_versions(from, to))
            }
            other => other,
        })
    }

    fn run(&self, document: &Document, direction: Direction) -> Result<Document> {
        let (from_schema, to_schema) = self.schemas(direction);
        if document.version() != from_schema.version() {
            return Err(Error::Conversion(ConversionError::new(
                ConversionErrorKind::VersionMismatch,
                format!(
                    "Document has version '{}', converter reads version '{}'",
                    document.version(),
                    from_schema.version()
                ),
            )));
        }

        let mut target = Document::new(Arc::clone(to_schema));

        if self.options.copy_same_paths {
            copy_node(document.root(), &NodePath::root(), &mut target)?;
        }
        let links = self.definition.links_for(direction);
        for link in &links {
            apply_link(link, document, &mut target)?;
        }
        tracing::debug!(
            from = %from_schema.version(),
            to = %to_schema.version(),
            links = links.len(),
            "link phase complete"
        );

        if let Some(code) = self.definition.code_for(direction) {
            run_script(
                self.engine.as_ref(),
                code,
                document,
                &mut target,
                self.options.script_timeout,
            )?;
            tracing::debug!(to = %to_schema.version(), "custom phase complete");
        }

        if self.options.validate_target {
            let errors = to_schema.validate(&target);
            if !errors.is_empty() {
                return Err(Error::Conversion(
                    ConversionError::new(
                        ConversionErrorKind::TargetValidationFailed,
                        format!("Converted document has {} validation error(s)", errors.len()),
                    )
                    .with_validation_errors(errors),
                ));
            }
        }
        Ok(target)
    }

    /// Source leaf paths that a conversion in `direction` does not carry over
    ///
    /// A leaf is carried when a link covers it or, with same-path copying, when
    /// the target schema has a leaf at the same path.
    pub fn dropped_paths(&self, direction: Direction) -> Vec<String> {
        let (from_schema, to_schema) = self.schemas(direction);
        let covered: Vec<String> = self
            .definition
            .links_for(direction)
            .iter()
            .filter_map(|link| link.source.apply(&NodePath::root()))
            .map(|path| path.schema_path())
            .collect();

        let dropped: Vec<String> = from_schema
            .leaf_paths()
            .into_iter()
            .filter(|leaf| {
                let linked = covered
                    .iter()
                    .any(|c| leaf == c || c == "/" || leaf.starts_with(&format!("{}/", c)));
                let same_path = self.options.copy_same_paths
                    && to_schema
                        .find(leaf)
                        .map_or(false, |def| def.can_have_value());
                !linked && !same_path
            })
            .collect();
        for path in &dropped {
            tracing::debug!(path = %path, from = %from_schema.version(), "path dropped by conversion");
        }
        dropped
    }
}

/// Find the definition a converter path addresses
fn definition_at<'a>(schema: &'a ResolvedSchema, expr: &PathExpr) -> Option<&'a Arc<ElementDefinition>> {
    expr.apply(&NodePath::root())
        .and_then(|path| schema.find_path(&path))
}

fn check_link(
    link: &ConversionLink,
    source: &ResolvedSchema,
    target: &ResolvedSchema,
) -> std::result::Result<(), ConversionError> {
    let invalid = |message: String| ConversionError::new(ConversionErrorKind::InvalidLink, message);

    let source_def = definition_at(source, &link.source).ok_or_else(|| {
        invalid(format!(
            "Link source '{}' does not exist in version {}",
            link.source,
            source.version()
        ))
        .with_path(link.source.to_string())
    })?;
    let target_def = definition_at(target, &link.target).ok_or_else(|| {
        invalid(format!(
            "Link target '{}' does not exist in version {}",
            link.target,
            target.version()
        ))
        .with_path(link.target.to_string())
    })?;
    if source_def.can_have_value() != target_def.can_have_value() {
        return Err(invalid(format!(
            "Link '{}' -> '{}' connects a value node with a container",
            link.source, link.target
        ))
        .with_path(link.source.to_string()));
    }
    Ok(())
}

/// Locations selected by a converter path in a document
///
/// An unindexed final step selects every occurrence; unindexed intermediate
/// steps select the first.
fn select(document: &Document, expr: &PathExpr) -> Vec<NodePath> {
    let Some(path) = expr.apply(&NodePath::root()) else {
        return Vec::new();
    };
    match expr.steps.last() {
        Some(PathStep::Child { name, index: None }) => {
            let parent = path.parent();
            let count = document
                .get(&parent)
                .map_or(0, |node| node.occurrence_count(name));
            (0..count).map(|i| parent.child(name.clone(), i)).collect()
        }
        _ => document.get(&path).map(|_| vec![path]).unwrap_or_default(),
    }
}

/// Target location for the `occurrence`-th selected source node
fn target_location(expr: &PathExpr, occurrence: usize) -> Option<NodePath> {
    let path = expr.apply(&NodePath::root())?;
    match expr.steps.last() {
        Some(PathStep::Child { name, index: None }) => Some(path.parent().child(name.clone(), occurrence)),
        _ => Some(path),
    }
}

fn apply_link(link: &ConversionLink, source: &Document, target: &mut Document) -> Result<()> {
    for (occurrence, source_path) in select(source, &link.source).into_iter().enumerate() {
        let Some(node) = source.get(&source_path) else {
            continue;
        };
        let Some(target_path) = target_location(&link.target, occurrence) else {
            continue;
        };
        tracing::trace!(source = %source_path, target = %target_path, "applying link");
        copy_node(node, &target_path, target)?;
    }
    Ok(())
}

/// Copy a source subtree to `path` in the target, following same-named children
fn copy_node(node: &DocumentNode, path: &NodePath, target: &mut Document) -> Result<()> {
    let Some(definition) = target.schema().find_path(path).cloned() else {
        return Ok(());
    };
    if let Some((_, index)) = path.segments.last() {
        if definition.occurs.is_over(*index as u32) {
            tracing::debug!(path = %path, "occurrence beyond target maxOccurs dropped");
            return Ok(());
        }
    }

    let coerced = match (node.value(), definition.can_have_value()) {
        (Some(raw), true) => Some(coerce(node, raw, &definition, path)?),
        _ => None,
    };
    match coerced {
        Some(value) => target.set_value_at(path, Some(value))?,
        None => {
            target.ensure(path)?;
        }
    }

    let mut seen: Vec<(&str, usize)> = Vec::new();
    for child in node.children() {
        let index = match seen.iter_mut().find(|(name, _)| *name == child.name()) {
            Some((_, count)) => {
                *count += 1;
                *count
            }
            None => {
                seen.push((child.name(), 0));
                0
            }
        };
        if definition.child(child.name()).is_some() {
            copy_node(child, &path.child(child.name(), index), target)?;
        }
    }
    Ok(())
}

fn coerce(node: &DocumentNode, raw: &str, definition: &ElementDefinition, path: &NodePath) -> Result<String> {
    let Some(target_type) = definition.base_type() else {
        return Ok(raw.to_string());
    };
    let value = node
        .typed_value()
        .ok()
        .flatten()
        .unwrap_or_else(|| TypedValue::String(raw.to_string()));
    value
        .coerce_to(target_type)
        .map(|v| v.to_xml_string())
        .map_err(|e| {
            Error::Conversion(
                ConversionError::new(ConversionErrorKind::UnsupportedTypeCoercion, e.to_string())
                    .with_path(path.to_string()),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::ScriptContext;
    use crate::validators::Schema;
    use pretty_assertions::assert_eq;

    const V1: &str = r#"
        <element name="model" version="1.0">
            <element name="settings">
                <element name="name" type="string"/>
                <element name="steps" type="int"/>
                <element name="legacy" type="bool"/>
            </element>
            <element name="layers">
                <element name="layer" type="float" minOccurs="0" maxOccurs="unbounded"/>
            </element>
        </element>
    "#;

    const V2: &str = r#"
        <element name="model" version="2.0">
            <element name="settings">
                <element name="label" type="string"/>
                <element name="steps" type="float"/>
            </element>
            <element name="layers">
                <element name="level" type="float" minOccurs="0" maxOccurs="2"/>
            </element>
        </element>
    "#;

    const CONVERTER: &str = r#"
        <converter source="1.0" target="2.0">
            <links>
                <link source="/settings/name" target="/settings/label"/>
                <link source="/layers/layer" target="/layers/level"/>
            </links>
        </converter>
    "#;

    fn schema(text: &str) -> Arc<ResolvedSchema> {
        Arc::new(Schema::from_string(text).unwrap().resolve().unwrap())
    }

    fn converter(text: &str) -> VersionConverter {
        let definition = Arc::new(ConverterDefinition::from_string(text).unwrap());
        VersionConverter::new(definition, schema(V1), schema(V2)).unwrap()
    }

    fn source_document(converter: &VersionConverter) -> Document {
        let mut doc = Document::new(Arc::clone(converter.schemas(Direction::Forward).0));
        doc.set_value("/settings/name", "Run A").unwrap();
        doc.set_value("/settings/steps", "100").unwrap();
        doc.set_value("/settings/legacy", "True").unwrap();
        doc
    }

    fn conversion_kind(result: Result<Document>) -> Option<ConversionErrorKind> {
        match result {
            Err(Error::Conversion(e)) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn test_forward_and_backward() {
        let converter = converter(CONVERTER);
        let source = source_document(&converter);

        let target = converter.forward(&source).unwrap();
        assert_eq!(target.version(), "2.0");
        assert_eq!(target.value("/settings/label"), Some("Run A"));
        assert_eq!(target.value("/settings/steps"), Some("100"));

        let back = converter.backward(&target).unwrap();
        assert_eq!(back.version(), "1.0");
        assert_eq!(back.value("/settings/name"), Some("Run A"));
        assert_eq!(back.value("/settings/steps"), Some("100"));
        // Not carried by any link or same path
        assert_eq!(back.value("/settings/legacy"), None);
    }

    #[test]
    fn test_repeated_occurrences() {
        let converter = converter(CONVERTER);
        let mut source = source_document(&converter);
        for (i, v) in ["1.5", "2.5", "3.5"].iter().enumerate() {
            source.set_value(&format!("/layers/layer[{}]", i), *v).unwrap();
        }

        let target = converter.forward(&source).unwrap();
        let layers = target.find("/layers").unwrap();
        // maxOccurs=2 in the target
        assert_eq!(layers.occurrence_count("level"), 2);
        assert_eq!(target.value("/layers/level[1]"), Some("2.5"));
    }

    #[test]
    fn test_later_links_win() {
        let text = r#"
            <converter source="1.0" target="2.0">
                <links>
                    <link source="/settings/name" target="/settings/label"/>
                    <link source="/settings/steps" target="/settings/label"/>
                </links>
            </converter>
        "#;
        let converter = converter(text);
        let target = converter.forward(&source_document(&converter)).unwrap();
        assert_eq!(target.value("/settings/label"), Some("100"));
    }

    #[test]
    fn test_coercion_failure() {
        let text = r#"
            <converter source="1.0" target="2.0">
                <links><link source="/settings/name" target="/settings/steps"/></links>
            </converter>
        "#;
        let converter = converter(text);
        let result = converter.forward(&source_document(&converter));
        match result {
            Err(Error::Conversion(e)) => {
                assert_eq!(e.kind, ConversionErrorKind::UnsupportedTypeCoercion);
                assert_eq!(e.path.as_deref(), Some("/settings/steps"));
                assert_eq!(e.source_version.as_deref(), Some("1.0"));
                assert_eq!(e.target_version.as_deref(), Some("2.0"));
            }
            other => panic!("unexpected result: {:?}", other.map(|d| d.to_xml())),
        }
    }

    #[test]
    fn test_invalid_links() {
        for text in [
            r#"<converter source="1.0" target="2.0"><links><link source="/settings/nope" target="/settings/label"/></links></converter>"#,
            r#"<converter source="1.0" target="2.0"><links><link source="/settings/name" target="/nope"/></links></converter>"#,
            r#"<converter source="1.0" target="2.0"><links><link source="/settings" target="/settings/label"/></links></converter>"#,
        ] {
            let definition = Arc::new(ConverterDefinition::from_string(text).unwrap());
            let result = VersionConverter::new(definition, schema(V1), schema(V2));
            assert!(matches!(
                result,
                Err(Error::Conversion(ref e)) if e.kind == ConversionErrorKind::InvalidLink
            ));
        }
    }

    #[test]
    fn test_version_mismatch() {
        let definition = Arc::new(ConverterDefinition::from_string(CONVERTER).unwrap());
        let result = VersionConverter::new(definition, schema(V2), schema(V1));
        assert!(matches!(
            result,
            Err(Error::Conversion(ref e)) if e.kind == ConversionErrorKind::VersionMismatch
        ));

        let converter = converter(CONVERTER);
        let source = source_document(&converter);
        assert_eq!(
            conversion_kind(converter.backward(&source)),
            Some(ConversionErrorKind::VersionMismatch)
        );
    }

    #[test]
    fn test_custom_code_overrides_links() {
        let text = r#"
            <converter source="1.0" target="2.0">
                <links><link source="/settings/name" target="/settings/label"/></links>
                <custom><forward>upper</forward></custom>
            </converter>
        "#;
        let engine = |code: &str, context: &mut ScriptContext<'_>| -> Result<()> {
            assert_eq!(code, "upper");
            let label = context.target().value("/settings/label").unwrap_or_default().to_uppercase();
            context.target_mut().set_value("/settings/label", label)
        };
        let converter = converter(text).with_engine(Arc::new(engine));
        let target = converter.forward(&source_document(&converter)).unwrap();
        assert_eq!(target.value("/settings/label"), Some("RUN A"));

        // No backward code: the engine is not needed
        assert!(converter.backward(&target).is_ok());
    }

    #[test]
    fn test_custom_code_without_engine() {
        let text = r#"
            <converter source="1.0" target="2.0">
                <custom><forward>anything</forward></custom>
            </converter>
        "#;
        let converter = converter(text);
        assert_eq!(
            conversion_kind(converter.forward(&source_document(&converter))),
            Some(ConversionErrorKind::CustomCodeFailure)
        );
    }

    #[test]
    fn test_target_validation() {
        let text = r#"
            <converter source="1.0" target="2.0">
                <custom><forward>break</forward></custom>
            </converter>
        "#;
        let engine = |_code: &str, context: &mut ScriptContext<'_>| -> Result<()> {
            context
                .target_mut()
                .remove(&NodePath::parse("/settings/label")?)
                .map(|_| ())
        };
        let converter = converter(text).with_engine(Arc::new(engine));
        match converter.forward(&source_document(&converter)) {
            Err(Error::Conversion(e)) => {
                assert_eq!(e.kind, ConversionErrorKind::TargetValidationFailed);
                assert_eq!(e.validation_errors.len(), 1);
                assert_eq!(e.validation_errors[0].path, "/settings/label");
            }
            other => panic!("unexpected result: {:?}", other.map(|d| d.to_xml())),
        }

        let converter = converter.with_options(ConversionOptions::new().with_validate_target(false));
        assert!(converter.forward(&source_document(&converter)).is_ok());
    }

    #[test]
    fn test_without_same_path_copy() {
        let converter = converter(CONVERTER)
            .with_options(ConversionOptions::new().with_copy_same_paths(false));
        let target = converter.forward(&source_document(&converter)).unwrap();
        assert_eq!(target.value("/settings/label"), Some("Run A"));
        assert_eq!(target.value("/settings/steps"), None);
        assert_eq!(
            converter.dropped_paths(Direction::Forward),
            vec!["/settings/steps".to_string(), "/settings/legacy".to_string()]
        );
    }

    #[test]
    fn test_dropped_paths() {
        let converter = converter(CONVERTER);
        assert_eq!(
            converter.dropped_paths(Direction::Forward),
            vec!["/settings/legacy".to_string()]
        );
        assert!(converter.dropped_paths(Direction::Backward).is_empty());
    }
}
