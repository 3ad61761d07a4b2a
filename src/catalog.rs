//! Schema catalog
//!
//! A [`SchemaCatalog`] holds every resolved schema version and every
//! converter known to the application. It is built once, is immutable
//! afterwards, and may be installed as the process-wide catalog with
//! [`init`]. Conversions between versions without a direct converter follow
//! the shortest chain of converters, each usable in either direction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::converters::{ConversionOptions, ConverterDefinition, Direction, ScriptEngine, VersionConverter};
use crate::error::{ConversionError, ConversionErrorKind, Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use crate::store::Document;
use crate::validators::{ResolvedSchema, Schema, SchemaOptions};

static GLOBAL_CATALOG: OnceCell<SchemaCatalog> = OnceCell::new();

/// Install the process-wide catalog; fails if one is already installed
pub fn init(catalog: SchemaCatalog) -> Result<&'static SchemaCatalog> {
    GLOBAL_CATALOG
        .set(catalog)
        .map_err(|_| Error::Resource("The global schema catalog is already initialized".to_string()))?;
    GLOBAL_CATALOG
        .get()
        .ok_or_else(|| Error::Resource("The global schema catalog is not initialized".to_string()))
}

/// The process-wide catalog, if installed
pub fn global() -> Option<&'static SchemaCatalog> {
    GLOBAL_CATALOG.get()
}

/// Builder collecting schemas and converter definitions
#[derive(Default)]
pub struct SchemaCatalogBuilder {
    schemas: IndexMap<String, Arc<ResolvedSchema>>,
    definitions: Vec<ConverterDefinition>,
    schema_options: SchemaOptions,
    options: ConversionOptions,
    engine: Option<Arc<dyn ScriptEngine>>,
}

impl SchemaCatalogBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used when loading schemas from locations
    pub fn with_schema_options(mut self, options: SchemaOptions) -> Self {
        self.schema_options = options;
        self
    }

    /// Options applied to every converter
    pub fn with_conversion_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    /// Engine running custom converter code
    pub fn with_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Add an already resolved schema; a later schema replaces one with the same version
    pub fn add_resolved(mut self, schema: Arc<ResolvedSchema>) -> Self {
        let version = schema.version().to_string();
        if self.schemas.insert(version.clone(), schema).is_some() {
            tracing::warn!(version = %version, "schema version registered twice, keeping the last one");
        }
        self
    }

    /// Resolve and add a loaded schema
    pub fn add_schema(self, schema: &Schema) -> Result<Self> {
        let resolved = schema.resolve()?;
        Ok(self.add_resolved(Arc::new(resolved)))
    }

    /// Load, resolve and add a schema
    pub fn load_schema(self, location: &Location) -> Result<Self> {
        let schema = Schema::from_location(location, &self.schema_options)?;
        self.add_schema(&schema)
    }

    /// Add a converter definition
    pub fn add_converter(mut self, definition: ConverterDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Load and add a converter definition
    pub fn load_converter(self, location: &Location) -> Result<Self> {
        let limits: Limits = self.schema_options.limits().clone();
        let definition = ConverterDefinition::from_location(location, &limits)?;
        Ok(self.add_converter(definition))
    }

    /// Build the catalog, checking every converter against its schemas
    pub fn build(self) -> Result<SchemaCatalog> {
        let mut converters = Vec::with_capacity(self.definitions.len());
        for definition in self.definitions {
            let lookup = |version: &str| {
                self.schemas.get(version).cloned().ok_or_else(|| {
                    Error::Conversion(
                        ConversionError::new(
                            ConversionErrorKind::VersionMismatch,
                            format!("Converter refers to unknown schema version '{}'", version),
                        )
                        .with_versions(definition.source_version(), definition.target_version()),
                    )
                })
            };
            let source = lookup(definition.source_version())?;
            let target = lookup(definition.target_version())?;
            let mut converter = VersionConverter::new(Arc::new(definition), source, target)?
                .with_options(self.options.clone());
            if let Some(ref engine) = self.engine {
                converter = converter.with_engine(Arc::clone(engine));
            }
            converters.push(converter);
        }
        tracing::debug!(
            schemas = self.schemas.len(),
            converters = converters.len(),
            "schema catalog built"
        );
        Ok(SchemaCatalog {
            schemas: self.schemas,
            converters,
        })
    }
}

/// Immutable registry of schema versions and converters
#[derive(Debug)]
pub struct SchemaCatalog {
    schemas: IndexMap<String, Arc<ResolvedSchema>>,
    converters: Vec<VersionConverter>,
}

impl SchemaCatalog {
    /// Start building a catalog
    pub fn builder() -> SchemaCatalogBuilder {
        SchemaCatalogBuilder::new()
    }

    /// The schema for a version
    pub fn schema(&self, version: &str) -> Option<&Arc<ResolvedSchema>> {
        self.schemas.get(version)
    }

    /// Registered versions in registration order
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Registered converters
    pub fn converters(&self) -> &[VersionConverter] {
        &self.converters
    }

    /// A converter connecting two versions directly, with the direction to use
    pub fn converter(&self, from: &str, to: &str) -> Option<(&VersionConverter, Direction)> {
        self.converters.iter().find_map(|converter| {
            let definition = converter.definition();
            if definition.versions(Direction::Forward) == (from, to) {
                Some((converter, Direction::Forward))
            } else if definition.versions(Direction::Backward) == (from, to) {
                Some((converter, Direction::Backward))
            } else {
                None
            }
        })
    }

    /// The shortest chain of converter steps from one version to another
    pub fn route(&self, from: &str, to: &str) -> Result<Vec<(&VersionConverter, Direction)>> {
        let no_route = || {
            Error::Conversion(
                ConversionError::new(
                    ConversionErrorKind::NoRoute,
                    format!("No conversion route from version '{}' to '{}'", from, to),
                )
                .with_versions(from, to),
            )
        };
        if self.schema(from).is_none() || self.schema(to).is_none() {
            return Err(no_route());
        }
        if from == to {
            return Ok(Vec::new());
        }

        let mut previous: HashMap<&str, (&str, usize, Direction)> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(version) = queue.pop_front() {
            if version == to {
                break;
            }
            for (index, converter) in self.converters.iter().enumerate() {
                for direction in [Direction::Forward, Direction::Backward] {
                    let (step_from, step_to) = converter.definition().versions(direction);
                    if step_from == version && step_to != from && !previous.contains_key(step_to) {
                        previous.insert(step_to, (version, index, direction));
                        queue.push_back(step_to);
                    }
                }
            }
        }

        let mut steps = Vec::new();
        let mut current = to;
        while current != from {
            let (prior, index, direction) = *previous.get(current).ok_or_else(no_route)?;
            steps.push((&self.converters[index], direction));
            current = prior;
        }
        steps.reverse();
        Ok(steps)
    }

    /// Convert a document to another version, chaining converters as needed
    pub fn convert(&self, document: &Document, to: &str) -> Result<Document> {
        let steps = self.route(document.version(), to)?;
        tracing::debug!(from = %document.version(), to = %to, steps = steps.len(), "converting document");
        let mut current = document.clone();
        for (converter, direction) in steps {
            current = converter.convert(&current, direction)?;
        }
        Ok(current)
    }
}
