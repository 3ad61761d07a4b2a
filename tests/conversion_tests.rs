//! Integration tests for version conversion
//!
//! Converts the fixture values between model versions 1.0 and 2.0, directly
//! and through a catalog.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use xmlstore::error::ConversionErrorKind;
use xmlstore::locations::Location;
use xmlstore::{
    convert_backward, convert_forward, ConverterDefinition, Direction, Document, Error,
    ResolvedSchema, Schema, SchemaCatalog, VersionConverter,
};

const MODEL_V1: &str = "tests/fixtures/model-1.0.xml";
const MODEL_V2: &str = "tests/fixtures/model-2.0.xml";
const CONVERTER: &str = "tests/fixtures/model-1.0-2.0.converter.xml";
const VALUES_V1: &str = "tests/fixtures/values-1.0.xml";

fn resolved(path: &str) -> Arc<ResolvedSchema> {
    let schema = Schema::from_file(path).expect("Failed to load schema");
    Arc::new(schema.resolve().expect("Failed to resolve schema"))
}

fn converter() -> VersionConverter {
    let definition = ConverterDefinition::from_file(CONVERTER).expect("Failed to load converter");
    VersionConverter::new(Arc::new(definition), resolved(MODEL_V1), resolved(MODEL_V2))
        .expect("Failed to create converter")
}

fn values(schema: Arc<ResolvedSchema>) -> Document {
    let xml = std::fs::read_to_string(VALUES_V1).expect("Failed to read values");
    Document::from_xml(schema, &xml).expect("Failed to parse values")
}

#[test]
fn test_name_to_label_and_back() {
    let converter = converter();
    let mut source = Document::new(Arc::clone(converter.schemas(Direction::Forward).0));
    source.set_value("/settings/name", "Run A").unwrap();

    let target = convert_forward(&converter, &source).unwrap();
    assert_eq!(target.version(), "2.0");
    assert_eq!(target.value("/settings/label"), Some("Run A"));
    assert!(target.find("/settings/name").is_none());

    let back = convert_backward(&converter, &target).unwrap();
    assert_eq!(back.value("/settings/name"), Some("Run A"));
}

#[test]
fn test_full_document_forward() {
    let converter = converter();
    let source = values(Arc::clone(converter.schemas(Direction::Forward).0));

    let target = converter.forward(&source).unwrap();
    assert_eq!(target.value("/settings/label"), Some("Run A"));
    assert_eq!(target.value("/settings/method"), Some("1"));
    assert_eq!(target.value("/physics/threshold"), Some("0.25"));
    assert_eq!(target.value("/surface/temperature"), Some("22.5"));
    assert_eq!(target.value("/bottom/thickness"), Some("10"));
    assert!(target.find("/bottom/roughness").is_none());
    assert!(target.validate().is_empty());
}

#[test]
fn test_dropped_paths() {
    let converter = converter();
    assert_eq!(converter.dropped_paths(Direction::Forward), vec!["/bottom/roughness"]);
    assert!(converter.dropped_paths(Direction::Backward).is_empty());
}

#[test]
fn test_invalid_target_is_discarded() {
    let converter = converter();
    let mut source = values(Arc::clone(converter.schemas(Direction::Forward).0));
    // Valid in 1.0, but option 2 no longer exists in 2.0
    source.set_value("/settings/method", "2").unwrap();

    match converter.forward(&source) {
        Err(Error::Conversion(e)) => {
            assert_eq!(e.kind, ConversionErrorKind::TargetValidationFailed);
            assert_eq!(e.source_version.as_deref(), Some("1.0"));
            assert_eq!(e.target_version.as_deref(), Some("2.0"));
            assert_eq!(e.validation_errors.len(), 1);
            assert_eq!(e.validation_errors[0].path, "/settings/method");
        }
        other => panic!("unexpected result: {:?}", other.map(|d| d.to_xml())),
    }
}

#[test]
fn test_parallel_conversions_share_converter() {
    let converter = Arc::new(converter());
    let schema = Arc::clone(converter.schemas(Direction::Forward).0);
    let sources: Vec<Document> = (0..8)
        .map(|i| {
            let mut doc = values(Arc::clone(&schema));
            doc.set_value("/settings/name", format!("Run {}", i)).unwrap();
            doc.set_value("/surface/temperature", format!("{}.5", i)).unwrap();
            doc
        })
        .collect();

    let results: Vec<Document> = std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let converter = Arc::clone(&converter);
                scope.spawn(move || {
                    let target = converter.forward(source).unwrap();
                    converter.backward(&target).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (i, back) in results.iter().enumerate() {
        assert_eq!(back.value("/settings/name"), Some(format!("Run {}", i).as_str()));
        assert_eq!(back.value("/surface/temperature"), Some(format!("{}.5", i).as_str()));
    }
}

#[test]
fn test_catalog_conversion() {
    let catalog = SchemaCatalog::builder()
        .load_schema(&Location::path(MODEL_V1))
        .unwrap()
        .load_schema(&Location::path(MODEL_V2))
        .unwrap()
        .load_converter(&Location::path(CONVERTER))
        .unwrap()
        .build()
        .unwrap();

    let source = values(Arc::clone(catalog.schema("1.0").unwrap()));
    let target = catalog.convert(&source, "2.0").unwrap();
    assert_eq!(target.value("/settings/label"), Some("Run A"));

    let back = catalog.convert(&target, "1.0").unwrap();
    assert_eq!(back.value("/settings/name"), Some("Run A"));
    assert_eq!(back.value("/bottom/roughness"), None);

    assert!(matches!(
        catalog.convert(&source, "3.0"),
        Err(Error::Conversion(ref e)) if e.kind == ConversionErrorKind::NoRoute
    ));
}
