//! Property tests for resolution, validation and conversion

use std::sync::Arc;

use proptest::prelude::*;
use xmlstore::error::{SchemaErrorKind, ValidationErrorKind};
use xmlstore::{ConverterDefinition, Document, Error, Schema, VersionConverter};

fn names(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z]{1,8}", 1..max).prop_map(|set| set.into_iter().collect())
}

/// A schema with a template linked once per name, each link adding one override
fn linked_schema(leaves: &[String], links: &[String]) -> String {
    let mut xml = String::from(r#"<element name="root" version="1.0"><template id="shared">"#);
    for leaf in leaves {
        xml.push_str(&format!(r#"<element name="{}" type="float"/>"#, leaf));
    }
    xml.push_str("</template>");
    for link in links {
        xml.push_str(&format!(r#"<link name="{}" template="shared" label="{}"/>"#, link, link));
    }
    xml.push_str("</element>");
    xml
}

proptest! {
    #[test]
    fn prop_resolution_is_deterministic(leaves in names(6), links in names(4)) {
        let schema = Schema::from_string(&linked_schema(&leaves, &links)).unwrap();
        let first = schema.resolve().unwrap();
        let second = schema.resolve().unwrap();
        prop_assert_eq!(&first, &second);

        // Every link became a concrete element holding the template's children
        prop_assert_eq!(first.root().children.len(), links.len());
        for link in &first.root().children {
            let children: Vec<&str> = link.children.iter().map(|c| c.name.as_str()).collect();
            prop_assert_eq!(children, leaves.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }

    #[test]
    fn prop_duplicate_flattened_siblings_rejected(siblings in names(5), pick in any::<prop::sample::Index>()) {
        let duplicate = pick.get(&siblings);
        let mut xml = String::from(r#"<element name="root" version="1.0">"#);
        for name in &siblings {
            xml.push_str(&format!(r#"<element name="{}" type="int"/>"#, name));
        }
        xml.push_str(&format!(
            r#"<element name="group_only_container" grouponly="True"><element name="{}" type="int"/></element>"#,
            duplicate
        ));
        xml.push_str("</element>");

        let result = Schema::from_string(&xml).unwrap().resolve();
        prop_assert!(matches!(
            result,
            Err(Error::Schema(ref e)) if e.kind == SchemaErrorKind::DuplicateSiblingName
        ));
    }

    #[test]
    fn prop_bounds_are_inclusive(value in -100.0f64..100.0f64) {
        let schema = Schema::from_string(
            r#"<element name="root" version="1.0"><element name="temperature" type="float" minInclusive="-50" maxInclusive="60"/></element>"#,
        )
        .unwrap();
        let mut doc = Document::new(Arc::new(schema.resolve().unwrap()));
        doc.set_value("/temperature", value.to_string()).unwrap();

        let errors = doc.validate();
        if (-50.0..=60.0).contains(&value) {
            prop_assert!(errors.is_empty());
        } else {
            prop_assert_eq!(errors.len(), 1);
            prop_assert_eq!(errors[0].kind, ValidationErrorKind::OutOfRange);
        }
    }

    #[test]
    fn prop_symmetric_links_round_trip(name in "[A-Za-z0-9 ]{0,20}", steps in any::<i32>()) {
        let v1 = Schema::from_string(
            r#"<element name="model" version="1.0"><element name="settings"><element name="name" type="string"/><element name="steps" type="int"/></element></element>"#,
        )
        .unwrap();
        let v2 = Schema::from_string(
            r#"<element name="model" version="2.0"><element name="settings"><element name="label" type="string"/><element name="count" type="int"/></element></element>"#,
        )
        .unwrap();
        let definition = ConverterDefinition::from_string(
            r#"<converter source="1.0" target="2.0"><links>
                <link source="/settings/name" target="/settings/label"/>
                <link source="/settings/steps" target="/settings/count"/>
            </links></converter>"#,
        )
        .unwrap();
        let converter = VersionConverter::new(
            Arc::new(definition),
            Arc::new(v1.resolve().unwrap()),
            Arc::new(v2.resolve().unwrap()),
        )
        .unwrap();

        let source_schema = Arc::clone(converter.schemas(xmlstore::Direction::Forward).0);
        let mut doc = Document::new(source_schema);
        doc.set_value("/settings/name", name.clone()).unwrap();
        doc.set_value("/settings/steps", steps.to_string()).unwrap();

        let back = converter.backward(&converter.forward(&doc).unwrap()).unwrap();
        prop_assert_eq!(back, doc);
    }
}
