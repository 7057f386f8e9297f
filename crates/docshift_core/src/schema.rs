//! Validator derivation.
//!
//! Turns a [`FieldSet`] into the `$jsonSchema` document a collection
//! enforces. The output is deterministic: properties appear in
//! declaration order and type arrays always list the structural type
//! before `"null"`, so schema comparison can be exact.

use docshift_bson::{Bson, Document};

use crate::field::{FieldDescriptor, FieldKind, FieldSet};

/// Derives the collection validator for a field set.
///
/// Reference fields are skipped; their shadow id fields carry the
/// persisted shape. Returns `None` when no field contributes a
/// property, which marks the entity schema-flexible.
#[must_use]
pub fn build_validator(fields: &FieldSet) -> Option<Document> {
    let schema = object_schema(fields)?;
    Some(Document::from([("$jsonSchema", Bson::Document(schema))]))
}

fn object_schema(fields: &FieldSet) -> Option<Document> {
    let mut required = Vec::new();
    let mut properties = Document::new();

    for (name, field) in fields.iter() {
        if field.is_reference() {
            continue;
        }
        if field.is_required() {
            required.push(Bson::from(name));
        }
        properties.set(name, Bson::Document(field_schema(field)));
    }

    if properties.is_empty() {
        return None;
    }

    let mut schema = Document::from([("bsonType", "object")]);
    if !required.is_empty() {
        schema.set("required", Bson::Array(required));
    }
    schema.set("properties", Bson::Document(properties));
    Some(schema)
}

fn field_schema(field: &FieldDescriptor) -> Document {
    let mut spec = Document::new();

    match field.kind() {
        FieldKind::Enum { choices } => {
            let mut values: Vec<Bson> =
                choices.iter().map(|(value, _)| value.clone()).collect();
            if field.allows_null() {
                values.push(Bson::Null);
            }
            spec.set("enum", Bson::Array(values));
        }
        kind => {
            let mut types = Vec::new();
            if let Some(name) = kind.bson_type() {
                types.push(Bson::from(name));
            }
            if field.allows_null() {
                types.push(Bson::from("null"));
            }
            spec.set("bsonType", Bson::Array(types));
        }
    }

    match field.kind() {
        FieldKind::String {
            min_length,
            max_length,
        } => {
            if let Some(min) = min_length {
                spec.set("minLength", Bson::Int(i64::from(*min)));
            }
            if let Some(max) = max_length {
                spec.set("maxLength", Bson::Int(i64::from(*max)));
            }
        }
        FieldKind::Object { properties } => {
            if let Some(nested) = object_schema(properties) {
                for (key, value) in nested {
                    if key != "bsonType" {
                        spec.set(key, value);
                    }
                }
            }
        }
        FieldKind::Array {
            items,
            min_items,
            max_items,
        } => {
            if let Some(min) = min_items {
                spec.set("minItems", Bson::Int(i64::from(*min)));
            }
            if let Some(max) = max_items {
                spec.set("maxItems", Bson::Int(i64::from(*max)));
            }
            if let Some(items) = items {
                if let Some(item_schema) = object_schema(items) {
                    spec.set("items", Bson::Document(item_schema));
                }
            }
        }
        _ => {}
    }

    if let Some(description) = field.description() {
        spec.set("description", Bson::from(description));
    }

    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unwrap_schema(validator: &Document) -> &Document {
        validator
            .get("$jsonSchema")
            .and_then(Bson::as_document)
            .expect("$jsonSchema wrapper")
    }

    #[test]
    fn derives_required_and_properties() {
        let fields: FieldSet = [
            ("make", FieldDescriptor::string()),
            ("year", FieldDescriptor::int().required(false)),
        ]
        .into_iter()
        .collect();

        let validator = build_validator(&fields).unwrap();
        let schema = unwrap_schema(&validator);

        assert_eq!(schema.get("bsonType"), Some(&Bson::from("object")));
        assert_eq!(
            schema.get("required"),
            Some(&Bson::Array(vec![Bson::from("make")]))
        );

        let props = schema.get("properties").and_then(Bson::as_document).unwrap();
        let make = props.get("make").and_then(Bson::as_document).unwrap();
        assert_eq!(
            make.get("bsonType"),
            Some(&Bson::Array(vec![Bson::from("string")]))
        );
        let year = props.get("year").and_then(Bson::as_document).unwrap();
        assert_eq!(
            year.get("bsonType"),
            Some(&Bson::Array(vec![Bson::from("int")]))
        );
    }

    #[test]
    fn nullable_fields_list_null_second() {
        let fields: FieldSet = [("nickname", FieldDescriptor::string().allow_null(true))]
            .into_iter()
            .collect();

        let validator = build_validator(&fields).unwrap();
        let props = unwrap_schema(&validator)
            .get("properties")
            .and_then(Bson::as_document)
            .unwrap();
        let nickname = props.get("nickname").and_then(Bson::as_document).unwrap();
        assert_eq!(
            nickname.get("bsonType"),
            Some(&Bson::Array(vec![Bson::from("string"), Bson::from("null")]))
        );
    }

    #[test]
    fn enums_emit_value_lists_not_types() {
        let field = FieldDescriptor::enumeration(vec![
            (Bson::from("gas"), "Gasoline"),
            (Bson::from("ev"), "Electric"),
        ])
        .unwrap()
        .allow_null(true);
        let fields: FieldSet = [("fuel", field)].into_iter().collect();

        let validator = build_validator(&fields).unwrap();
        let props = unwrap_schema(&validator)
            .get("properties")
            .and_then(Bson::as_document)
            .unwrap();
        let fuel = props.get("fuel").and_then(Bson::as_document).unwrap();
        assert!(fuel.get("bsonType").is_none());
        assert_eq!(
            fuel.get("enum"),
            Some(&Bson::Array(vec![
                Bson::from("gas"),
                Bson::from("ev"),
                Bson::Null
            ]))
        );
    }

    #[test]
    fn embedded_objects_nest_required_and_properties() {
        let address: FieldSet = [
            ("city", FieldDescriptor::string()),
            ("zip", FieldDescriptor::string().required(false)),
        ]
        .into_iter()
        .collect();
        let fields: FieldSet = [("address", FieldDescriptor::object(address).unwrap())]
            .into_iter()
            .collect();

        let validator = build_validator(&fields).unwrap();
        let props = unwrap_schema(&validator)
            .get("properties")
            .and_then(Bson::as_document)
            .unwrap();
        let address = props.get("address").and_then(Bson::as_document).unwrap();
        assert_eq!(
            address.get("bsonType"),
            Some(&Bson::Array(vec![Bson::from("object")]))
        );
        assert_eq!(
            address.get("required"),
            Some(&Bson::Array(vec![Bson::from("city")]))
        );
        let nested = address
            .get("properties")
            .and_then(Bson::as_document)
            .unwrap();
        assert!(nested.contains_key("city"));
        assert!(nested.contains_key("zip"));
    }

    #[test]
    fn structured_arrays_emit_item_schemas() {
        let items: FieldSet = [("name", FieldDescriptor::string())].into_iter().collect();
        let field = FieldDescriptor::structured_array(items)
            .unwrap()
            .min_items(1);
        let fields: FieldSet = [("tires", field)].into_iter().collect();

        let validator = build_validator(&fields).unwrap();
        let props = unwrap_schema(&validator)
            .get("properties")
            .and_then(Bson::as_document)
            .unwrap();
        let tires = props.get("tires").and_then(Bson::as_document).unwrap();
        assert_eq!(tires.get("minItems"), Some(&Bson::Int(1)));
        let items = tires.get("items").and_then(Bson::as_document).unwrap();
        assert_eq!(items.get("bsonType"), Some(&Bson::from("object")));
    }

    #[test]
    fn string_bounds_and_descriptions_are_emitted() {
        let field = FieldDescriptor::string()
            .min_length(1)
            .max_length(64)
            .describe("display name");
        let fields: FieldSet = [("name", field)].into_iter().collect();

        let validator = build_validator(&fields).unwrap();
        let props = unwrap_schema(&validator)
            .get("properties")
            .and_then(Bson::as_document)
            .unwrap();
        let name = props.get("name").and_then(Bson::as_document).unwrap();
        assert_eq!(name.get("minLength"), Some(&Bson::Int(1)));
        assert_eq!(name.get("maxLength"), Some(&Bson::Int(64)));
        assert_eq!(name.get("description"), Some(&Bson::from("display name")));
    }

    #[test]
    fn empty_field_set_has_no_validator() {
        assert!(build_validator(&FieldSet::new()).is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn field_for(kind: u8, required: bool, allow_null: bool) -> FieldDescriptor {
            let field = match kind % 5 {
                0 => FieldDescriptor::string(),
                1 => FieldDescriptor::int(),
                2 => FieldDescriptor::double(),
                3 => FieldDescriptor::boolean(),
                _ => FieldDescriptor::date(),
            };
            field.required(required).allow_null(allow_null)
        }

        proptest! {
            #[test]
            fn building_is_deterministic(
                specs in prop::collection::vec(
                    ("[a-z]{1,8}", any::<u8>(), any::<bool>(), any::<bool>()),
                    1..8,
                )
            ) {
                let fields: FieldSet = specs
                    .iter()
                    .map(|(name, kind, required, allow_null)| {
                        (name.clone(), field_for(*kind, *required, *allow_null))
                    })
                    .collect();

                prop_assert_eq!(build_validator(&fields), build_validator(&fields));
            }

            #[test]
            fn required_list_matches_required_flags(
                specs in prop::collection::vec(
                    ("[a-z]{1,8}", any::<u8>(), any::<bool>()),
                    1..8,
                )
            ) {
                let fields: FieldSet = specs
                    .iter()
                    .map(|(name, kind, required)| {
                        (name.clone(), field_for(*kind, *required, false))
                    })
                    .collect();

                let validator = build_validator(&fields).unwrap();
                let schema = validator
                    .get("$jsonSchema")
                    .and_then(Bson::as_document)
                    .unwrap();
                let listed: Vec<&str> = schema
                    .get("required")
                    .and_then(Bson::as_array)
                    .map(|names| names.iter().filter_map(Bson::as_str).collect())
                    .unwrap_or_default();

                for (name, field) in fields.iter() {
                    prop_assert_eq!(field.is_required(), listed.contains(&name));
                }
            }
        }
    }
}
