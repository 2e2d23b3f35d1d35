//! The schema atom (`TypeDescriptor`) and the document-level schema built
//! from it.

use modb_common::EngineError;
use modb_validation::{ArrayConstraints, NumericConstraints, StringConstraints, StringFormat};
use serde_json::Value as Json;

/// Length/range/format constraints attached to a leaf descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub string: Option<StringConstraints>,
    pub int: Option<NumericConstraints<i64>>,
    pub double: Option<NumericConstraints<f64>>,
    pub array: Option<ArrayConstraints>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.string.is_none() && self.int.is_none() && self.double.is_none() && self.array.is_none()
    }
}

/// The schema atom. Recursive variants own their inner descriptor(s).
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    String,
    Int64,
    Double,
    Bool,
    Bytes,
    DateTime,
    Decimal,
    ObjectId,
    Null,
    Any,
    Optional(Box<Descriptor>),
    Array(Box<Descriptor>),
    Object(DocumentSchema),
}

/// A `TypeDescriptor` together with the constraints that apply to it
/// directly. Every nesting level carries its own: an `Array`'s own
/// `Constraints.array` bounds the array's length, while the boxed item
/// `Descriptor` carries whatever bounds each element.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub kind: TypeDescriptor,
    pub constraints: Constraints,
}

impl TypeDescriptor {
    pub fn type_name(&self) -> &'static str {
        match self {
            TypeDescriptor::String => "string",
            TypeDescriptor::Int64 => "int64",
            TypeDescriptor::Double => "double",
            TypeDescriptor::Bool => "bool",
            TypeDescriptor::Bytes => "binary",
            TypeDescriptor::DateTime => "datetime",
            TypeDescriptor::Decimal => "decimal128",
            TypeDescriptor::ObjectId => "objectid",
            TypeDescriptor::Null => "null",
            TypeDescriptor::Any => "any",
            TypeDescriptor::Optional(_) => "optional",
            TypeDescriptor::Array(_) => "array",
            TypeDescriptor::Object(_) => "object",
        }
    }
}

/// A single field's descriptor plus whether it may be absent or null.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub descriptor: TypeDescriptor,
    pub optional: bool,
    pub constraints: Constraints,
}

impl FieldSchema {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self { descriptor, optional: false, constraints: Constraints::default() }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// Field-name → `FieldSchema` mapping for one document shape. Field
/// insertion order is preserved so validation errors surface in a
/// deterministic, schema-declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSchema {
    fields: Vec<(String, FieldSchema)>,
}

impl DocumentSchema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: FieldSchema) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = schema,
            None => self.fields.push((name, schema)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSchema)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parses a binding-provided serialisable shape (spec §4.2) into a
/// `DocumentSchema`. The shape is a JSON object whose leaves carry a
/// `type` tag; `optional`, `array`, and `object` nest recursively.
///
/// Expected leaf shapes:
/// - `{"type": "string", "constraints": {"min_length": 3, "format": "email"}}`
/// - `{"type": "optional", "inner": {"type": "string"}}`
/// - `{"type": "array", "items": {"type": "int64"}}`
/// - `{"type": "object", "schema": {"field": {...}, ...}}`
pub fn parse_document_schema(shape: &Json) -> Result<DocumentSchema, EngineError> {
    let fields = shape
        .as_object()
        .ok_or_else(|| EngineError::unconvertible_value("$root (expected object schema)"))?;

    let mut schema = DocumentSchema::new();
    for (field_name, field_shape) in fields {
        super::security::validate_field_name(field_name, super::security::FieldContext::Document)?;
        schema.insert(field_name.clone(), parse_field_schema(field_name, field_shape)?);
    }
    Ok(schema)
}

fn parse_field_schema(path: &str, shape: &Json) -> Result<FieldSchema, EngineError> {
    let Descriptor { kind, constraints } = parse_descriptor(path, shape)?;
    let (optional, descriptor, constraints) = match kind {
        TypeDescriptor::Optional(inner) => (true, inner.kind, inner.constraints),
        other => (false, other, constraints),
    };
    Ok(FieldSchema { descriptor, optional, constraints })
}

/// Parses one shape into a `TypeDescriptor` plus the `Constraints` attached
/// to it directly, recursing into `inner`/`items` for `Optional`/`Array` so
/// every nesting level gets its own `Constraints` read from its own
/// `"constraints"` key.
fn parse_descriptor(path: &str, shape: &Json) -> Result<Descriptor, EngineError> {
    let type_tag = shape
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| EngineError::unconvertible_value(format!("{path} (missing 'type')")))?;

    let kind = match type_tag {
        "string" => TypeDescriptor::String,
        "int64" => TypeDescriptor::Int64,
        "double" => TypeDescriptor::Double,
        "bool" => TypeDescriptor::Bool,
        "binary" => TypeDescriptor::Bytes,
        "datetime" => TypeDescriptor::DateTime,
        "decimal" => TypeDescriptor::Decimal,
        "objectid" => TypeDescriptor::ObjectId,
        "null" => TypeDescriptor::Null,
        "any" => TypeDescriptor::Any,
        "optional" => {
            let inner_shape = shape
                .get("inner")
                .ok_or_else(|| EngineError::unconvertible_value(format!("{path}.inner (missing)")))?;
            let inner = parse_descriptor(&format!("{path}.inner"), inner_shape)?;
            TypeDescriptor::Optional(Box::new(inner))
        }
        "array" => {
            let items_shape = shape
                .get("items")
                .ok_or_else(|| EngineError::unconvertible_value(format!("{path}.items (missing)")))?;
            let items = parse_descriptor(&format!("{path}[]"), items_shape)?;
            TypeDescriptor::Array(Box::new(items))
        }
        "object" => {
            let nested_shape = shape
                .get("schema")
                .ok_or_else(|| EngineError::unconvertible_value(format!("{path}.schema (missing)")))?;
            TypeDescriptor::Object(parse_document_schema(nested_shape)?)
        }
        other => return Err(EngineError::unconvertible_value(format!("{path} (unknown type tag '{other}')"))),
    };

    let constraints = match shape.get("constraints") {
        Some(c) => parse_constraints(path, c, type_tag)?,
        None => Constraints::default(),
    };

    Ok(Descriptor { kind, constraints })
}

/// Builds the one `Constraints` sub-struct that matches `type_tag`, so
/// `min_length`/`max_length` route to `StringConstraints` for a `string`
/// descriptor and to `ArrayConstraints` for an `array` one — routing is
/// decided by the descriptor's own declared type, never by which keys
/// happen to be present.
fn parse_constraints(path: &str, shape: &Json, type_tag: &str) -> Result<Constraints, EngineError> {
    let obj = shape
        .as_object()
        .ok_or_else(|| EngineError::unconvertible_value(format!("{path}.constraints (expected object)")))?;

    let min_length = obj.get("min_length").and_then(Json::as_u64).map(|v| v as usize);
    let max_length = obj.get("max_length").and_then(Json::as_u64).map(|v| v as usize);
    let min = obj.get("min");
    let max = obj.get("max");

    let mut constraints = Constraints::default();
    match type_tag {
        "string" => {
            let format = obj.get("format").and_then(Json::as_str).and_then(|f| match f {
                "email" => Some(StringFormat::Email),
                "url" => Some(StringFormat::Url),
                _ => None,
            });
            if min_length.is_some() || max_length.is_some() || format.is_some() {
                constraints.string = Some(StringConstraints { min_length, max_length, format });
            }
        }
        "array" => {
            if min_length.is_some() || max_length.is_some() {
                constraints.array = Some(ArrayConstraints { min_length, max_length });
            }
        }
        "int64" => {
            if min.is_some() || max.is_some() {
                constraints.int = Some(NumericConstraints { min: min.and_then(Json::as_i64), max: max.and_then(Json::as_i64) });
            }
        }
        "double" => {
            if min.is_some() || max.is_some() {
                constraints.double =
                    Some(NumericConstraints { min: min.and_then(Json::as_f64), max: max.and_then(Json::as_f64) });
            }
        }
        // bool/bytes/datetime/decimal/objectid/null/any/optional/object have
        // no constraint vocabulary of their own; an attached "constraints"
        // object is parsed but produces nothing.
        _ => {}
    }

    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_flat_schema() {
        let shape = json!({
            "email": {"type": "string", "constraints": {"format": "email"}},
            "age": {"type": "optional", "inner": {"type": "int64", "constraints": {"min": 0, "max": 150}}},
        });
        let schema = parse_document_schema(&shape).unwrap();
        assert_eq!(schema.len(), 2);

        let email = schema.get("email").unwrap();
        assert_eq!(email.descriptor, TypeDescriptor::String);
        assert!(!email.optional);
        assert_eq!(email.constraints.string.as_ref().unwrap().format, Some(StringFormat::Email));

        let age = schema.get("age").unwrap();
        assert_eq!(age.descriptor, TypeDescriptor::Int64);
        assert!(age.optional);
        assert_eq!(age.constraints.int.as_ref().unwrap().min, Some(0));
    }

    #[test]
    fn parses_nested_object_and_array() {
        let shape = json!({
            "tags": {"type": "array", "items": {"type": "string"}},
            "address": {"type": "object", "schema": {
                "city": {"type": "string"},
            }},
        });
        let schema = parse_document_schema(&shape).unwrap();
        match &schema.get("tags").unwrap().descriptor {
            TypeDescriptor::Array(items) => assert_eq!(items.kind, TypeDescriptor::String),
            other => panic!("expected array, got {other:?}"),
        }
        match &schema.get("address").unwrap().descriptor {
            TypeDescriptor::Object(nested) => assert!(nested.get("city").is_some()),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn array_min_length_and_max_length_attach_to_the_array_not_a_string() {
        let shape = json!({
            "tags": {"type": "array", "items": {"type": "string"}, "constraints": {"min_length": 1, "max_length": 3}},
        });
        let schema = parse_document_schema(&shape).unwrap();
        let tags = schema.get("tags").unwrap();
        let array_constraints = tags.constraints.array.as_ref().expect("array constraints must be populated");
        assert_eq!(array_constraints.min_length, Some(1));
        assert_eq!(array_constraints.max_length, Some(3));
        assert!(tags.constraints.string.is_none());
    }

    #[test]
    fn string_min_length_and_max_length_still_attach_to_string_constraints() {
        let shape = json!({
            "name": {"type": "string", "constraints": {"min_length": 2, "max_length": 50}},
        });
        let schema = parse_document_schema(&shape).unwrap();
        let name = schema.get("name").unwrap();
        let string_constraints = name.constraints.string.as_ref().expect("string constraints must be populated");
        assert_eq!(string_constraints.min_length, Some(2));
        assert_eq!(string_constraints.max_length, Some(50));
        assert!(name.constraints.array.is_none());
    }

    #[test]
    fn array_items_carry_their_own_constraints_independent_of_the_array() {
        let shape = json!({
            "scores": {
                "type": "array",
                "constraints": {"min_length": 1},
                "items": {"type": "int64", "constraints": {"min": 0, "max": 100}},
            },
        });
        let schema = parse_document_schema(&shape).unwrap();
        let scores = schema.get("scores").unwrap();
        assert_eq!(scores.constraints.array.as_ref().unwrap().min_length, Some(1));
        match &scores.descriptor {
            TypeDescriptor::Array(items) => {
                let int_constraints = items.constraints.int.as_ref().expect("item constraints must be populated");
                assert_eq!(int_constraints.min, Some(0));
                assert_eq!(int_constraints.max, Some(100));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn optional_inner_constraints_are_read_from_the_inner_shape() {
        let shape = json!({
            "age": {"type": "optional", "inner": {"type": "int64", "constraints": {"min": 0, "max": 150}}},
        });
        let schema = parse_document_schema(&shape).unwrap();
        let age = schema.get("age").unwrap();
        assert!(age.optional);
        assert_eq!(age.constraints.int.as_ref().unwrap().min, Some(0));
        assert_eq!(age.constraints.int.as_ref().unwrap().max, Some(150));
    }

    #[test]
    fn rejects_missing_type_tag() {
        let shape = json!({ "field": {} });
        assert!(parse_document_schema(&shape).is_err());
    }

    #[test]
    fn rejects_dollar_prefixed_field_name() {
        let shape = json!({ "$bad": {"type": "string"} });
        assert!(parse_document_schema(&shape).is_err());
    }
}
