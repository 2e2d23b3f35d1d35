//! Identifier and query validation, used by every operation that accepts
//! user-controlled strings before they reach the driver.

use modb_common::EngineError;

/// Update/query operators recognised when validating a field name in
/// operator position (e.g. the top level of a `$set` document).
const OPERATOR_ALLOWLIST: &[&str] = &[
    "$set", "$inc", "$push", "$pull", "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin",
    "$exists", "$regex", "$and", "$or", "$not", "$nor", "$all", "$elemMatch", "$size", "$type",
    // geospatial, documented at the boundary
    "$near", "$nearSphere", "$geoWithin", "$geoIntersects", "$geometry", "$maxDistance",
    "$minDistance",
];

/// Operators that execute arbitrary JavaScript server-side; never permitted in a query or update.
const DANGEROUS_OPERATORS: &[&str] = &["$where", "$function", "$accumulator"];

/// Where a field name is being used, which changes which `$`-prefixed names are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContext {
    /// An ordinary document field name.
    Document,
    /// A key appearing in operator position inside a query or update document.
    QueryOperator,
}

/// Rejects collection names that are empty, contain a null byte, start with
/// `system.`, or contain `$`.
pub fn validate_collection_name(name: &str) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::invalid_identifier("collection name cannot be empty"));
    }
    if name.contains('\0') {
        return Err(EngineError::invalid_identifier("collection name contains a null byte"));
    }
    if name.starts_with("system.") {
        return Err(EngineError::invalid_identifier(format!(
            "collection name '{name}' uses the reserved 'system.' prefix"
        )));
    }
    if name.contains('$') {
        return Err(EngineError::invalid_identifier(format!(
            "collection name '{name}' contains '$'"
        )));
    }
    Ok(())
}

/// Rejects field names that are empty, contain a null byte, or start with
/// `$` outside of operator position.
pub fn validate_field_name(name: &str, context: FieldContext) -> Result<(), EngineError> {
    if name.is_empty() {
        return Err(EngineError::invalid_identifier("field name cannot be empty"));
    }
    if name.contains('\0') {
        return Err(EngineError::invalid_identifier("field name contains a null byte"));
    }
    if name.starts_with('$') {
        match context {
            FieldContext::QueryOperator if OPERATOR_ALLOWLIST.contains(&name) => return Ok(()),
            FieldContext::QueryOperator => {
                return Err(EngineError::invalid_identifier(format!(
                    "'{name}' is not a recognised operator"
                )))
            }
            FieldContext::Document => {
                return Err(EngineError::invalid_identifier(format!(
                    "field name '{name}' cannot start with '$'"
                )))
            }
        }
    }
    Ok(())
}

/// Marker for whether a value is expected to be an ObjectId at this position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    ObjectId,
    Other,
}

/// Parses `value` into an `ObjectId` only when the caller explicitly expects
/// one at this position. A bare 24-hex-char string never auto-converts —
/// that would let a filter value control whether it's compared as a string
/// or an id.
pub fn parse_object_id(value: &str, expected: ExpectedType) -> Result<bson::Bson, EngineError> {
    match expected {
        ExpectedType::ObjectId => bson::oid::ObjectId::parse_str(value)
            .map(bson::Bson::ObjectId)
            .map_err(|_| EngineError::invalid_identifier(format!("'{value}' is not a valid ObjectId"))),
        ExpectedType::Other => Ok(bson::Bson::String(value.to_string())),
    }
}

/// Recursively rejects `$where`, `$function`, and `$accumulator` at any
/// depth in a query or aggregation document. Rejection is fatal; there is
/// no partial sanitisation.
pub fn sanitise_query(query: &bson::Bson) -> Result<(), EngineError> {
    match query {
        bson::Bson::Document(doc) => {
            for (key, value) in doc.iter() {
                if DANGEROUS_OPERATORS.contains(&key.as_str()) {
                    tracing::warn!(operator = key.as_str(), "rejected dangerous operator in query");
                    return Err(EngineError::dangerous_operator(key.clone()));
                }
                sanitise_query(value)?;
            }
            Ok(())
        }
        bson::Bson::Array(items) => {
            for item in items {
                sanitise_query(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn accepts_ordinary_collection_names() {
        for name in ["users", "my_collection", "posts2"] {
            assert!(validate_collection_name(name).is_ok());
        }
    }

    #[test]
    fn rejects_system_prefix() {
        assert!(validate_collection_name("system.indexes").is_err());
    }

    #[test]
    fn rejects_dollar_in_collection_name() {
        assert!(validate_collection_name("a$b").is_err());
    }

    #[test]
    fn rejects_empty_collection_name() {
        assert!(validate_collection_name("").is_err());
    }

    #[test]
    fn rejects_dollar_field_outside_operator_context() {
        assert!(validate_field_name("$set", FieldContext::Document).is_err());
    }

    #[test]
    fn accepts_known_operator_in_operator_context() {
        assert!(validate_field_name("$set", FieldContext::QueryOperator).is_ok());
        assert!(validate_field_name("$near", FieldContext::QueryOperator).is_ok());
    }

    #[test]
    fn rejects_unknown_operator_in_operator_context() {
        assert!(validate_field_name("$bogus", FieldContext::QueryOperator).is_err());
    }

    #[test]
    fn accepts_ordinary_field_names() {
        assert!(validate_field_name("email", FieldContext::Document).is_ok());
        assert!(validate_field_name("address.city", FieldContext::Document).is_ok());
    }

    #[test]
    fn parse_object_id_only_when_expected() {
        let hex = "507f1f77bcf86cd799439011";
        match parse_object_id(hex, ExpectedType::ObjectId).unwrap() {
            bson::Bson::ObjectId(_) => {}
            other => panic!("expected ObjectId, got {other:?}"),
        }
        match parse_object_id(hex, ExpectedType::Other).unwrap() {
            bson::Bson::String(s) => assert_eq!(s, hex),
            other => panic!("expected String, got {other:?}"),
        }
    }

    #[test]
    fn parse_object_id_rejects_malformed_hex_when_expected() {
        assert!(parse_object_id("not-an-oid", ExpectedType::ObjectId).is_err());
    }

    #[test]
    fn sanitise_rejects_where_at_top_level() {
        let q = bson::Bson::Document(doc! { "$where": "this.a == 1" });
        assert!(sanitise_query(&q).is_err());
    }

    #[test]
    fn sanitise_rejects_function_nested_in_and() {
        let q = bson::Bson::Document(doc! {
            "$and": [
                { "email": "a@b.co" },
                { "$function": { "body": "", "args": [], "lang": "js" } },
            ]
        });
        assert!(sanitise_query(&q).is_err());
    }

    #[test]
    fn sanitise_accepts_safe_nested_query() {
        let q = bson::Bson::Document(doc! {
            "$and": [
                { "email": "a@b.co" },
                { "age": { "$gt": 18 } },
            ]
        });
        assert!(sanitise_query(&q).is_ok());
    }
}
