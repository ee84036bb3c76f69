//! Resource validation passes.
//!
//! Each pass is a visitor over [`traverse`] or [`traverse_dual`]:
//!
//! - [`TypeValidator`]: values match their attribute's declared type
//! - [`RequiredValidator`]: required, client-settable attributes are present
//! - [`MutabilityValidator`]: read-only attributes are reset to the
//!   reference value and immutable attributes are not changed once set

use chrono::DateTime;
use serde_json::Value;

use super::{
    error::ValidationError,
    evaluator::is_assigned,
    resource::Resource,
    schema::{AttributeType, Mutability, Schema},
    traverse::{DualVisit, DualVisitor, Flow, Visit, Visitor, traverse, traverse_dual},
};

/// Check every value against its attribute type.
pub fn validate_types(schema: &Schema, resource: &Resource) -> Result<(), ValidationError> {
    traverse(schema, resource.attributes(), &mut TypeValidator)
}

/// Check that required attributes are assigned.
pub fn validate_required(schema: &Schema, resource: &Resource) -> Result<(), ValidationError> {
    traverse(schema, resource.attributes(), &mut RequiredValidator)
}

/// Enforce mutability against the stored version of a resource. With no
/// reference, read-only attributes are dropped.
pub fn validate_mutability(
    schema: &Schema,
    resource: &mut Resource,
    reference: Option<&Resource>,
) -> Result<(), ValidationError> {
    traverse_dual(
        schema,
        resource.attributes_mut(),
        reference.map(Resource::attributes),
        &mut MutabilityValidator,
    )
}

pub struct TypeValidator;

impl Visitor for TypeValidator {
    type Error = ValidationError;

    fn visit(&mut self, visit: &Visit<'_, '_>) -> Result<Flow, ValidationError> {
        let attribute = visit.attribute;
        let value = visit.value;
        if value.is_null() {
            return Ok(Flow::Continue);
        }

        let expected = if attribute.multi_valued {
            (!value.is_array()).then_some("an array")
        } else {
            let ok = match attribute.kind {
                AttributeType::String | AttributeType::Reference => value.is_string(),
                AttributeType::DateTime => value
                    .as_str()
                    .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
                AttributeType::Boolean => value.is_boolean(),
                AttributeType::Integer => value.is_i64() || value.is_u64(),
                AttributeType::Decimal => value.is_number(),
                AttributeType::Complex => value.is_object(),
            };
            (!ok).then(|| type_label(attribute.kind))
        };

        match expected {
            Some(expected) => Err(ValidationError::InvalidType {
                path: visit.path(),
                expected: expected.to_string(),
            }),
            None => Ok(Flow::Continue),
        }
    }
}

fn type_label(kind: AttributeType) -> &'static str {
    match kind {
        AttributeType::String => "a string",
        AttributeType::Reference => "a reference string",
        AttributeType::DateTime => "an RFC 3339 dateTime string",
        AttributeType::Boolean => "a boolean",
        AttributeType::Integer => "an integer",
        AttributeType::Decimal => "a number",
        AttributeType::Complex => "an object",
    }
}

pub struct RequiredValidator;

impl Visitor for RequiredValidator {
    type Error = ValidationError;

    fn visit(&mut self, visit: &Visit<'_, '_>) -> Result<Flow, ValidationError> {
        let attribute = visit.attribute;
        // Server-assigned values cannot be demanded from clients.
        if attribute.mutability == Mutability::ReadOnly {
            return Ok(Flow::Skip);
        }
        if attribute.required && !is_assigned(visit.value, attribute) {
            return Err(ValidationError::Required { path: visit.path() });
        }
        Ok(Flow::Continue)
    }
}

pub struct MutabilityValidator;

impl DualVisitor for MutabilityValidator {
    type Error = ValidationError;

    fn visit(&mut self, visit: &DualVisit<'_, '_>, value: &mut Value) -> Result<Flow, ValidationError> {
        let attribute = visit.attribute;
        match attribute.mutability {
            Mutability::ReadOnly => {
                let restored = visit.reference.cloned().unwrap_or(Value::Null);
                if *value != restored {
                    tracing::debug!(path = %visit.path(), "Reset read-only attribute");
                    *value = restored;
                }
                Ok(Flow::Skip)
            }
            Mutability::Immutable => {
                // Once assigned, the input must carry the same value; omitting it
                // would clear it.
                let previous = visit.reference.filter(|r| is_assigned(r, attribute));
                if let Some(previous) = previous
                    && (!is_assigned(value, attribute) || value != previous)
                {
                    return Err(ValidationError::Immutable { path: visit.path() });
                }
                Ok(Flow::Continue)
            }
            Mutability::ReadWrite | Mutability::WriteOnly => Ok(Flow::Continue),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::scim::schema::Attribute;

    fn resource(value: Value) -> Resource {
        Resource::from_value(value).unwrap()
    }

    #[rstest]
    #[case::ok(json!({ "userName": "b", "active": true, "emails": [{ "value": "a@b.c" }] }), None)]
    #[case::bad_bool(json!({ "active": "yes" }), Some("active"))]
    #[case::bad_string(json!({ "userName": 7 }), Some("userName"))]
    #[case::not_array(json!({ "emails": { "value": "a@b.c" } }), Some("emails"))]
    #[case::bad_element(json!({ "emails": ["a@b.c"] }), Some("emails"))]
    #[case::bad_sub_attribute(json!({ "emails": [{ "primary": "true" }] }), Some("emails.primary"))]
    #[case::bad_date(json!({ "meta": { "created": "yesterday" } }), Some("meta.created"))]
    #[case::good_date(json!({ "meta": { "created": "2011-08-01T18:29:49.793Z" } }), None)]
    #[case::complex(json!({ "name": "Barbara" }), Some("name"))]
    fn test_types(#[case] value: Value, #[case] failing_path: Option<&str>) {
        let schema = Schema::core_user();
        let result = validate_types(&schema, &resource(value));
        match failing_path {
            None => assert!(result.is_ok(), "{result:?}"),
            Some(expected) => match result {
                Err(ValidationError::InvalidType { path, .. }) => assert_eq!(path, expected),
                other => panic!("expected type error, got {other:?}"),
            },
        }
    }

    #[test]
    fn test_numeric_types() {
        let schema = Schema::new(
            "urn:test:Numbers",
            "Numbers",
            vec![
                Attribute::new("count", AttributeType::Integer),
                Attribute::new("price", AttributeType::Decimal),
            ],
        )
        .unwrap();
        assert!(validate_types(&schema, &resource(json!({ "count": 3, "price": 2 }))).is_ok());
        assert!(validate_types(&schema, &resource(json!({ "count": 3.5 }))).is_err());
    }

    #[test]
    fn test_required() {
        let schema = Schema::core_user();
        let ok = resource(json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "userName": "bjensen"
        }));
        assert!(validate_required(&schema, &ok).is_ok());

        let missing = resource(json!({
            "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
            "userName": ""
        }));
        assert!(matches!(
            validate_required(&schema, &missing),
            Err(ValidationError::Required { path }) if path == "userName"
        ));

        let no_schemas = resource(json!({ "userName": "bjensen", "schemas": [] }));
        assert!(matches!(
            validate_required(&schema, &no_schemas),
            Err(ValidationError::Required { path }) if path == "schemas"
        ));
    }

    #[test]
    fn test_required_skips_read_only() {
        let schema = Schema::new(
            "urn:test:Thing",
            "Thing",
            vec![
                Attribute::new("serial", AttributeType::String)
                    .with_required()
                    .with_mutability(Mutability::ReadOnly),
            ],
        )
        .unwrap();
        let thing = resource(json!({ "schemas": ["urn:test:Thing"] }));
        assert!(validate_required(&schema, &thing).is_ok());
    }

    #[test]
    fn test_read_only_is_reset_to_reference() {
        let schema = Schema::core_user();
        let stored = resource(json!({
            "id": "abc",
            "userName": "bjensen",
            "meta": { "resourceType": "User", "created": "2011-08-01T18:29:49Z" },
            "groups": [{ "value": "g1", "display": "Admins" }]
        }));
        let mut incoming = resource(json!({
            "id": "hijacked",
            "userName": "babs",
            "meta": { "resourceType": "Group" },
            "groups": []
        }));
        validate_mutability(&schema, &mut incoming, Some(&stored)).unwrap();

        assert_eq!(incoming.id(), Some("abc"));
        assert_eq!(incoming.get("userName"), Some(&json!("babs")));
        assert_eq!(incoming.get("meta"), stored.get("meta"));
        assert_eq!(incoming.get("groups"), stored.get("groups"));
    }

    #[test]
    fn test_read_only_without_reference_is_dropped() {
        let schema = Schema::core_user();
        let mut incoming = resource(json!({ "id": "client-chosen", "userName": "b" }));
        validate_mutability(&schema, &mut incoming, None).unwrap();
        assert!(incoming.id().is_none());
        assert!(incoming.get("userName").is_some());
    }

    fn badge_schema() -> Schema {
        Schema::new(
            "urn:test:Badge",
            "Badge",
            vec![
                Attribute::new("serial", AttributeType::String)
                    .with_mutability(Mutability::Immutable),
                Attribute::new("holder", AttributeType::String),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_immutable_absent_in_reference_may_be_set() {
        let schema = badge_schema();
        let stored = resource(json!({ "holder": "a" }));
        let mut incoming = resource(json!({ "serial": "S-1", "holder": "b" }));
        validate_mutability(&schema, &mut incoming, Some(&stored)).unwrap();
        assert_eq!(incoming.get("serial"), Some(&json!("S-1")));
    }

    #[test]
    fn test_immutable_change_is_rejected() {
        let schema = badge_schema();
        let stored = resource(json!({ "serial": "S-1" }));

        let mut same = resource(json!({ "serial": "S-1", "holder": "b" }));
        assert!(validate_mutability(&schema, &mut same, Some(&stored)).is_ok());

        let mut changed = resource(json!({ "serial": "S-2" }));
        assert!(matches!(
            validate_mutability(&schema, &mut changed, Some(&stored)),
            Err(ValidationError::Immutable { path }) if path == "serial"
        ));
    }

    #[rstest]
    #[case::omitted(json!({ "holder": "b" }))]
    #[case::null(json!({ "serial": null, "holder": "b" }))]
    #[case::empty(json!({ "serial": "", "holder": "b" }))]
    fn test_immutable_cleared_is_rejected(#[case] value: Value) {
        let schema = badge_schema();
        let stored = resource(json!({ "serial": "S-1", "holder": "a" }));
        let mut incoming = resource(value);
        assert!(matches!(
            validate_mutability(&schema, &mut incoming, Some(&stored)),
            Err(ValidationError::Immutable { path }) if path == "serial"
        ));
    }

    #[test]
    fn test_immutable_sub_attribute_in_paired_elements() {
        let schema = Schema::core_group();
        let stored = resource(json!({
            "displayName": "Admins",
            "members": [{ "value": "u1", "type": "User", "display": "Alice" }]
        }));

        // Same member, display is read-only and comes back from storage.
        let mut incoming = resource(json!({
            "displayName": "Admins",
            "members": [
                { "value": "u1", "type": "User", "display": "Mallory" },
                { "value": "u2", "type": "User", "display": "Bob" }
            ]
        }));
        validate_mutability(&schema, &mut incoming, Some(&stored)).unwrap();
        let members = incoming.get("members").unwrap();
        assert_eq!(members[0]["display"], "Alice");
        assert!(members[1].get("display").is_none());

        // Paired by value; changing the immutable type is rejected.
        let mut retyped = resource(json!({
            "displayName": "Admins",
            "members": [{ "value": "u1", "type": "Group" }]
        }));
        assert!(matches!(
            validate_mutability(&schema, &mut retyped, Some(&stored)),
            Err(ValidationError::Immutable { path }) if path == "members.type"
        ));
    }

    #[test]
    fn test_immutable_sub_attribute_omitted_in_paired_element() {
        let schema = Schema::core_group();
        let stored = resource(json!({
            "displayName": "Admins",
            "members": [{ "value": "u1", "type": "User" }]
        }));
        let mut incoming = resource(json!({
            "displayName": "Admins",
            "members": [{ "value": "u1" }]
        }));
        assert!(matches!(
            validate_mutability(&schema, &mut incoming, Some(&stored)),
            Err(ValidationError::Immutable { path }) if path == "members.type"
        ));
    }
}
