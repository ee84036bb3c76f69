use serde_json::{Value, json};

use crate::{
    ScimEngine,
    config::EngineConfig,
    scim::{
        FilterError, Operator, PatchError, PatchRequest, Resource, SCHEMA_GROUP, SCHEMA_USER,
        ScimErrorResponse, ScimErrorType, ValidationError, parse, tokenize,
    },
};

fn engine() -> ScimEngine {
    ScimEngine::from_config(&EngineConfig::from_str("").unwrap()).unwrap()
}

fn resource(value: Value) -> Resource {
    Resource::from_value(value).unwrap()
}

fn request(operations: Value) -> PatchRequest {
    serde_json::from_value(json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
        "Operations": operations
    }))
    .unwrap()
}

fn barbara() -> Resource {
    resource(json!({
        "schemas": [SCHEMA_USER],
        "id": "2819c223-7f76-453a-919d-413861904646",
        "userName": "bjensen",
        "name": { "givenName": "Barbara", "familyName": "Jensen" },
        "active": true,
        "emails": [
            { "value": "bjensen@example.com", "type": "work", "primary": true },
            { "value": "babs@jensen.org", "type": "home" }
        ],
        "meta": {
            "resourceType": "User",
            "created": "2010-01-23T04:56:22Z",
            "lastModified": "2011-05-13T04:42:34Z"
        }
    }))
}

// =============================================================================
// Filter
// =============================================================================

#[test]
fn test_nested_filter_shape_after_splicing() {
    let tokens = tokenize(r#"emails[type eq "work" and value co "@"] or userName pr"#).unwrap();
    let node = parse(tokens).unwrap();

    assert_eq!(node.operator(), Some(Operator::Or));
    // and, eq, co, or, pr
    assert_eq!(node.counts(), (5, 5));

    let mut paths = Vec::new();
    node.walk(&mut |n| {
        if n.is_leaf() && n.data.constant().is_none() {
            paths.push(n.data.value.clone());
        }
    });
    assert_eq!(paths, vec!["emails.type", "emails.value", "userName"]);
}

#[test]
fn test_parse_is_deterministic() {
    let input = r#"not (title pr) and (userType eq "Employee" or meta.created gt "2011-01-01T00:00:00Z")"#;
    let first = parse(tokenize(input).unwrap()).unwrap();
    let second = parse(tokenize(input).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.operator(), Some(Operator::And));
}

#[test]
fn test_filter_over_a_collection() {
    let engine = engine();
    let schema = engine.schema("User").unwrap();
    let users = vec![
        barbara(),
        resource(json!({
            "id": "u2",
            "userName": "jsmith",
            "active": false,
            "emails": [{ "value": "js@example.org", "type": "home" }],
            "meta": { "created": "2012-06-01T00:00:00Z" }
        })),
    ];

    let cases = [
        (r#"userName eq "BJENSEN""#, vec!["2819c223-7f76-453a-919d-413861904646"]),
        (r#"emails[type eq "work"]"#, vec!["2819c223-7f76-453a-919d-413861904646"]),
        (r#"emails.value ew "example.org""#, vec!["u2"]),
        ("active eq false or name.givenName pr", vec!["2819c223-7f76-453a-919d-413861904646", "u2"]),
        (r#"meta.created gt "2011-01-01T00:00:00Z""#, vec!["u2"]),
        (r#"not (userName sw "b")"#, vec!["u2"]),
    ];

    for (filter, expected) in cases {
        let node = engine.parse_filter(filter).unwrap();
        let ids: Vec<_> = engine
            .filter(schema, &node, &users)
            .into_iter()
            .filter_map(Resource::id)
            .collect();
        assert_eq!(ids, expected, "filter: {filter}");
    }
}

#[test]
fn test_filter_errors_map_to_invalid_filter() {
    let engine = engine();
    for filter in [r#"( foo eq "bar""#, r#"foo[bar[type eq "work"]]"#, ""] {
        let err = engine.parse_filter(filter).unwrap_err();
        let response = ScimErrorResponse::from(err);
        assert_eq!(response.scim_type, Some(ScimErrorType::InvalidFilter), "{filter}");
        assert_eq!(response.status, "400");
    }
    assert!(matches!(
        engine.parse_filter(r#"( foo eq "bar""#),
        Err(FilterError::MismatchedParenthesis)
    ));
}

// =============================================================================
// PATCH
// =============================================================================

#[test]
fn test_patch_user_profile() {
    let engine = engine();
    let schema = engine.schema(SCHEMA_USER).unwrap();
    let mut user = barbara();

    let patch = request(json!([
        { "op": "Add", "value": { "nickName": "Babs", "title": "Tour Guide" } },
        { "op": "replace", "path": "emails[type eq \"work\"].value", "value": "barbara@example.com" },
        { "op": "add", "path": "phoneNumbers", "value": [{ "value": "555-555-8377", "type": "work" }] },
        { "op": "remove", "path": "emails[type eq \"home\"]" }
    ]));
    engine.patch(schema, &mut user, &patch).unwrap();

    assert_eq!(user.get("nickName"), Some(&json!("Babs")));
    assert_eq!(user.get("title"), Some(&json!("Tour Guide")));
    assert_eq!(
        user.get("emails"),
        Some(&json!([{ "value": "barbara@example.com", "type": "work", "primary": true }]))
    );
    assert_eq!(user.get("phoneNumbers").unwrap().as_array().unwrap().len(), 1);

    // The patched resource still passes validation for a replace.
    let stored = barbara();
    engine.validate_replace(schema, &mut user, &stored).unwrap();

    let node = engine.parse_filter(r#"emails.value eq "barbara@example.com""#).unwrap();
    assert_eq!(engine.filter(schema, &node, std::slice::from_ref(&user)).len(), 1);
}

#[test]
fn test_failed_patch_leaves_resource_untouched() {
    let engine = engine();
    let schema = engine.schema("User").unwrap();
    let mut user = barbara();
    let before = user.clone();

    let patch = request(json!([
        { "op": "replace", "path": "displayName", "value": "Babs Jensen" },
        { "op": "replace", "path": "emails[type eq \"other\"].value", "value": "x@example.com" }
    ]));
    let err = engine.patch(schema, &mut user, &patch).unwrap_err();

    assert!(matches!(&err, PatchError::Operation { index: 1, .. }));
    assert!(matches!(err.root_cause(), PatchError::NoTarget(_)));
    assert_eq!(user, before);

    let response = ScimErrorResponse::from(err);
    assert_eq!(response.scim_type, Some(ScimErrorType::NoTarget));
}

#[test]
fn test_patch_unknown_attribute_is_invalid_path() {
    let engine = engine();
    let schema = engine.schema("User").unwrap();
    let mut user = barbara();

    let patch = request(json!([{ "op": "add", "path": "favoriteColor", "value": "green" }]));
    let err = engine.patch(schema, &mut user, &patch).unwrap_err();
    assert!(matches!(err.root_cause(), PatchError::Path(_)));
    assert_eq!(
        ScimErrorResponse::from(err).scim_type,
        Some(ScimErrorType::InvalidPath)
    );
}

#[test]
fn test_group_membership_lifecycle() {
    let engine = engine();
    let schema = engine.schema("Group").unwrap();
    let stored = resource(json!({
        "schemas": [SCHEMA_GROUP],
        "id": "e9e30dba-f08f-4109-8486-d5c6a331660a",
        "displayName": "Tour Guides",
        "members": [
            { "value": "2819c223-7f76-453a-919d-413861904646", "type": "User" }
        ]
    }));
    let mut group = stored.clone();

    let patch = request(json!([
        {
            "op": "add",
            "path": "members",
            "value": [
                { "value": "902c246b-6245-4190-8e05-00816be7344a", "type": "User" },
                { "value": "2819c223-7f76-453a-919d-413861904646", "type": "User" }
            ]
        },
        {
            "op": "remove",
            "path": "members[value eq \"2819c223-7f76-453a-919d-413861904646\"]"
        }
    ]));
    engine.patch(schema, &mut group, &patch).unwrap();

    assert_eq!(
        group.get("members"),
        Some(&json!([{ "value": "902c246b-6245-4190-8e05-00816be7344a", "type": "User" }]))
    );
    engine.validate_replace(schema, &mut group, &stored).unwrap();
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_create_then_replace() {
    let engine = engine();
    let schema = engine.schema("User").unwrap();

    let mut created = resource(json!({
        "schemas": [SCHEMA_USER],
        "id": "chosen-by-client",
        "userName": "bjensen",
        "groups": [{ "value": "e9e30dba-f08f-4109-8486-d5c6a331660a" }],
        "emails": [{ "value": "bjensen@example.com", "type": "work" }]
    }));
    engine.validate_create(schema, &mut created).unwrap();
    assert!(created.id().is_none());
    assert!(created.get("groups").is_none());

    // The store assigns identity and metadata.
    created.set_id("2819c223-7f76-453a-919d-413861904646");
    created.set("meta", json!({ "resourceType": "User", "created": "2024-03-01T12:00:00Z" }));

    let mut replacement = resource(json!({
        "schemas": [SCHEMA_USER],
        "id": "something-else",
        "userName": "babs",
        "meta": { "resourceType": "Group" }
    }));
    engine.validate_replace(schema, &mut replacement, &created).unwrap();
    assert_eq!(replacement.id(), created.id());
    assert_eq!(replacement.get("meta"), created.get("meta"));
    assert_eq!(replacement.get("userName"), Some(&json!("babs")));
}

#[test]
fn test_validation_errors_map_to_protocol_types() {
    let engine = engine();
    let schema = engine.schema("Group").unwrap();
    let stored = resource(json!({
        "schemas": [SCHEMA_GROUP],
        "displayName": "Admins",
        "members": [{ "value": "u1", "type": "User" }]
    }));

    let mut retyped = resource(json!({
        "schemas": [SCHEMA_GROUP],
        "displayName": "Admins",
        "members": [{ "value": "u1", "type": "Group" }]
    }));
    let err = engine
        .validate_replace(schema, &mut retyped, &stored)
        .unwrap_err();
    assert!(matches!(&err, ValidationError::Immutable { path } if path == "members.type"));
    assert_eq!(
        ScimErrorResponse::from(err).scim_type,
        Some(ScimErrorType::Mutability)
    );

    let mut untyped = resource(json!({ "schemas": [SCHEMA_GROUP], "displayName": 42 }));
    let err = engine.validate_create(schema, &mut untyped).unwrap_err();
    assert!(matches!(&err, ValidationError::InvalidType { path, .. } if path == "displayName"));
    assert_eq!(
        ScimErrorResponse::from(err).scim_type,
        Some(ScimErrorType::InvalidValue)
    );
}
