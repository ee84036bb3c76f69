//! Engine context shared by every request.
//!
//! [`ScimEngine`] owns the schema graph and the configured limits. It is
//! built once at startup and then only read, so a single instance can be
//! shared by reference across concurrent requests.

use crate::{
    config::{ConfigError, EngineConfig, LimitsConfig},
    scim::{
        FilterError, Node, PatchError, PatchRequest, Resource, ScimErrorResponse, Schema,
        SchemaError, ValidationError, evaluator, parser, patch, validate,
    },
};

/// Errors raised while building an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Schema '{0}' is defined more than once")]
    DuplicateSchema(String),

    #[error("Unknown schema '{0}'")]
    UnknownSchema(String),
}

impl From<EngineError> for ScimErrorResponse {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownSchema(_) => ScimErrorResponse::invalid_value(err.to_string()),
            _ => ScimErrorResponse::internal(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScimEngine {
    schemas: Vec<Schema>,
    limits: LimitsConfig,
}

impl ScimEngine {
    /// Build an engine from configuration, loading the embedded core schemas
    /// and any schema files it lists.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut schemas = Vec::new();
        if config.schemas.core {
            schemas.push(Schema::core_user());
            schemas.push(Schema::core_group());
        }
        for file in &config.schemas.files {
            let schema = Schema::from_file(file)?;
            tracing::debug!(schema = %schema.id(), file = %file.display(), "Loaded schema file");
            schemas.push(schema);
        }
        Self::with_schemas(schemas, config.limits.clone())
    }

    /// Build an engine from already constructed schemas.
    pub fn with_schemas(schemas: Vec<Schema>, limits: LimitsConfig) -> Result<Self, EngineError> {
        for (i, schema) in schemas.iter().enumerate() {
            if schemas[..i].iter().any(|s| s.id() == schema.id()) {
                return Err(EngineError::DuplicateSchema(schema.id().to_string()));
            }
        }
        tracing::debug!(count = schemas.len(), "SCIM engine ready");
        Ok(Self { schemas, limits })
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// Look up a schema by URN, or by name ignoring case (`user`).
    pub fn schema(&self, key: &str) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.id() == key)
            .or_else(|| self.schemas.iter().find(|s| s.name().eq_ignore_ascii_case(key)))
    }

    /// Like [`schema`](Self::schema), failing when nothing matches.
    pub fn require_schema(&self, key: &str) -> Result<&Schema, EngineError> {
        self.schema(key)
            .ok_or_else(|| EngineError::UnknownSchema(key.to_string()))
    }

    /// Parse a filter under the configured length limit.
    pub fn parse_filter(&self, input: &str) -> Result<Node, FilterError> {
        parser::parse_filter_with_limit(input, self.limits.max_filter_length)
    }

    /// Resources matching a parsed filter, in input order.
    pub fn filter<'r>(&self, schema: &Schema, node: &Node, resources: &'r [Resource]) -> Vec<&'r Resource> {
        resources
            .iter()
            .filter(|r| evaluator::matches(node, &r.to_value(), schema.root()))
            .collect()
    }

    /// Apply a PATCH request. Value filters in paths get the configured
    /// filter length limit. The resource is left untouched on failure.
    pub fn patch(
        &self,
        schema: &Schema,
        resource: &mut Resource,
        request: &PatchRequest,
    ) -> Result<(), PatchError> {
        let count = request.operations.len();
        if count > self.limits.max_patch_operations {
            return Err(PatchError::TooManyOperations {
                count,
                max: self.limits.max_patch_operations,
            });
        }
        patch::modify_with_limit(resource, schema, request, self.limits.max_filter_length)
    }

    /// Prepare a client-supplied resource for creation: server-assigned
    /// values are dropped, then types and required attributes are checked.
    pub fn validate_create(
        &self,
        schema: &Schema,
        resource: &mut Resource,
    ) -> Result<(), ValidationError> {
        validate::validate_mutability(schema, resource, None)?;
        validate::validate_types(schema, resource)?;
        validate::validate_required(schema, resource)
    }

    /// Check a full replacement against the stored resource.
    pub fn validate_replace(
        &self,
        schema: &Schema,
        resource: &mut Resource,
        stored: &Resource,
    ) -> Result<(), ValidationError> {
        validate::validate_mutability(schema, resource, Some(stored))?;
        validate::validate_types(schema, resource)?;
        validate::validate_required(schema, resource)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::scim::{PatchOperation, PathError, SCHEMA_GROUP, SCHEMA_USER};

    fn engine() -> ScimEngine {
        ScimEngine::from_config(&EngineConfig::default()).unwrap()
    }

    fn user(value: serde_json::Value) -> Resource {
        Resource::from_value(value).unwrap()
    }

    #[test]
    fn test_schema_lookup() {
        let engine = engine();
        assert_eq!(engine.schema(SCHEMA_USER).unwrap().name(), "User");
        assert_eq!(engine.schema("group").unwrap().id(), SCHEMA_GROUP);
        assert!(engine.schema("Device").is_none());
        assert!(matches!(
            engine.require_schema("Device"),
            Err(EngineError::UnknownSchema(name)) if name == "Device"
        ));
    }

    #[test]
    fn test_duplicate_schema_rejected() {
        let err = ScimEngine::with_schemas(
            vec![Schema::core_user(), Schema::core_user()],
            LimitsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSchema(id) if id == SCHEMA_USER));
    }

    #[test]
    fn test_missing_schema_file() {
        let config = EngineConfig::from_str("[schemas]\nfiles = [\"/nonexistent/device.json\"]")
            .unwrap();
        let err = ScimEngine::from_config(&config).unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::Io { .. })));
    }

    #[test]
    fn test_filter_length_limit() {
        let engine = ScimEngine::with_schemas(
            vec![Schema::core_user()],
            LimitsConfig {
                max_filter_length: 20,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(engine.parse_filter("userName eq \"b\"").is_ok());
        assert!(matches!(
            engine.parse_filter("userName eq \"bjensen@example.com\""),
            Err(FilterError::TooLong { max: 20, .. })
        ));
    }

    #[test]
    fn test_filter_resources() {
        let engine = engine();
        let schema = engine.schema("User").unwrap();
        let resources = vec![
            user(json!({ "id": "1", "userName": "bjensen", "active": true })),
            user(json!({ "id": "2", "userName": "jsmith", "active": false })),
            user(json!({ "id": "3", "userName": "BJensen2", "active": true })),
        ];
        let node = engine.parse_filter("userName sw \"bjensen\" and active eq true").unwrap();
        let ids: Vec<_> = engine
            .filter(schema, &node, &resources)
            .into_iter()
            .filter_map(Resource::id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_patch_operation_limit() {
        let engine = ScimEngine::with_schemas(
            vec![Schema::core_user()],
            LimitsConfig {
                max_patch_operations: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let schema = engine.schema("User").unwrap();
        let mut resource = user(json!({ "userName": "b" }));
        let request = PatchRequest::new(vec![
            PatchOperation::replace("nickName", json!("Babs")),
            PatchOperation::replace("title", json!("Tour Guide")),
        ]);
        assert!(matches!(
            engine.patch(schema, &mut resource, &request),
            Err(PatchError::TooManyOperations { count: 2, max: 1 })
        ));
        assert!(resource.get("nickName").is_none());
    }

    #[test]
    fn test_patch_path_filter_length_limit() {
        let engine = ScimEngine::with_schemas(
            vec![Schema::core_user()],
            LimitsConfig {
                max_filter_length: 13,
                ..Default::default()
            },
        )
        .unwrap();
        let schema = engine.schema("User").unwrap();
        let mut resource = user(json!({
            "userName": "b",
            "emails": [{ "value": "b@example.com", "type": "work" }]
        }));
        let request = PatchRequest::new(vec![PatchOperation::remove("emails[type eq \"work\"]")]);
        let err = engine.patch(schema, &mut resource, &request).unwrap_err();
        assert!(matches!(err, PatchError::Operation { index: 0, .. }));
        assert!(matches!(
            err.root_cause(),
            PatchError::Path(PathError::Filter {
                source: FilterError::TooLong { length: 14, max: 13 },
                ..
            })
        ));
        assert_eq!(resource.get("emails").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_validate_create_drops_server_values() {
        let engine = engine();
        let schema = engine.schema("User").unwrap();
        let mut resource = user(json!({
            "schemas": [SCHEMA_USER],
            "id": "client-chosen",
            "userName": "bjensen"
        }));
        engine.validate_create(schema, &mut resource).unwrap();
        assert!(resource.id().is_none());
    }

    #[test]
    fn test_validate_create_requires_user_name() {
        let engine = engine();
        let schema = engine.schema("User").unwrap();
        let mut resource = user(json!({ "schemas": [SCHEMA_USER] }));
        assert!(matches!(
            engine.validate_create(schema, &mut resource),
            Err(ValidationError::Required { path }) if path == "userName"
        ));
    }

    #[test]
    fn test_validate_replace_keeps_stored_id() {
        let engine = engine();
        let schema = engine.schema("User").unwrap();
        let stored = user(json!({ "schemas": [SCHEMA_USER], "id": "abc", "userName": "bjensen" }));
        let mut incoming = user(json!({ "schemas": [SCHEMA_USER], "userName": "babs" }));
        engine.validate_replace(schema, &mut incoming, &stored).unwrap();
        assert_eq!(incoming.id(), Some("abc"));
        assert_eq!(incoming.get("userName"), Some(&json!("babs")));
    }
}
