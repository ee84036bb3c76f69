//! SCIM 2.0 Schema Model
//!
//! Attribute descriptors and the schema that indexes them (RFC 7643 §7).
//!
//! A [`Schema`] is built once, at startup, and is read-only afterwards. Its
//! attribute index and every derived descriptor are computed in the
//! constructor, so a schema can be shared by reference across concurrent
//! evaluations without synchronization.
//!
//! ## Common attributes
//!
//! `id`, `externalId`, `schemas` and `meta` are added to every schema that
//! does not define them itself (RFC 7643 §3.1).

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{SCHEMA_GROUP, SCHEMA_USER};

/// Errors raised while loading a schema definition.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid schema '{schema}': {reason}")]
    Invalid { schema: String, reason: String },
}

/// Attribute data type. `binary` is accepted and handled as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    #[default]
    #[serde(alias = "binary")]
    String,
    Boolean,
    Decimal,
    Integer,
    DateTime,
    Reference,
    Complex,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Boolean => "boolean",
            AttributeType::Decimal => "decimal",
            AttributeType::Integer => "integer",
            AttributeType::DateTime => "dateTime",
            AttributeType::Reference => "reference",
            AttributeType::Complex => "complex",
        }
    }
}

/// Whether and when an attribute may be modified by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutability {
    ReadOnly,
    #[default]
    ReadWrite,
    Immutable,
    WriteOnly,
}

/// Values derived from the attribute's position in its schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assist {
    /// Key used for the attribute in JSON resources.
    pub json_name: String,
    /// Dotted path from the resource root, e.g. `name.givenName`.
    pub path: String,
    /// Path qualified with the schema URN, e.g.
    /// `urn:ietf:params:scim:schemas:core:2.0:User:name.givenName`.
    pub full_path: String,
    /// Sub-attribute used to pair elements of a multi-valued complex
    /// attribute across two versions of a resource.
    pub array_index_key: Option<String>,
}

/// Schema-declared description of one resource field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: AttributeType,

    #[serde(default)]
    pub multi_valued: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub case_exact: bool,

    #[serde(default)]
    pub mutability: Mutability,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_attributes: Vec<Attribute>,

    /// Explicit pairing key for multi-valued complex attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_index_key: Option<String>,

    #[serde(skip)]
    pub assist: Assist,

    /// Single-valued twin used for per-element processing.
    #[serde(skip)]
    element: Option<Box<Attribute>>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
            multi_valued: false,
            description: None,
            required: false,
            case_exact: false,
            mutability: Mutability::ReadWrite,
            sub_attributes: Vec::new(),
            array_index_key: None,
            assist: Assist::default(),
            element: None,
        }
    }

    pub fn complex(name: impl Into<String>, sub_attributes: Vec<Attribute>) -> Self {
        Self {
            sub_attributes,
            ..Self::new(name, AttributeType::Complex)
        }
    }

    pub fn with_multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn with_required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_case_exact(mut self) -> Self {
        self.case_exact = true;
        self
    }

    pub fn with_mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    pub fn is_complex(&self) -> bool {
        self.kind == AttributeType::Complex
    }

    /// Find a sub-attribute by name, ignoring case.
    pub fn sub_attribute(&self, name: &str) -> Option<&Attribute> {
        self.sub_attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Copy of this descriptor with multi-valuedness stripped, for
    /// processing one element of a multi-valued attribute.
    pub fn clone_single_valued(&self) -> Attribute {
        let mut element = self.clone();
        element.multi_valued = false;
        element.element = None;
        element
    }

    /// Descriptor for one element of this attribute.
    ///
    /// Schema-owned attributes carry a precomputed twin. A standalone
    /// descriptor that never went through a [`Schema`] returns itself.
    pub fn element(&self) -> &Attribute {
        match (&self.element, self.multi_valued) {
            (Some(element), true) => element,
            _ => self,
        }
    }

    pub fn array_index_key(&self) -> Option<&str> {
        self.assist.array_index_key.as_deref()
    }

    /// Empty value for a freshly created slot of this attribute.
    pub fn zero_value(&self) -> Value {
        if self.multi_valued {
            Value::Array(Vec::new())
        } else if self.is_complex() {
            Value::Object(serde_json::Map::new())
        } else {
            Value::Null
        }
    }

    fn finalize(&mut self, parent_path: &str, schema_id: &str) {
        self.assist.json_name = self.name.clone();
        self.assist.path = if parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", parent_path, self.name)
        };
        self.assist.full_path = format!("{}:{}", schema_id, self.assist.path);
        self.assist.array_index_key = if self.multi_valued && self.is_complex() {
            self.array_index_key.clone().or_else(|| {
                ["value", "type"]
                    .iter()
                    .find_map(|k| self.sub_attribute(k).map(|a| a.name.clone()))
            })
        } else {
            None
        };

        let path = self.assist.path.clone();
        for sub in &mut self.sub_attributes {
            sub.finalize(&path, schema_id);
        }

        self.element = self
            .multi_valued
            .then(|| Box::new(self.clone_single_valued()));
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDefinition {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    attributes: Vec<Attribute>,
}

/// A resource schema with its attribute index.
#[derive(Debug, Clone)]
pub struct Schema {
    id: String,
    name: String,
    description: Option<String>,
    /// Synthetic complex attribute whose sub-attributes are the schema's
    /// top-level attributes.
    root: Attribute,
    /// Lower-cased dotted path to the chain of sub-attribute positions.
    index: HashMap<String, Vec<usize>>,
}

impl Schema {
    /// Build a schema from its top-level attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] if the id is empty, a name repeats at
    /// one level, or complex and simple attributes are mixed up.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        attributes: Vec<Attribute>,
    ) -> Result<Self, SchemaError> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(SchemaError::Invalid {
                schema: name,
                reason: "schema id must not be empty".to_string(),
            });
        }

        let mut attributes = attributes;
        for common in common_attributes() {
            if !attributes
                .iter()
                .any(|a| a.name.eq_ignore_ascii_case(&common.name))
            {
                attributes.push(common);
            }
        }
        check_attributes(&id, &attributes)?;

        let mut root = Attribute::complex(String::new(), attributes);
        for sub in &mut root.sub_attributes {
            sub.finalize("", &id);
        }
        root.assist.full_path = id.clone();

        let mut index = HashMap::new();
        build_index(&root, "", &mut Vec::new(), &mut index);

        tracing::debug!(schema = %id, attributes = index.len(), "Schema loaded");

        Ok(Self {
            id,
            name,
            description: None,
            root,
            index,
        })
    }

    /// Parse an RFC 7643 schema representation.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let definition: SchemaDefinition = serde_json::from_str(json)?;
        let mut schema = Self::new(definition.id, definition.name, definition.attributes)?;
        schema.description = definition.description;
        Ok(schema)
    }

    /// Load a schema definition from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// RFC 7643 core User schema.
    pub fn core_user() -> Self {
        Self::from_json(include_str!("schemas/user.json"))
            .expect("embedded core User schema is valid")
    }

    /// RFC 7643 core Group schema.
    pub fn core_group() -> Self {
        Self::from_json(include_str!("schemas/group.json"))
            .expect("embedded core Group schema is valid")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Synthetic complex attribute at the top of the resource.
    pub fn root(&self) -> &Attribute {
        &self.root
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.root.sub_attributes
    }

    /// Whether `key` names this schema, by URN or short name.
    pub fn matches(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.name.eq_ignore_ascii_case(key)
    }

    /// Look up an attribute by dotted path, ignoring case. A leading schema
    /// URN qualifier is accepted.
    pub fn attribute(&self, path: &str) -> Option<&Attribute> {
        let path = self.strip_urn(path);
        let chain = self.index.get(&path.to_ascii_lowercase())?;
        let mut attribute = &self.root;
        for &position in chain {
            attribute = attribute.sub_attributes.get(position)?;
        }
        Some(attribute)
    }

    /// Remove this schema's URN qualifier from an attribute path.
    pub fn strip_urn<'p>(&self, path: &'p str) -> &'p str {
        let prefix_len = self.id.len() + 1;
        if path.len() > prefix_len
            && path.as_bytes()[self.id.len()] == b':'
            && path[..self.id.len()].eq_ignore_ascii_case(&self.id)
        {
            &path[prefix_len..]
        } else {
            path
        }
    }

    /// Whether this is one of the embedded RFC 7643 core schemas.
    pub fn is_core(&self) -> bool {
        self.id == SCHEMA_USER || self.id == SCHEMA_GROUP
    }
}

fn check_attributes(schema: &str, attributes: &[Attribute]) -> Result<(), SchemaError> {
    let invalid = |reason: String| SchemaError::Invalid {
        schema: schema.to_string(),
        reason,
    };
    for (i, attribute) in attributes.iter().enumerate() {
        if attribute.name.is_empty() {
            return Err(invalid("attribute name must not be empty".to_string()));
        }
        if attribute.name.contains('.') {
            return Err(invalid(format!(
                "attribute name '{}' must not contain '.'",
                attribute.name
            )));
        }
        if attributes[..i]
            .iter()
            .any(|a| a.name.eq_ignore_ascii_case(&attribute.name))
        {
            return Err(invalid(format!("duplicate attribute '{}'", attribute.name)));
        }
        match (attribute.is_complex(), attribute.sub_attributes.is_empty()) {
            (true, true) => {
                return Err(invalid(format!(
                    "complex attribute '{}' has no sub-attributes",
                    attribute.name
                )));
            }
            (false, false) => {
                return Err(invalid(format!(
                    "{} attribute '{}' cannot have sub-attributes",
                    attribute.kind.as_str(),
                    attribute.name
                )));
            }
            _ => {}
        }
        check_attributes(schema, &attribute.sub_attributes)?;
    }
    Ok(())
}

fn build_index(
    attribute: &Attribute,
    prefix: &str,
    chain: &mut Vec<usize>,
    index: &mut HashMap<String, Vec<usize>>,
) {
    for (position, sub) in attribute.sub_attributes.iter().enumerate() {
        let key = if prefix.is_empty() {
            sub.name.to_ascii_lowercase()
        } else {
            format!("{}.{}", prefix, sub.name.to_ascii_lowercase())
        };
        chain.push(position);
        index.insert(key.clone(), chain.clone());
        build_index(sub, &key, chain, index);
        chain.pop();
    }
}

/// `id`, `externalId`, `schemas` and `meta`.
fn common_attributes() -> Vec<Attribute> {
    vec![
        Attribute::new("id", AttributeType::String)
            .with_case_exact()
            .with_mutability(Mutability::ReadOnly),
        Attribute::new("externalId", AttributeType::String).with_case_exact(),
        Attribute::new("schemas", AttributeType::Reference)
            .with_multi_valued()
            .with_required()
            .with_case_exact(),
        Attribute::complex(
            "meta",
            vec![
                Attribute::new("resourceType", AttributeType::String).with_case_exact(),
                Attribute::new("created", AttributeType::DateTime),
                Attribute::new("lastModified", AttributeType::DateTime),
                Attribute::new("location", AttributeType::Reference).with_case_exact(),
                Attribute::new("version", AttributeType::String).with_case_exact(),
            ]
            .into_iter()
            .map(|a| a.with_mutability(Mutability::ReadOnly))
            .collect(),
        )
        .with_mutability(Mutability::ReadOnly),
    ]
}
