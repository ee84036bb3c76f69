//! SCIM 2.0 Protocol Identifiers and Metadata
//!
//! Schema URIs and the `meta` block shared by every resource (RFC 7643 §3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Schema URIs
// =============================================================================

/// SCIM Core User schema URI
pub const SCHEMA_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// SCIM Core Group schema URI
pub const SCHEMA_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// SCIM Error schema URI
pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// SCIM PatchOp schema URI
pub const SCHEMA_PATCH_OP: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// Prefix shared by every schema URN; attribute paths may be qualified with it.
pub const URN_PREFIX: &str = "urn:";

// =============================================================================
// Resource Metadata
// =============================================================================

/// Resource metadata common to all SCIM resources.
///
/// Contains server-assigned metadata about the resource lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimMeta {
    /// The resource type (e.g., "User", "Group")
    pub resource_type: String,

    /// When the resource was created
    pub created: DateTime<Utc>,

    /// When the resource was last modified
    pub last_modified: DateTime<Utc>,

    /// The absolute URI of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// ETag for optimistic concurrency (e.g., "W/\"a330bc54f0671c9\"")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ScimMeta {
    /// Create metadata for a freshly created resource.
    pub fn new(resource_type: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            resource_type: resource_type.into(),
            created,
            last_modified: created,
            location: None,
            version: None,
        }
    }

    /// Set the location URI
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the ETag version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Record a modification.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_modified = at;
    }
}
