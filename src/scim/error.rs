//! SCIM 2.0 Error Types
//!
//! Engine errors come in three layers: syntax errors raised while tokenizing or
//! parsing a filter ([`FilterError`]), semantic path errors raised while a path
//! is resolved against a schema and a resource ([`PathError`]), and policy
//! errors raised by the PATCH engine and the validators ([`PatchError`],
//! [`ValidationError`]). Every layer converts into a [`ScimErrorResponse`], the
//! RFC 7644 Section 3.12 error body.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::types::SCHEMA_ERROR;

// =============================================================================
// Engine errors
// =============================================================================

/// Syntax error in a filter expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("Filter is empty")]
    Empty,

    #[error("Filter exceeds maximum length ({length} bytes, max {max})")]
    TooLong { length: usize, max: usize },

    #[error("Filter nests deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("Unterminated string at position {position}")]
    UnterminatedString { position: usize },

    #[error("Only one level of nested filter is allowed (position {position})")]
    NestingTooDeep { position: usize },

    #[error("Mismatched bracket at position {position}")]
    MismatchedBracket { position: usize },

    #[error("Nested filter at position {position} must follow an attribute path")]
    DanglingFilter { position: usize },

    #[error("Unexpected character '{found}' after nested filter at position {position}")]
    UnexpectedAfterFilter { found: char, position: usize },

    #[error("Mismatched parenthesis")]
    MismatchedParenthesis,

    #[error("Insufficient arguments for operator '{operator}'")]
    InsufficientArguments { operator: String },

    #[error("Operator '{operator}' with {arity} arguments is not supported")]
    UnsupportedArity { operator: String, arity: usize },

    #[error("Expression has {count} dangling operands; an operator is missing")]
    ExcessOperands { count: usize },

    #[error("Operator '{operator}' cannot take '{found}' as an operand")]
    InvalidOperand { operator: String, found: String },
}

/// Error raised while compiling or resolving an attribute path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("Invalid path '{path}': {reason}")]
    Syntax { path: String, reason: String },

    #[error("Invalid value filter in path '{path}': {source}")]
    Filter {
        path: String,
        #[source]
        source: FilterError,
    },

    #[error("No attribute matches '{segment}' in path '{path}'")]
    MissingAttribute { path: String, segment: String },

    #[error("Path '{path}' cannot step into a {found} value at '{segment}'")]
    Shape {
        path: String,
        segment: String,
        found: &'static str,
    },

    #[error("Value filter in path '{path}' must follow a multi-valued attribute")]
    FilterOnSingleValue { path: String },
}

impl PathError {
    pub(crate) fn syntax(path: &str, reason: impl Into<String>) -> Self {
        PathError::Syntax {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(path: &str, segment: &str) -> Self {
        PathError::MissingAttribute {
            path: path.to_string(),
            segment: segment.to_string(),
        }
    }
}

/// PATCH operation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("Request must declare exactly the PatchOp schema")]
    InvalidSchema,

    #[error("Request has {count} operations (max {max})")]
    TooManyOperations { count: usize, max: usize },

    #[error("Invalid modification: {0}")]
    InvalidModification(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("No target matches path '{0}'")]
    NoTarget(String),

    #[error("Invalid operation at index {index}: {source}")]
    Operation {
        index: usize,
        #[source]
        source: Box<PatchError>,
    },

    #[error("Modification failed: {0}")]
    Failed(String),
}

impl PatchError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        PatchError::InvalidModification(reason.into())
    }

    /// The innermost error, skipping operation index wrappers.
    pub fn root_cause(&self) -> &PatchError {
        match self {
            PatchError::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Schema validation failure for a single node of a resource.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Attribute '{path}' must be {expected}")]
    InvalidType { path: String, expected: String },

    #[error("Required attribute '{path}' is missing")]
    Required { path: String },

    #[error("Attribute '{path}' is immutable and cannot be changed")]
    Immutable { path: String },
}

// =============================================================================
// Protocol error response
// =============================================================================

/// SCIM error response per RFC 7644.
///
/// All SCIM errors are returned in this format with appropriate HTTP status codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimErrorResponse {
    /// SCIM schema URIs (always contains the Error schema)
    pub schemas: Vec<String>,

    /// HTTP status code as a string (e.g., "400", "404")
    pub status: String,

    /// SCIM-specific error type (optional, per RFC 7644)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<ScimErrorType>,

    /// Human-readable error detail
    pub detail: String,
}

impl ScimErrorResponse {
    fn new(
        status: StatusCode,
        scim_type: Option<ScimErrorType>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            schemas: vec![SCHEMA_ERROR.to_string()],
            status: status.as_u16().to_string(),
            scim_type,
            detail: detail.into(),
        }
    }

    /// Invalid filter syntax error (400)
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidFilter),
            detail,
        )
    }

    /// Invalid path error (400)
    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidPath),
            detail,
        )
    }

    /// Invalid request syntax error (400)
    pub fn invalid_syntax(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidSyntax),
            detail,
        )
    }

    /// No target for PATCH operation (400)
    pub fn no_target(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::NoTarget),
            detail,
        )
    }

    /// Attempt to modify immutable or read-only attribute (400)
    pub fn mutability(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::Mutability),
            detail,
        )
    }

    /// Invalid attribute value (400)
    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidValue),
            detail,
        )
    }

    /// Request too large (413)
    pub fn too_many(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            Some(ScimErrorType::TooMany),
            detail,
        )
    }

    /// Internal server error (500)
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, None, detail)
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status.parse().unwrap_or(500))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// SCIM error types per RFC 7644 Section 3.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScimErrorType {
    /// Filter syntax is invalid or unsupported
    InvalidFilter,

    /// Path attribute is invalid or malformed
    InvalidPath,

    /// Request body has invalid syntax
    InvalidSyntax,

    /// PATCH path did not yield an attribute or value to operate on
    NoTarget,

    /// Attempt to modify read-only or immutable attribute
    Mutability,

    /// Attribute value is invalid for its type
    InvalidValue,

    /// Request payload too large
    TooMany,
}

impl std::fmt::Display for ScimErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScimErrorType::InvalidFilter => write!(f, "invalidFilter"),
            ScimErrorType::InvalidPath => write!(f, "invalidPath"),
            ScimErrorType::InvalidSyntax => write!(f, "invalidSyntax"),
            ScimErrorType::NoTarget => write!(f, "noTarget"),
            ScimErrorType::Mutability => write!(f, "mutability"),
            ScimErrorType::InvalidValue => write!(f, "invalidValue"),
            ScimErrorType::TooMany => write!(f, "tooMany"),
        }
    }
}

impl From<FilterError> for ScimErrorResponse {
    fn from(e: FilterError) -> Self {
        ScimErrorResponse::invalid_filter(e.to_string())
    }
}

impl From<PathError> for ScimErrorResponse {
    fn from(e: PathError) -> Self {
        ScimErrorResponse::invalid_path(e.to_string())
    }
}

impl From<PatchError> for ScimErrorResponse {
    fn from(e: PatchError) -> Self {
        let detail = e.to_string();
        match e.root_cause() {
            PatchError::InvalidSchema => ScimErrorResponse::invalid_syntax(detail),
            PatchError::TooManyOperations { .. } => ScimErrorResponse::too_many(detail),
            PatchError::Path(_) => ScimErrorResponse::invalid_path(detail),
            PatchError::NoTarget(_) => ScimErrorResponse::no_target(detail),
            PatchError::Failed(_) => ScimErrorResponse::internal(detail),
            PatchError::InvalidModification(_) | PatchError::Operation { .. } => {
                ScimErrorResponse::invalid_value(detail)
            }
        }
    }
}

impl From<ValidationError> for ScimErrorResponse {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Immutable { .. } => ScimErrorResponse::mutability(e.to_string()),
            _ => ScimErrorResponse::invalid_value(e.to_string()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
