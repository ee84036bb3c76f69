use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which resource schemas the engine loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemasConfig {
    /// Load the embedded core User and Group schemas.
    #[serde(default = "default_true")]
    pub core: bool,

    /// Additional schema definitions in the RFC 7643 JSON representation.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Default for SchemasConfig {
    fn default() -> Self {
        Self {
            core: true,
            files: Vec::new(),
        }
    }
}

impl SchemasConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.core && self.files.is_empty() {
            return Err(
                "schemas.core is disabled and schemas.files is empty; no schemas would be loaded"
                    .into(),
            );
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
