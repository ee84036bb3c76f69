use serde::{Deserialize, Serialize};

/// Input size limits applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum filter length in bytes. Default: 4096.
    #[serde(default = "default_max_filter_length")]
    pub max_filter_length: usize,

    /// Maximum operations in a single PATCH request. Default: 1000.
    #[serde(default = "default_max_patch_operations")]
    pub max_patch_operations: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_filter_length: default_max_filter_length(),
            max_patch_operations: default_max_patch_operations(),
        }
    }
}

impl LimitsConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_filter_length == 0 {
            return Err("limits.max_filter_length must be greater than 0".into());
        }
        if self.max_patch_operations == 0 {
            return Err("limits.max_patch_operations must be greater than 0".into());
        }
        Ok(())
    }
}

fn default_max_filter_length() -> usize {
    crate::scim::DEFAULT_MAX_FILTER_LENGTH
}

fn default_max_patch_operations() -> usize {
    1000
}
