//! Configuration module for the SCIM engine.
//!
//! The engine is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [limits]
//! max_filter_length = 2048
//! max_patch_operations = 100
//!
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [schemas]
//! core = true
//! files = ["${SCHEMA_DIR}/enterprise-user.json"]
//! ```

mod limits;
mod observability;
mod schemas;

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

pub use limits::*;
pub use observability::*;
pub use schemas::*;
use serde::{Deserialize, Serialize};

/// Root configuration for the engine.
///
/// All sections are optional; an empty file yields the core schemas with
/// default limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Filter and PATCH input limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Console logging for the command-line front end.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Resource schemas to load.
    #[serde(default)]
    pub schemas: SchemasConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Relative schema file paths are resolved against the directory of the
    /// configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(e, path.to_path_buf()))?;

        let mut config = Self::from_str(&contents)?;
        if let Some(base) = path.parent() {
            config.schemas.files = config
                .schemas
                .files
                .into_iter()
                .map(|file| resolve_relative(base, file))
                .collect();
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: EngineConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Validation)?;
        self.schemas.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

fn resolve_relative(base: &Path, file: PathBuf) -> PathBuf {
    if file.is_relative() {
        base.join(file)
    } else {
        file
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Expand `${VAR}` references outside of `#` comments.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            if comment_pos.is_some_and(|pos| whole.start() >= pos) {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_str("").unwrap();
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.limits.max_filter_length, 4096);
        assert_eq!(config.limits.max_patch_operations, 1000);
        assert!(config.schemas.core);
        assert!(config.schemas.files.is_empty());
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_str(
            r#"
            [limits]
            max_filter_length = 128
            max_patch_operations = 5

            [logging]
            level = "debug"
            format = "json"
            filter = "scim_engine::scim::patch=trace"

            [schemas]
            core = false
            files = ["/etc/scim/device.json"]
        "#,
        )
        .unwrap();

        assert_eq!(config.limits.max_filter_length, 128);
        assert_eq!(config.limits.max_patch_operations, 5);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.schemas.core);
        assert_eq!(config.schemas.files, vec![PathBuf::from("/etc/scim/device.json")]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_str("[limits]\nmax_filters = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = EngineConfig::from_str("[limits]\nmax_patch_operations = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("max_patch_operations")));
    }

    #[test]
    fn test_no_schemas_rejected() {
        let err = EngineConfig::from_str("[schemas]\ncore = false").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_file_resolves_relative_schema_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scim.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[schemas]\nfiles = [\"device.json\", \"/abs/other.json\"]").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(
            config.schemas.files,
            vec![dir.path().join("device.json"), PathBuf::from("/abs/other.json")]
        );
    }

    #[test]
    fn test_from_file_missing() {
        let err = EngineConfig::from_file("/nonexistent/scim.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_SCIM_MAX_OPS", Some("42"), || {
            let config =
                EngineConfig::from_str("[limits]\nmax_patch_operations = ${TEST_SCIM_MAX_OPS}")
                    .unwrap();
            assert_eq!(config.limits.max_patch_operations, 42);
        });
    }

    #[test]
    fn test_env_var_missing() {
        temp_env::with_var("TEST_SCIM_MISSING", None::<&str>, || {
            let err = expand_env_vars("level = \"${TEST_SCIM_MISSING}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "TEST_SCIM_MISSING"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# files = [\"${NONEXISTENT_VAR}\"]").unwrap();
        assert_eq!(result, "# files = [\"${NONEXISTENT_VAR}\"]");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        let result = expand_env_vars("core = true # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "core = true # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_multiline_with_comments() {
        temp_env::with_var("TEST_MULTI", Some("debug"), || {
            let input = r#"level = "${TEST_MULTI}"
# format = "${NONEXISTENT}"
format = "json""#;
            let result = expand_env_vars(input).unwrap();
            assert_eq!(
                result,
                r#"level = "debug"
# format = "${NONEXISTENT}"
format = "json""#
            );
        });
    }
}
