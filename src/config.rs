//! Service configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or
//! no file at all) gives a working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Label of the default collection.
    #[serde(default = "default_collection_label")]
    pub collection_label: String,

    /// Take over `org.freedesktop.secrets` from another provider.
    #[serde(default)]
    pub replace_existing: bool,

    /// Upper bound on one unlock attempt started by a prompt.
    #[serde(default = "default_prompt_timeout")]
    pub prompt_timeout_secs: u64,

    /// Content type reported on returned secrets.
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_collection_label() -> String {
    "Vault".to_string()
}

fn default_prompt_timeout() -> u64 {
    300
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            collection_label: default_collection_label(),
            replace_existing: false,
            prompt_timeout_secs: default_prompt_timeout(),
            content_type: default_content_type(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ServiceError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.prompt_timeout_secs == 0 {
            return Err(ServiceError::Config(
                "prompt_timeout_secs must be > 0".into(),
            ));
        }
        if self.content_type.is_empty() {
            return Err(ServiceError::Config("content_type must not be empty".into()));
        }
        Ok(())
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.collection_label, "Vault");
        assert!(!config.replace_existing);
        assert_eq!(config.prompt_timeout(), Duration::from_secs(300));
        assert_eq!(config.content_type, "text/plain");
    }

    #[test]
    fn test_config_from_toml() {
        let config = ServiceConfig::from_toml_str(
            r#"
collection_label = "Work"
replace_existing = true
"#,
        )
        .unwrap();
        assert_eq!(config.collection_label, "Work");
        assert!(config.replace_existing);
        assert_eq!(config.prompt_timeout_secs, 300);
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        assert_eq!(ServiceConfig::from_toml_str("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            ServiceConfig::from_toml_str("prompt_timeout_secs = 0"),
            Err(ServiceError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_toml_str("prompt_timeout_secs = \"soon\""),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServiceConfig::load(Path::new("/nonexistent/vault-secret-service.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }
}
