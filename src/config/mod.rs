//! Configuration loading and management

pub mod resources;

pub use resources::{Endpoint, Resource, RouterConfig};

use crate::core::pagination::PageLimits;
use anyhow::Result;
use serde::Deserialize;

/// Environment variable overriding `jwt_secret`
pub const JWT_SECRET_ENV: &str = "VOOG_JWT_SECRET";

/// Process settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the server listens on
    pub bind: String,

    /// Secret used to verify request credentials
    pub jwt_secret: Option<String>,

    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub log_filter: String,

    pub pagination: PageLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            jwt_secret: None,
            log_filter: "info".to_string(),
            pagination: PageLimits::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, then apply environment overrides
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&content)?;
        Ok(settings.with_env_overrides())
    }

    /// Load settings from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes to null
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Settings from the environment alone
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(secret) = std::env::var(JWT_SECRET_ENV).ok().filter(|s| !s.is_empty()) {
            self.jwt_secret = Some(secret);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_yaml_str("").unwrap();

        assert_eq!(settings.bind, "127.0.0.1:3000");
        assert_eq!(settings.log_filter, "info");
        assert!(settings.jwt_secret.is_none());
        assert_eq!(settings.pagination, PageLimits::default());
    }

    #[test]
    fn test_partial_yaml() {
        let settings = Settings::from_yaml_str(
            r#"
bind: "0.0.0.0:8080"
pagination:
  max_per_page: 100
"#,
        )
        .unwrap();

        assert_eq!(settings.bind, "0.0.0.0:8080");
        assert_eq!(settings.pagination.max_per_page, 100);
        assert_eq!(settings.pagination.default_per_page, 250);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(Settings::from_yaml_str("pagination: [1, 2]").is_err());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_filter: debug").unwrap();

        let settings = Settings::from_yaml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(settings.log_filter, "debug");
    }
}
