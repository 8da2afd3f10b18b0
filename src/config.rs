use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides `connection_string` from the config file.
pub const CONNECTION_STRING_ENV: &str = "PGREL_CONNECTION_STRING";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub connection_string: String,
    /// Maximum number of pooled sessions. Unset uses the pool's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,
}

impl Configuration {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            pool_size: None,
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pgrel")
            .join("config.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Configuration =
            toml::from_str(content).context("Failed to parse configuration")?;
        if config.pool_size == Some(0) {
            anyhow::bail!("pool_size must be at least 1");
        }
        Ok(config)
    }

    /// Read `path`, then apply the environment override.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.apply_env_override(std::env::var(CONNECTION_STRING_ENV).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env_override(&mut self, value: Option<String>) {
        if let Some(connection_string) = value.filter(|s| !s.is_empty()) {
            self.connection_string = connection_string;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let config = Configuration::from_toml_str(
            r#"
            connection_string = "postgresql://app@localhost/blog"
            pool_size = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.connection_string, "postgresql://app@localhost/blog");
        assert_eq!(config.pool_size, Some(5));
    }

    #[test]
    fn test_pool_size_is_optional() {
        let config =
            Configuration::from_toml_str(r#"connection_string = "host=localhost""#).unwrap();
        assert_eq!(config.pool_size, None);
    }

    #[test]
    fn test_rejects_missing_connection_string() {
        assert!(Configuration::from_toml_str("pool_size = 2").is_err());
    }

    #[test]
    fn test_rejects_zero_pool_size() {
        assert!(Configuration::from_toml_str(
            "connection_string = \"host=localhost\"\npool_size = 0"
        )
        .is_err());
    }

    #[test]
    fn test_env_override() {
        let mut config = Configuration::new("host=localhost");
        config.apply_env_override(None);
        assert_eq!(config.connection_string, "host=localhost");
        config.apply_env_override(Some(String::new()));
        assert_eq!(config.connection_string, "host=localhost");
        config.apply_env_override(Some("host=db.internal".into()));
        assert_eq!(config.connection_string, "host=db.internal");
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("pgrel-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut config = Configuration::new("postgresql://app@localhost/blog");
        config.pool_size = Some(3);
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded = Configuration::from_toml_str(&content).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_default_path() {
        let path = Configuration::default_path();
        assert!(path.ends_with("pgrel/config.toml"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Configuration::load(Path::new("/nonexistent/pgrel.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
