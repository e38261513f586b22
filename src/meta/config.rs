//! KeelFS metadata engine configuration
//!
//! Database connection configuration supporting SQLite and PostgreSQL

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(flatten)]
    pub db_config: DatabaseType,
}

/// Database type enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatabaseType {
    #[serde(rename = "sqlite")]
    Sqlite {
        #[serde(default = "default_sqlite_url")]
        url: String,
    },
    #[serde(rename = "postgres")]
    Postgres { url: String },
}

fn default_sqlite_url() -> String {
    "sqlite:///var/lib/keelfs/metadata.db".to_string()
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::IoError)?;

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from default paths
    pub fn from_default_path() -> Result<Self, ConfigError> {
        let possible_paths = [
            "keelfs.yml",
            "keelfs.yaml",
            "config.yml",
            "config.yaml",
            "/etc/keelfs/config.yml",
        ];

        for path in &possible_paths {
            if std::path::Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Err(ConfigError::ConfigNotFound)
    }
}

impl DatabaseConfig {
    /// Get database type string
    pub fn db_type_str(&self) -> &'static str {
        match &self.db_config {
            DatabaseType::Sqlite { .. } => "sqlite",
            DatabaseType::Postgres { .. } => "postgres",
        }
    }

    pub fn url(&self) -> &str {
        match &self.db_config {
            DatabaseType::Sqlite { url } => url,
            DatabaseType::Postgres { url } => url,
        }
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Config file not found in default locations")]
    ConfigNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_database_config() {
        let config: Config = serde_yaml::from_str(
            "database:\n  type: postgres\n  url: postgres://keelfs@db/keelfs\n",
        )
        .unwrap();
        assert_eq!(config.database.db_type_str(), "postgres");
        assert_eq!(config.database.url(), "postgres://keelfs@db/keelfs");
    }

    #[test]
    fn sqlite_url_defaults_when_omitted() {
        let config: Config = serde_yaml::from_str("database:\n  type: sqlite\n").unwrap();
        assert_eq!(config.database.db_type_str(), "sqlite");
        assert!(config.database.url().starts_with("sqlite://"));
    }
}
