use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::backend::database::DatabaseBackendConfig;
use crate::backend::DatabaseType;
use crate::error::{AppError, AppResult};

lazy_static! {
    static ref ENV_VAR_REGEX: Regex =
        Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<default>[^}]*))?\}")
            .expect("environment variable pattern must compile");
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: String,
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> AppResult<Self> {
        let path = config_path.as_ref();

        if !path.exists() {
            return Err(AppError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let expanded_content = Self::expand_env_vars(&content)?;

        let app_config: AppConfig = serde_yaml::from_str(&expanded_content).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        app_config.to_backend_config()?;
        Ok(app_config)
    }

    /// In-memory SQLite with plain info logging
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                db_type: "sqlite".to_string(),
                url: ":memory:".to_string(),
                max_connections: 1,
                connection_timeout: default_connection_timeout(),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Replace `${VAR}` and `${VAR:-default}` with values from the environment
    fn expand_env_vars(content: &str) -> AppResult<String> {
        let mut expanded = String::with_capacity(content.len());
        let mut last = 0;

        for captures in ENV_VAR_REGEX.captures_iter(content) {
            let whole = match captures.get(0) {
                Some(m) => m,
                None => continue,
            };
            let name = &captures["name"];
            let value = match std::env::var(name) {
                Ok(value) => value,
                Err(_) => match captures.name("default") {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        return Err(AppError::Configuration(format!(
                            "Environment variable {} not found and no default provided",
                            name
                        )))
                    }
                },
            };

            expanded.push_str(&content[last..whole.start()]);
            expanded.push_str(&value);
            last = whole.end();
        }

        expanded.push_str(&content[last..]);
        Ok(expanded)
    }

    pub fn to_backend_config(&self) -> AppResult<DatabaseBackendConfig> {
        let database_type = match self.database.db_type.as_str() {
            "sqlite" => DatabaseType::SQLite,
            other => {
                return Err(AppError::Configuration(format!(
                    "Unsupported database type: {}",
                    other
                )))
            }
        };

        let config = DatabaseBackendConfig::new(database_type, self.database.url.clone())
            .with_max_connections(self.database.max_connections)
            .with_connection_timeout(self.database.connection_timeout);
        config.validate().map_err(AppError::Configuration)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("PBX_TEST_DB_URL", "sqlite:/var/lib/pbx/pbx.db");

        let yaml_content = "url: \"${PBX_TEST_DB_URL:-sqlite::memory:}\"\nlevel: ${PBX_TEST_MISSING:-debug}";
        let expanded = AppConfig::expand_env_vars(yaml_content).unwrap();
        assert_eq!(
            expanded,
            "url: \"sqlite:/var/lib/pbx/pbx.db\"\nlevel: debug"
        );

        std::env::remove_var("PBX_TEST_DB_URL");
    }

    #[test]
    fn test_env_var_without_default() {
        let result = AppConfig::expand_env_vars("url: ${PBX_TEST_UNSET_VARIABLE}");
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_config_file_loading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
database:
  type: "sqlite"
  url: "${{PBX_TEST_LOAD_URL:-sqlite:./pbx.db}}"
  max_connections: 4
logging:
  level: "pbx_dao=debug"
  format: "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.database.db_type, "sqlite");
        assert_eq!(config.database.url, "sqlite:./pbx.db");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.connection_timeout, 30);
        assert_eq!(config.logging.level, "pbx_dao=debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let backend = config.to_backend_config().unwrap();
        assert_eq!(backend.database_type, DatabaseType::SQLite);
        assert_eq!(backend.max_connections, 4);
    }

    #[test]
    fn test_logging_section_is_optional() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "database:\n  type: sqlite\n  url: \":memory:\"\n").unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_missing_config_file() {
        let result = AppConfig::load_from_file("/nonexistent/path/config.yaml");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Configuration file not found"));
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "invalid: yaml: content: [").unwrap();

        let result = AppConfig::load_from_file(file.path());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[test]
    fn test_unsupported_database_type() {
        let mut config = AppConfig::default_config();
        config.database.db_type = "postgresql".to_string();
        assert!(matches!(
            config.to_backend_config(),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default_config();
        assert_eq!(config.database.db_type, "sqlite");
        assert_eq!(config.database.url, ":memory:");
        assert_eq!(config.database.max_connections, 1);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Plain);

        let backend = config.to_backend_config().unwrap();
        assert!(backend.is_memory_database());
    }
}
