use crate::backend::DatabaseType;
use std::collections::HashMap;

/// Connection settings of the database backend
#[derive(Debug, Clone)]
pub struct DatabaseBackendConfig {
    pub database_type: DatabaseType,

    /// Connection URL, e.g. `sqlite:./pbx.db` or `:memory:`
    pub connection_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Seconds to wait when acquiring a connection
    pub connection_timeout: u64,

    /// Backend-specific options such as `journal_mode`
    pub options: HashMap<String, String>,
}

impl DatabaseBackendConfig {
    pub fn new(database_type: DatabaseType, connection_url: String) -> Self {
        Self {
            database_type,
            connection_url,
            max_connections: 10,
            connection_timeout: 30,
            options: HashMap::new(),
        }
    }

    pub fn sqlite(connection_url: String) -> Self {
        Self::new(DatabaseType::SQLite, connection_url)
    }

    /// In-memory SQLite database for tests
    pub fn memory_sqlite() -> Self {
        Self::new(DatabaseType::SQLite, ":memory:".to_string()).with_max_connections(1)
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connection_timeout(mut self, timeout_seconds: u64) -> Self {
        self.connection_timeout = timeout_seconds;
        self
    }

    pub fn with_option(mut self, key: String, value: String) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }

    pub fn is_memory_database(&self) -> bool {
        matches!(self.connection_url.as_str(), ":memory:" | "sqlite::memory:")
    }

    /// URL understood by `SqliteConnectOptions`
    pub fn sqlite_url(&self) -> String {
        if self.is_memory_database() {
            "sqlite::memory:".to_string()
        } else if self.connection_url.starts_with("sqlite:") {
            self.connection_url.clone()
        } else {
            format!("sqlite:{}", self.connection_url)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.connection_url.is_empty() {
            return Err("Connection URL cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections must be greater than 0".to_string());
        }

        match self.database_type {
            DatabaseType::SQLite => {
                if !self.connection_url.starts_with("sqlite:")
                    && self.connection_url != ":memory:"
                    && !self.connection_url.ends_with(".db")
                    && !self.connection_url.ends_with(".sqlite")
                {
                    return Err("SQLite connection URL must start with 'sqlite:', be ':memory:', or end with '.db' or '.sqlite'".to_string());
                }
            }
        }

        Ok(())
    }
}

impl Default for DatabaseBackendConfig {
    fn default() -> Self {
        Self::memory_sqlite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_config() {
        let config = DatabaseBackendConfig::sqlite("sqlite:./pbx.db".to_string());

        assert_eq!(config.database_type, DatabaseType::SQLite);
        assert!(config.validate().is_ok());
        assert!(!config.is_memory_database());
        assert_eq!(config.sqlite_url(), "sqlite:./pbx.db");
    }

    #[test]
    fn test_memory_sqlite_config() {
        let config = DatabaseBackendConfig::memory_sqlite();

        assert!(config.is_memory_database());
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.sqlite_url(), "sqlite::memory:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bare_file_path() {
        let config = DatabaseBackendConfig::sqlite("/var/lib/pbx/pbx.db".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.sqlite_url(), "sqlite:/var/lib/pbx/pbx.db");
    }

    #[test]
    fn test_config_validation() {
        let empty_url = DatabaseBackendConfig::sqlite("".to_string());
        assert!(empty_url.validate().is_err());

        let no_connections =
            DatabaseBackendConfig::sqlite("sqlite:./pbx.db".to_string()).with_max_connections(0);
        assert!(no_connections.validate().is_err());

        let wrong_scheme = DatabaseBackendConfig::sqlite("postgres://localhost/pbx".to_string());
        assert!(wrong_scheme.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DatabaseBackendConfig::sqlite("sqlite:./pbx.db".to_string())
            .with_max_connections(20)
            .with_connection_timeout(60)
            .with_option("journal_mode".to_string(), "WAL".to_string());

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connection_timeout, 60);
        assert_eq!(config.get_option("journal_mode"), Some(&"WAL".to_string()));
    }
}
