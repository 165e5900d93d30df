use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// A lookup by criteria matched no row
    NotFound {
        resource: String,
        criteria: String,
    },
    /// A value is not acceptable for the current state of the entity
    Input(String),
    /// A malformed discriminator or protocol argument
    Value(String),
    Database(String),
    Sqlx(sqlx::Error),
    Serialization(serde_json::Error),
    Configuration(String),
    Internal(String),
}

impl AppError {
    /// Build a not-found error from the criteria that were searched
    ///
    /// The message reads like `Line was not found ('id': 42)`.
    pub fn not_found<I, K, V>(resource: &str, criteria: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: fmt::Display,
        V: fmt::Display,
    {
        let criteria = criteria
            .into_iter()
            .map(|(key, value)| format!("'{}': {}", key, value))
            .collect::<Vec<_>>()
            .join(", ");

        AppError::NotFound {
            resource: resource.to_string(),
            criteria,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        AppError::Input(message.into())
    }

    pub fn value(message: impl Into<String>) -> Self {
        AppError::Value(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, AppError::Input(_))
    }

    pub fn is_value_error(&self) -> bool {
        matches!(self, AppError::Value(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound { resource, criteria } if criteria.is_empty() => {
                write!(f, "{} was not found", resource)
            }
            AppError::NotFound { resource, criteria } => {
                write!(f, "{} was not found ({})", resource, criteria)
            }
            AppError::Input(e) => write!(f, "Input error: {}", e),
            AppError::Value(e) => write!(f, "Value error: {}", e),
            AppError::Database(e) => write!(f, "Database error: {}", e),
            AppError::Sqlx(e) => write!(f, "SQL error: {}", e),
            AppError::Serialization(e) => write!(f, "Serialization error: {}", e),
            AppError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Sqlx(e) => Some(e),
            AppError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Sqlx(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Map a failed write to an input error when it broke a table constraint
///
/// Unique, foreign key and check violations are caused by the values the
/// caller handed in; anything else stays a database error.
pub fn map_database_error(err: sqlx::Error, resource: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message().to_string();
        if message.contains("UNIQUE constraint failed") {
            return AppError::Input(format!("{} already exists: {}", resource, message));
        }
        if message.contains("FOREIGN KEY constraint failed") {
            return AppError::Input(format!("{} references a missing resource", resource));
        }
        if message.contains("CHECK constraint failed") {
            return AppError::Input(format!("{} violates a constraint: {}", resource, message));
        }
    }
    AppError::Database(format!("{} write failed: {}", resource, err))
}
