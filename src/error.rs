//! Error types for the home dashboard.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors surfaced by the appliance, reading and dashboard services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ServiceError {
    pub fn appliance_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "Appliance",
            id,
        }
    }

    pub fn task_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Task", id }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let err = ServiceError::task_not_found(7);
        assert_eq!(err.to_string(), "Task 7 not found");
    }

    #[test]
    fn database_error_converts_transparently() {
        let err: ServiceError = DatabaseError::Query("boom".into()).into();
        assert_eq!(err.to_string(), "Query failed: boom");
        let top: Error = err.into();
        assert!(matches!(top, Error::Service(ServiceError::Database(_))));
    }

    #[test]
    fn open_failure_message() {
        let err: Error = DatabaseError::Open("connect: no such file".into()).into();
        assert_eq!(
            err.to_string(),
            "Database error: Failed to open database: connect: no such file"
        );
    }
}
