//! Infrastructure errors shared by both services

use sqlx::Error as SqlxError;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Failures while bringing up or checking the Postgres pool
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("could not connect to the database: {0}")]
    Connection(#[source] SqlxError),

    #[error("schema migration failed: {0}")]
    Migration(#[from] MigrateError),

    /// Inconsistent pool settings
    #[error("invalid database configuration: {0}")]
    Configuration(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// True when the statement hit a unique index (duplicate slug, email, token hash)
pub fn is_unique_violation(error: &SqlxError) -> bool {
    error
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&SqlxError::RowNotFound));
        assert!(!is_unique_violation(&SqlxError::PoolTimedOut));
    }

    #[test]
    fn test_configuration_message() {
        let err = DatabaseError::Configuration("min above max".to_string());
        assert_eq!(err.to_string(), "invalid database configuration: min above max");
    }
}
