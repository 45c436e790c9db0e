//! Custom error types for rustprofiles.
//!
//! Failures inside one search or one candidate unit are logged and skipped by
//! the import pipeline. Only configuration and migration errors abort a run.

use thiserror::Error;

/// Main error type for rustprofiles operations.
#[derive(Debug, Error)]
pub enum ProfilesError {
    /// Network/HTTP transport failure (connect, timeout, body read)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Search service answered with a non-success status or an error body
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from the service
        message: String,
    },

    /// Rate limited by the search service
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// Expected key or shape absent from a response
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Required field missing or invalid
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate-key race while writing
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Migration failure at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl ProfilesError {
    /// True for failures of the outbound search call. The caller skips the
    /// affected unit of work and continues the batch.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProfilesError::Transport(_) | ProfilesError::Api { .. } | ProfilesError::RateLimited(_)
        )
    }

    /// True for failures of a search call or of one candidate's data. Callers
    /// fall back to another source on these.
    pub fn is_recoverable(&self) -> bool {
        self.is_transport()
            || matches!(
                self,
                ProfilesError::MalformedResponse(_)
                    | ProfilesError::Validation(_)
                    | ProfilesError::PersistenceConflict(_)
            )
    }

    /// True for failures that end a whole run. Anything else raised while
    /// processing one search or candidate is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProfilesError::Config(_) | ProfilesError::Migration(_))
    }
}

impl From<sqlx::Error> for ProfilesError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return ProfilesError::PersistenceConflict(db_err.message().to_string());
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return ProfilesError::NotFound("row not found".to_string());
        }
        ProfilesError::Database(err)
    }
}

/// Result type alias using `ProfilesError`
pub type Result<T> = std::result::Result<T, ProfilesError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a validation error message
    fn ok_or_validation(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_validation(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ProfilesError::Validation(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let api = ProfilesError::Api {
            code: 500,
            message: "boom".to_string(),
        };
        assert!(api.is_transport());
        assert!(ProfilesError::RateLimited(60).is_transport());
        assert!(!ProfilesError::Validation("name".to_string()).is_transport());
        assert!(!ProfilesError::MalformedResponse("x".to_string()).is_transport());
    }

    #[test]
    fn test_only_config_and_migration_are_fatal() {
        assert!(ProfilesError::Config("no key".to_string()).is_fatal());
        assert!(!ProfilesError::Database(sqlx::Error::PoolTimedOut).is_fatal());
        assert!(!ProfilesError::Validation("name".to_string()).is_fatal());
        assert!(!ProfilesError::RateLimited(60).is_fatal());
    }

    #[test]
    fn test_ok_or_validation() {
        let missing: Option<&str> = None;
        let err = missing
            .ok_or_validation("missing title")
            .expect_err("None must map to an error");
        assert!(matches!(err, ProfilesError::Validation(ref m) if m == "missing title"));
        assert_eq!(Some(3).ok_or_validation("x").ok(), Some(3));
    }
}
