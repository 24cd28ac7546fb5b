//! Store Errors
//!
//! Error types for storage backends.

use crate::domain::LedgerError;

/// Unique constraint names shared by every backend
pub const USERS_EMAIL_KEY: &str = "users_email_key";
pub const USERS_USERNAME_KEY: &str = "users_username_key";
pub const MERCH_NAME_KEY: &str = "merch_name_key";

/// Errors that can occur in a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected a write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The unit of work was already committed
    #[error("Unit of work already finished")]
    Finished,

    /// A stored row failed domain validation
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Write failure injected by a test store
    #[error("Injected failure at write {0}")]
    Injected(usize),
}

impl StoreError {
    /// Check if this error is a violation of the named unique constraint
    pub fn is_unique_violation_of(&self, constraint: &str) -> bool {
        matches!(self, StoreError::UniqueViolation(name) if name == constraint)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_match() {
        let err = StoreError::UniqueViolation(USERS_EMAIL_KEY.to_string());
        assert!(err.is_unique_violation_of(USERS_EMAIL_KEY));
        assert!(!err.is_unique_violation_of(USERS_USERNAME_KEY));
        assert!(!StoreError::Finished.is_unique_violation_of(USERS_EMAIL_KEY));
    }

    #[test]
    fn test_store_error_becomes_persistence() {
        let err: LedgerError = StoreError::Injected(2).into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "persistence_failure");
    }
}
