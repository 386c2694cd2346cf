use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Application error taxonomy.
///
/// One terminal error kind per failed operation: validation and lookup
/// errors are detected before any backend write, mid-saga backend errors
/// surface as the failing step's kind after compensation has run.
#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    #[error("IO error: {0}")]
    #[diagnostic(code(journal::io_error))]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    #[diagnostic(
        code(journal::validation_error),
        help("Check that your input meets the required format and constraints")
    )]
    Validation(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(journal::not_found))]
    NotFound(String),

    #[error("Conflict: {0}")]
    #[diagnostic(
        code(journal::conflict),
        help("The resource already exists; update it instead of re-creating it")
    )]
    Conflict(String),

    #[error("Storage error: {message}")]
    #[diagnostic(code(journal::storage_error))]
    Storage {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Commit error: {0}")]
    #[diagnostic(
        code(journal::commit_error),
        help("Check the version repository root directory and its permissions")
    )]
    Commit(String),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(journal::database_error),
        help("Check database connection and schema integrity")
    )]
    Database(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(journal::config_error))]
    Config(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn storage_error(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        AppError::Storage {
            message: message.into(),
            path,
        }
    }

    pub fn commit_error(message: impl Into<String>) -> Self {
        AppError::Commit(message.into())
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        AppError::Database(message.into())
    }
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = AppError::validation("Invalid input");
        assert!(matches!(error, AppError::Validation(_)));

        let error = AppError::conflict("entry already exists");
        assert!(matches!(error, AppError::Conflict(_)));

        let error = AppError::storage_error("write failed", None);
        assert!(matches!(error, AppError::Storage { .. }));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let app_error: AppError = io_error.into();

        assert!(matches!(app_error, AppError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let error = AppError::commit_error("head reference missing");
        let display = format!("{}", error);
        assert!(display.contains("Commit error"));
        assert!(display.contains("head reference missing"));

        let error = AppError::not_found("Journal not found: j-1");
        assert!(format!("{}", error).contains("Journal not found"));
    }
}
