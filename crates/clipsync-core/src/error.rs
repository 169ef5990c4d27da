//! Error types for ClipSync

use thiserror::Error;

use crate::types::TaskType;

/// Main error type for ClipSync operations
#[derive(Error, Debug)]
pub enum ClipSyncError {
    /// Task was not found in storage
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Clip was not found in storage
    #[error("Clip not found: {0}")]
    ClipNotFound(u64),

    /// Peer was not found in the peer directory
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// A task type has no registered handler (wiring defect)
    #[error("No handler registered for task type {0}")]
    MissingHandler(TaskType),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Identity key material could not be read or written
    #[error("Identity error: {0}")]
    Identity(String),

    /// Secure-storage facility failure
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// Network-related error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A spawned task was cancelled or panicked
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ClipSyncError
pub type ClipSyncResult<T> = Result<T, ClipSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClipSyncError::TaskNotFound("01HZX".to_string());
        assert_eq!(format!("{}", err), "Task not found: 01HZX");
    }

    #[test]
    fn test_missing_handler_names_task_type() {
        let err = ClipSyncError::MissingHandler(TaskType::PullFile);
        assert_eq!(
            err.to_string(),
            "No handler registered for task type pull-file"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClipSyncError = io_err.into();
        assert!(matches!(err, ClipSyncError::Io(_)));
    }
}
