// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for Tessera
//!
//! Backend sessions speak [`NativeError`]. Adapters translate it exactly once,
//! at the operation that issued the native call, into [`PersistenceError`],
//! which is the only error callers ever see.

use std::time::Duration;
use thiserror::Error;

use crate::Identifier;

/// Result type alias
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result type alias for native backend calls
pub type NativeResult<T> = Result<T, NativeError>;

/// Errors raised by a backend session (SFTP channel, WebDAV HTTP exchange, ...)
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("No such item: {0}")]
    NotFound(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Status {code}: {message}")]
    Status { code: u32, message: String },

    #[error("{0}")]
    Other(String),
}

impl NativeError {
    /// Translate an I/O error, keeping "not found" distinguishable.
    pub fn from_io(err: std::io::Error, subject: impl Into<String>) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => NativeError::NotFound(subject.into()),
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof => NativeError::ConnectionLost(err.to_string()),
            _ => NativeError::Io(err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NativeError::NotFound(_))
    }

    /// Whether the session that produced this error can no longer be reused.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, NativeError::ConnectionLost(_))
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("{action} '{identifier}'. Reason: {source}")]
    Failure {
        action: String,
        identifier: Identifier,
        #[source]
        source: NativeError,
    },

    #[error("Cannot connect to '{endpoint}'. Reason: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: NativeError,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Cannot create collection '{0}': the collection path is too deeply nested")]
    TooDeeplyNested(Identifier),

    #[error("Cannot create item with empty resource name: '{0}'")]
    EmptyName(Identifier),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    #[error("No connection became available within {0:?}")]
    PoolTimeout(Duration),

    #[error("Connection pool is shut down")]
    PoolClosed,
}

impl PersistenceError {
    pub fn failure(action: impl Into<String>, identifier: &Identifier, source: NativeError) -> Self {
        PersistenceError::Failure {
            action: action.into(),
            identifier: identifier.clone(),
            source,
        }
    }

    pub fn connection(endpoint: impl Into<String>, source: NativeError) -> Self {
        PersistenceError::Connection {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Whether the underlying native cause was a missing item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::Failure { source, .. } if source.is_not_found())
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            PersistenceError::Failure { identifier, .. }
            | PersistenceError::TooDeeplyNested(identifier)
            | PersistenceError::EmptyName(identifier) => Some(identifier),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_from_io_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = NativeError::from_io(io_err, "/base/a");
        assert!(err.is_not_found());
        assert_eq!(format!("{}", err), "No such item: /base/a");
    }

    #[test]
    fn test_from_io_broken_pipe_is_connection_lost() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(NativeError::from_io(io_err, "x").is_connection_lost());

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = NativeError::from_io(io_err, "x");
        assert!(matches!(err, NativeError::Io(_)));
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_failure_display_and_source() {
        let id = Identifier::new("/a/b");
        let err = PersistenceError::failure(
            "Cannot delete item",
            &id,
            NativeError::Status { code: 423, message: "Locked".into() },
        );
        assert_eq!(format!("{}", err), "Cannot delete item '/a/b'. Reason: Status 423: Locked");
        assert!(err.source().is_some());
        assert_eq!(err.identifier(), Some(&id));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_failure_is_not_found() {
        let err = PersistenceError::failure(
            "Cannot read data of item",
            &Identifier::new("/x"),
            NativeError::NotFound("/x".into()),
        );
        assert!(err.is_not_found());
        assert!(!PersistenceError::PoolClosed.is_not_found());
    }

    #[test]
    fn test_connection_error_display() {
        let err = PersistenceError::connection(
            "files.example.com:22",
            NativeError::ConnectionLost("handshake reset".into()),
        );
        assert_eq!(
            format!("{}", err),
            "Cannot connect to 'files.example.com:22'. Reason: Connection lost: handshake reset"
        );
        assert!(err.identifier().is_none());
    }

    #[test]
    fn test_structural_errors_name_identifier() {
        let id = Identifier::new("/deep");
        let err = PersistenceError::TooDeeplyNested(id.clone());
        assert!(format!("{}", err).contains("too deeply nested"));
        assert_eq!(err.identifier(), Some(&id));
    }
}
