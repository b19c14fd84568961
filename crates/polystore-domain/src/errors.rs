use std::fmt;

use thiserror::Error as ThisError;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors raised by store operations, one variant per failure class
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StoreError {
    /// Network, authentication or closed session
    #[error("connection error: {0}")]
    Connection(String),
    /// Malformed or conflicting schema
    #[error("schema error: {0}")]
    Schema(String),
    /// Constraint violation or serialization failure
    #[error("write error: {0}")]
    Write(String),
    /// Malformed filter or failed read
    #[error("read error: {0}")]
    Read(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Schema,
    Write,
    Read,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Schema => "schema",
            ErrorKind::Write => "write",
            ErrorKind::Read => "read",
        };
        f.write_str(name)
    }
}

impl StoreError {
    pub fn connection(err: impl fmt::Display) -> Self {
        StoreError::Connection(err.to_string())
    }

    pub fn schema(err: impl fmt::Display) -> Self {
        StoreError::Schema(err.to_string())
    }

    pub fn write(err: impl fmt::Display) -> Self {
        StoreError::Write(err.to_string())
    }

    pub fn read(err: impl fmt::Display) -> Self {
        StoreError::Read(err.to_string())
    }

    /// Error returned by every operation on a closed client
    pub fn closed() -> Self {
        StoreError::Connection("session is closed".to_string())
    }

    /// Error returned by operations issued before `create_schema`
    pub fn no_schema() -> Self {
        StoreError::Schema("no schema declared, call create_schema first".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::Schema(_) => ErrorKind::Schema,
            StoreError::Write(_) => ErrorKind::Write,
            StoreError::Read(_) => ErrorKind::Read,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StoreError::Connection(msg)
            | StoreError::Schema(msg)
            | StoreError::Write(msg)
            | StoreError::Read(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_and_message() {
        let err = StoreError::write("duplicate key `id`");
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(err.message(), "duplicate key `id`");
        assert_eq!(err.to_string(), "write error: duplicate key `id`");
    }

    #[test]
    fn test_closed_is_connection_error() {
        assert_eq!(StoreError::closed().kind(), ErrorKind::Connection);
        assert_eq!(StoreError::no_schema().kind(), ErrorKind::Schema);
    }
}
