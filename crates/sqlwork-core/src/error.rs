//! Error types for sqlwork operations.

use std::fmt;

/// The primary error type for all sqlwork operations.
#[derive(Debug)]
pub enum Error {
    /// Batch execution errors reported by the connection
    Query(QueryError),
    /// Type conversion errors (row decoding, correlation parsing)
    Type(TypeError),
    /// Object scope precondition failures
    Scope(ScopeError),
    /// A caller passed arguments that cannot produce a result
    InvalidArgument(String),
    /// Snapshot serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// The batch ran but produced no result set where one was required
    NoResult,
    /// Cancelled
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ScopeError {
    pub kind: ScopeErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeErrorKind {
    /// Commit, rollback or tracking was requested with no open scope
    NoActiveScope,
    /// The entity has no snapshot in the innermost scope
    NotTracked,
    /// The entity already has a snapshot in the innermost scope
    AlreadyTracked,
    /// The snapshot could not be decoded as the requested type
    SnapshotMismatch,
}

impl ScopeError {
    pub fn new(kind: ScopeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Error {
    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// The scope error kind, when this is a scope precondition failure.
    pub fn scope_kind(&self) -> Option<ScopeErrorKind> {
        match self {
            Error::Scope(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Is this a failed scope precondition rather than a database failure?
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Scope(_) | Error::InvalidArgument(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Scope(e) => write!(f, "Scope error: {}", e.message),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ScopeError> for Error {
    fn from(err: ScopeError) -> Self {
        Error::Scope(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for sqlwork operations.
pub type Result<T> = std::result::Result<T, Error>;
