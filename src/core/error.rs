use std::fmt;

/// Error kinds named by the places the catalogue can fail, not by the
/// module that raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Parse,
    NotFound,
    InvalidArgument,
    Internal,
    InvalidState,
    /// Marker mismatch mid-file; fatal for a reader.
    TocCorrupt,
    /// Record tag-version exceeds the reader's known maximum.
    TocVersionTooNew,
    /// Full key does not satisfy any rule at some schema level.
    SchemaIncompatible,
    /// Full key carries keywords no rule consumed.
    SchemaOverspecified,
    /// Re-archive of a non-distinct key under strict mode.
    DuplicateKey,
    /// No database directory exists for a retrieve-time database key.
    DatabaseNotFound,
    /// Advisory lock not acquired before the configured deadline.
    LockTimeout,
    /// Named but deliberately unimplemented path (remote move, some visitors).
    NotImplemented,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error { kind: ErrorKind::Io, context: err.to_string() }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error { kind: ErrorKind::Parse, context: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
