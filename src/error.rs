use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the engine can report. All of them are recoverable at the
/// statement level: the live database is left untouched when one is returned.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed SQL. `position` is the character offset of the offending token.
    #[error("parse error at position {position}: {message}")]
    Parse { message: String, position: usize },

    /// Unknown table, column or DSN.
    #[error("{kind} {name:?} does not exist")]
    NotFound { kind: &'static str, name: String },

    /// Duplicate table or column name.
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Wrong number of values in an INSERT row.
    #[error("expected {expected} values per row, got {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// A value that cannot be stored in, or compared with, the target type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt or unsupported persisted file.
    #[error("format error: {0}")]
    Format(String),
}

impl Error {
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Error::Parse {
            message: message.into(),
            position,
        }
    }

    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "table",
            name: name.into(),
        }
    }

    pub fn column_not_found(name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "column",
            name: name.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        Error::Format(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::Parse,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            Error::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Error::Io(_) => ErrorKind::Io,
            Error::Format(_) => ErrorKind::Format,
        }
    }
}

/// Fieldless mirror of [Error], used in envelopes and for matching in hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    NotFound,
    AlreadyExists,
    ArityMismatch,
    TypeMismatch,
    Io,
    Format,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::ArityMismatch => "ArityMismatch",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::Io => "IoError",
            ErrorKind::Format => "FormatError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::table_not_found("users").to_string(),
            "table \"users\" does not exist"
        );
        assert_eq!(
            Error::parse("Expected FROM", 9).to_string(),
            "parse error at position 9: Expected FROM"
        );
        assert_eq!(
            Error::ArityMismatch {
                expected: 2,
                found: 3
            }
            .to_string(),
            "expected 2 values per row, got 3"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::parse("x", 0).kind(), ErrorKind::Parse);
        assert_eq!(Error::column_not_found("c").kind(), ErrorKind::NotFound);
        assert_eq!(Error::format("bad magic").kind(), ErrorKind::Format);

        let io: Error = std::io::Error::other("disk gone").into();
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(io.kind().as_str(), "IoError");
    }
}
