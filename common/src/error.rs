use std::string::FromUtf8Error;

use thiserror::Error as ThisError;

/// Errors surfaced by the data-access layer.
///
/// Messages carry driver diagnostics and SQL identifiers only. Bound parameter
/// values (usernames, passwords, payload fields) never appear in them.
#[derive(Debug, ThisError)]
pub enum DataError {
    /// Store unreachable or credentials rejected.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Malformed statement, invalid identifier, or a row that does not match
    /// its projection.
    #[error("query failed: {0}")]
    Query(String),

    /// Field list and value list lengths differ on a write.
    #[error("field/value count mismatch: {fields} fields, {values} values")]
    Arity { fields: usize, values: usize },

    /// A binary payload that is not valid UTF-8.
    #[error("byte payload is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),

    /// Statement or commit failure on the write path.
    #[error("write failed: {0}")]
    Write(String),
}

/// Coarse classification used by request handlers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller supplied something unusable (400).
    Invalid,
    /// Store-level failure (500).
    Internal,
}

impl DataError {
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Arity { .. } => ErrorClass::Invalid,
            Self::Connection(_) | Self::Query(_) | Self::Encoding(_) | Self::Write(_) => {
                ErrorClass::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_is_a_caller_error() {
        let err = DataError::Arity {
            fields: 3,
            values: 2,
        };
        assert_eq!(err.class(), ErrorClass::Invalid);
        assert_eq!(
            err.to_string(),
            "field/value count mismatch: 3 fields, 2 values"
        );
    }

    #[test]
    fn store_failures_are_internal() {
        assert_eq!(
            DataError::Connection("refused".into()).class(),
            ErrorClass::Internal
        );
        assert_eq!(DataError::Write("commit".into()).class(), ErrorClass::Internal);
        let utf8 = String::from_utf8(vec![0xff]).unwrap_err();
        assert_eq!(DataError::from(utf8).class(), ErrorClass::Internal);
    }
}
