use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the index storage and query layers.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cannot open index file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Meta file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid token pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt dictionary slot {slot} while writing {term:?}: {state}")]
    CorruptSlot {
        term: String,
        slot: u64,
        state: String,
    },

    #[error("Cannot encode record: {0}")]
    Encoding(String),

    #[error("Cannot decode record: {0}")]
    Decoding(String),

    #[error("Invalid wildcard pattern {pattern:?}: {reason}")]
    InvalidWildcard { pattern: String, reason: String },

    #[error("No {width}-gram index available for wildcard pattern {pattern:?}")]
    MissingKGramIndex { pattern: String, width: usize },

    #[error("K-gram width must be positive, got {0}")]
    InvalidKGramWidth(usize),

    #[error("Relevance judgments cover {judgments} results, expected {results}")]
    FeedbackMismatch { results: usize, judgments: usize },
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub(crate) fn invalid_wildcard(pattern: &str, reason: impl Into<String>) -> Self {
        IndexError::InvalidWildcard {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the index files.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidWildcard { .. }
                | IndexError::MissingKGramIndex { .. }
                | IndexError::InvalidKGramWidth(_)
                | IndexError::FeedbackMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::MissingKGramIndex { pattern: "ca*".into(), width: 2 };
        assert_eq!(err.to_string(), "No 2-gram index available for wildcard pattern \"ca*\"");
    }

    #[test]
    fn test_caller_errors() {
        assert!(IndexError::invalid_wildcard("a*b*", "more than one wildcard").is_caller_error());
        assert!(IndexError::FeedbackMismatch { results: 3, judgments: 2 }.is_caller_error());
        assert!(!IndexError::Decoding("short".into()).is_caller_error());
    }
}
