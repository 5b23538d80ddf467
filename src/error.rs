use thiserror::Error;

/// Main error type for morsel operations
#[derive(Error, Debug)]
pub enum MorselError {
    #[error("Field weights must sum to 1.0, got {0}")]
    InvalidFieldWeights(f32),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Too many indexed fields: {0} (at most 127 are supported)")]
    TooManyFields(usize),

    #[error("Index format version mismatch: index is {found}, engine expects {expected}")]
    VersionMismatch { expected: String, found: String },

    #[error("Corrupted index data: {0}")]
    Format(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for morsel operations
pub type Result<T> = std::result::Result<T, MorselError>;

impl MorselError {
    /// Errors that make an index unusable as a whole (no partial results)
    pub fn is_fatal_for_index(&self) -> bool {
        matches!(
            self,
            MorselError::VersionMismatch { .. } | MorselError::Format(_)
        )
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        MorselError::Format(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MorselError::InvalidFieldWeights(0.9);
        assert_eq!(err.to_string(), "Field weights must sum to 1.0, got 0.9");

        let err = MorselError::VersionMismatch {
            expected: "1".to_string(),
            found: "0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Index format version mismatch: index is 0, engine expects 1"
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(MorselError::format("bad tag").is_fatal_for_index());
        assert!(!MorselError::QueryParse("x".to_string()).is_fatal_for_index());
        assert!(!MorselError::UnknownField("x".to_string()).is_fatal_for_index());
    }
}
