use thiserror::Error;

/// Main error type for ctxgraph
#[derive(Error, Debug)]
pub enum CtxgraphError {
    /// Malformed entity, relation or fact (rejected before insertion)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity, chunk or community not found in the graph store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Graph store could not be reached
    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(String),

    /// Retrieval query failed (treated as an empty hop by the reasoner)
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    /// Judgment oracle failed or timed out (callers fall back to heuristics)
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Reasoning configuration rejected before the loop starts
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CtxgraphError {
    /// True for failures worth a heuristic fallback rather than a hard stop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CtxgraphError::StoreUnavailable(_) | CtxgraphError::OracleUnavailable(_)
        )
    }
}

/// Convenient Result type using CtxgraphError
pub type Result<T> = std::result::Result<T, CtxgraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CtxgraphError::Validation("confidence out of range".to_string());
        assert!(err.to_string().contains("Validation error"));
        assert!(err.to_string().contains("confidence out of range"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: CtxgraphError = rusqlite_err.into();
        assert!(matches!(err, CtxgraphError::Database(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: CtxgraphError = json_err.into();
        assert!(matches!(err, CtxgraphError::Serialization(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CtxgraphError::StoreUnavailable("down".into()).is_transient());
        assert!(CtxgraphError::OracleUnavailable("timeout".into()).is_transient());
        assert!(!CtxgraphError::Validation("bad".into()).is_transient());
        assert!(!CtxgraphError::NotFound("Q1".into()).is_transient());
    }
}
